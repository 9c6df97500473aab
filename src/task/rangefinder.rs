//! Rangefinder sampler
//!
//! Measures distance with an HC-SR04 ultrasonic sensor and publishes every
//! raw reading to the distance register. Smoothing is the control loop's job.
//!
//! # Sensor Operation
//! - One-time 2 s settle with the trigger held low before the first reading
//! - 10 µs trigger pulse starts a measurement
//! - Echo line stays high for the round trip time of the ping
//! - At least 80 ms between measurements
//!
//! # Edge Detection
//! The echo edges are found by busy polling the input, each wait bounded to
//! [`EDGE_POLL_LIMIT`] reads. A missing or stuck echo yields
//! [`SENTINEL_DISTANCE`] for that cycle instead of an error, so a disconnected
//! sensor can never hang the sampler.
//!
//! # Threading
//! Edge polling blocks, so on the host the sampler gets a thread and an
//! executor of its own. Actuator pulses and control loop polls on the main
//! executor are never held up by a missing echo.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use embassy_executor::Executor;
use embassy_time::{Duration, Instant};
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error, info, warn};
use static_cell::StaticCell;

use crate::system::clock::{pause, Clock};
use crate::system::context::Context;
use crate::system::distance::SENTINEL_DISTANCE;
use crate::system::error::Error;
use crate::system::resources::{HostContext, LinuxPlatform, Platform};

/// Sensor warm-up before the very first measurement
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Length of the trigger pulse
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Upper bound on echo line reads while waiting for one edge
pub const EDGE_POLL_LIMIT: u32 = 20_000;

/// Minimum time between two measurements
const MEASUREMENT_PERIOD: Duration = Duration::from_millis(80);

/// Speed of sound in m/s at room temperature
const SPEED_OF_SOUND: f64 = 343.0;

/// HC-SR04 on a trigger output and an echo input
pub struct Rangefinder<P: Platform> {
    trigger: P::Trigger,
    echo: P::Echo,
    clock: P::Clock,
    delay: P::Delay,
    settled: bool,
}

impl<P: Platform> Rangefinder<P> {
    pub fn new(trigger: P::Trigger, echo: P::Echo, clock: P::Clock, delay: P::Delay) -> Self {
        Self {
            trigger,
            echo,
            clock,
            delay,
            settled: false,
        }
    }

    /// Takes one reading in meters, or the sentinel if an echo edge never came
    pub async fn measure(&mut self) -> f64 {
        if !self.settled {
            debug!("Letting rangefinder settle");
            if let Err(e) = self.trigger.set_low() {
                warn!("Rangefinder trigger not released: {:?}", e);
            }
            pause(&mut self.delay, SETTLE_DELAY).await;
            self.settled = true;
        }

        if let Err(e) = self.trigger.set_high() {
            warn!("Rangefinder trigger failed: {:?}", e);
            return SENTINEL_DISTANCE;
        }
        pause(&mut self.delay, TRIGGER_PULSE).await;
        if let Err(e) = self.trigger.set_low() {
            warn!("Rangefinder trigger stuck: {:?}", e);
            return SENTINEL_DISTANCE;
        }

        let Some(rise) = self.wait_for_edge(true) else {
            debug!("No echo rising edge");
            return SENTINEL_DISTANCE;
        };
        let Some(fall) = self.wait_for_edge(false) else {
            debug!("No echo falling edge");
            return SENTINEL_DISTANCE;
        };

        let round_trip = fall.saturating_duration_since(rise);
        round_trip.as_micros() as f64 / 1_000_000.0 * SPEED_OF_SOUND / 2.0
    }

    /// Busy polls the echo line until it reads `high`, for at most [`EDGE_POLL_LIMIT`] reads
    fn wait_for_edge(&mut self, high: bool) -> Option<Instant> {
        for _ in 0..EDGE_POLL_LIMIT {
            match self.echo.is_high() {
                Ok(level) if level == high => return Some(self.clock.now()),
                Ok(_) => {}
                Err(e) => {
                    warn!("Echo line unreadable: {:?}", e);
                    return None;
                }
            }
        }
        None
    }

    /// Measures until a stop is requested, publishing every reading
    ///
    /// Consumes the sensor: the lines are given back when the loop ends.
    pub async fn run(mut self, ctx: &Context<P>) {
        info!("Rangefinder sampler started");
        while !ctx.stop_requested() {
            let distance = self.measure().await;
            ctx.distance.set(distance);
            pause(&mut self.delay, MEASUREMENT_PERIOD).await;
        }
        drop(self);
        info!("Rangefinder sampler stopped");
        ctx.sampler_finished();
    }
}

/// Sampler task for the Linux host
#[embassy_executor::task]
async fn sample_distance(ctx: &'static HostContext, rangefinder: Rangefinder<LinuxPlatform>) {
    rangefinder.run(ctx).await;
}

static SAMPLER_EXECUTOR: StaticCell<Executor> = StaticCell::new();

/// Starts the sampler on its own thread; [`Context::join_sampler`] waits for it
pub fn spawn_sampler(
    ctx: &'static HostContext,
    rangefinder: Rangefinder<LinuxPlatform>,
) -> Result<(), Error> {
    ctx.sampler_started();
    let started = thread::Builder::new()
        .name("sampler".into())
        .spawn(move || {
            let executor = SAMPLER_EXECUTOR.init(Executor::new());
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                executor.run(|spawner| spawner.must_spawn(sample_distance(ctx, rangefinder)))
            }));
            // the executor only comes back by unwinding; do not leave shutdown waiting
            if outcome.is_err() {
                error!("Rangefinder sampler panicked");
                ctx.sampler_finished();
            }
        });
    if let Err(e) = started {
        ctx.sampler_finished();
        return Err(Error::Thread(e));
    }
    Ok(())
}
