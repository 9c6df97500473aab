//! Control loop
//!
//! Polls the smoothed distance every [`POLL_INTERVAL`] and decides what the
//! prop does about whoever is standing in front of it.
//!
//! # Zones
//! - Trigger zone, `distance <= trigger`: fire cue, one second of suspense,
//!   then the fire sequence followed by a [`FIRE_LOCKOUT`]
//! - Approach zone, `trigger < distance < come_closer`: "come closer" cue, at
//!   most once every [`APPROACH_COOLDOWN`]
//! - Anything further away, including failed readings, is ignored
//!
//! The fire check always wins over the approach check. The decision logic is
//! the synchronous [`Controller`]; [`run_loop`] only feeds it and acts on the
//! returned [`Action`].
//!
//! # Shutdown
//! Once the stop flag is raised the loop stops the sampler, waits for any
//! detached timelines to finish and only then releases the hardware.

use embassy_time::{Duration, Instant};
use log::{debug, info};

use crate::system::audio::{Audio, AMBIENT_LOOP, APPROACH_CUE, FIRE_CUE};
use crate::system::context::Context;
use crate::system::distance::SENTINEL_DISTANCE;
use crate::system::filter::{MovingAverage, AVERAGE_WINDOW_SIZE};
use crate::system::resources::Platform;
use crate::task::sequence::{dispatch_fire, fire_sequence, Dispatch, FireMode};

/// Time between two evaluations of the filtered distance
pub const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Minimum spacing between two approach cues
const APPROACH_COOLDOWN: Duration = Duration::from_secs(12);

/// Window in which new triggers are ignored, counted from the end of the
/// fire sequence rather than from the trigger
const FIRE_LOCKOUT: Duration = Duration::from_secs(10);

/// Pause between the fire cue and the first motion
const FIRE_CUE_LEAD: Duration = Duration::from_secs(1);

/// Distance thresholds in meters, `trigger < come_closer`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    trigger: f64,
    come_closer: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("thresholds must be positive finite distances, got {trigger} and {come_closer}")]
    NotPositive { trigger: f64, come_closer: f64 },
    #[error("trigger distance {trigger} must be less than come-closer distance {come_closer}")]
    Unordered { trigger: f64, come_closer: f64 },
    #[error("come-closer distance {0} is beyond the rangefinder's no-echo value")]
    TooFar(f64),
}

impl Thresholds {
    pub fn new(trigger: f64, come_closer: f64) -> Result<Self, ThresholdError> {
        let positive = |d: f64| d.is_finite() && d > 0.0;
        if !positive(trigger) || !positive(come_closer) {
            return Err(ThresholdError::NotPositive { trigger, come_closer });
        }
        if trigger >= come_closer {
            return Err(ThresholdError::Unordered { trigger, come_closer });
        }
        if come_closer >= SENTINEL_DISTANCE {
            return Err(ThresholdError::TooFar(come_closer));
        }
        Ok(Self { trigger, come_closer })
    }

    pub fn trigger(&self) -> f64 {
        self.trigger
    }

    pub fn come_closer(&self) -> f64 {
        self.come_closer
    }

    fn in_trigger_zone(&self, distance: f64) -> bool {
        distance <= self.trigger
    }

    fn in_approach_zone(&self, distance: f64) -> bool {
        self.trigger < distance && distance < self.come_closer
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            trigger: 1.0,
            come_closer: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopSettings {
    pub thresholds: Thresholds,
    pub fire_mode: FireMode,
    /// Keep playing approach cues while fire triggers are locked out
    pub approach_during_lockout: bool,
    /// Seed the filter with the no-echo value instead of zeros, so the first
    /// readings cannot average down into the trigger zone
    pub start_far: bool,
}

impl LoopSettings {
    pub fn new(
        thresholds: Thresholds,
        overlap: bool,
        approach_during_lockout: bool,
        start_far: bool,
    ) -> Self {
        Self {
            thresholds,
            fire_mode: if overlap {
                FireMode::Concurrent
            } else {
                FireMode::Sequential
            },
            approach_during_lockout,
            start_far,
        }
    }
}

/// What the loop should do after one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Approach,
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Fire sequence running or lockout pending
    Firing,
    ShuttingDown,
    Terminated,
}

/// Zone rules with their cooldown and lockout bookkeeping
pub struct Controller {
    settings: LoopSettings,
    phase: Phase,
    last_notification: Option<Instant>,
    lockout_until: Option<Instant>,
}

impl Controller {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
            last_notification: None,
            lockout_until: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Applies the zone rules to one filtered distance
    pub fn evaluate(&mut self, distance: f64, now: Instant) -> Action {
        if matches!(self.phase, Phase::ShuttingDown | Phase::Terminated) {
            return Action::None;
        }

        let locked = self.phase == Phase::Firing
            && match self.lockout_until {
                Some(until) => now < until,
                // fired but the sequence has not reported back yet
                None => true,
            };
        if self.phase == Phase::Firing && !locked {
            debug!("Lockout over");
            self.phase = Phase::Idle;
            self.lockout_until = None;
        }

        let thresholds = self.settings.thresholds;
        if thresholds.in_trigger_zone(distance) {
            if locked {
                return Action::None;
            }
            self.phase = Phase::Firing;
            return Action::Fire;
        }

        if locked && !self.settings.approach_during_lockout {
            return Action::None;
        }

        if thresholds.in_approach_zone(distance) && self.cooldown_elapsed(now) {
            self.last_notification = Some(now);
            return Action::Approach;
        }

        Action::None
    }

    /// Starts the lockout once the fire sequence has been handed off
    pub fn lock_out(&mut self, now: Instant) {
        self.lockout_until = Some(now + FIRE_LOCKOUT);
    }

    pub fn begin_shutdown(&mut self) {
        self.phase = Phase::ShuttingDown;
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_notification {
            Some(at) => now.saturating_duration_since(at) > APPROACH_COOLDOWN,
            None => true,
        }
    }
}

/// Runs the prop until a stop is requested, then shuts it down
///
/// Expects the sampler to be running already.
pub async fn run_loop<'a, P: Platform, D: Dispatch<'a>>(
    ctx: &'a Context<P>,
    settings: LoopSettings,
    dispatcher: &D,
) {
    info!(
        "Control loop started: trigger {} m, come closer {} m, {:?}",
        settings.thresholds.trigger(),
        settings.thresholds.come_closer(),
        settings.fire_mode
    );
    ctx.audio().loop_play(AMBIENT_LOOP);

    let mut filter = if settings.start_far {
        MovingAverage::<AVERAGE_WINDOW_SIZE>::filled(SENTINEL_DISTANCE)
    } else {
        MovingAverage::<AVERAGE_WINDOW_SIZE>::new()
    };
    let mut controller = Controller::new(settings);

    while !ctx.stop_requested() {
        filter.insert(ctx.distance.get());
        let distance = filter.value();

        match controller.evaluate(distance, ctx.now()) {
            Action::Fire => {
                info!("Target at {:.2} m, firing", distance);
                ctx.audio().play(FIRE_CUE);
                ctx.pause(FIRE_CUE_LEAD).await;
                match settings.fire_mode {
                    FireMode::Sequential => fire_sequence(ctx).await,
                    FireMode::Concurrent => dispatch_fire(ctx, dispatcher),
                }
                controller.lock_out(ctx.now());
            }
            Action::Approach => {
                info!("Target at {:.2} m, calling it closer", distance);
                ctx.audio().play(APPROACH_CUE);
            }
            Action::None => {}
        }

        ctx.pause(POLL_INTERVAL).await;
    }

    controller.begin_shutdown();
    shutdown(ctx).await;
    controller.terminate();
    info!("Control loop {:?}", controller.phase());
}

/// Stops the sampler, drains outstanding work, then releases hardware
pub async fn shutdown<P: Platform>(ctx: &Context<P>) {
    info!("Shutting down");
    ctx.request_stop();
    ctx.join_sampler().await;
    let pending = ctx.work.pending();
    if pending > 0 {
        info!("Waiting for {} timeline(s) to finish", pending);
    }
    ctx.work.wait_idle().await;
    ctx.release().await;
    info!("Shutdown complete");
}
