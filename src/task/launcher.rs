//! Ball launcher
//!
//! A solenoid kicks a ball out of the prop's mouth. Firing is a timed pulse
//! on one output; there is no feedback and no retry.

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{debug, warn};

use crate::system::clock::pause;

/// How long the solenoid stays energized per shot
pub const DEFAULT_PULSE: Duration = Duration::from_millis(300);

/// Solenoid driven ball launcher
pub struct BallLauncher<P: OutputPin> {
    solenoid: P,
}

impl<P: OutputPin> BallLauncher<P> {
    pub fn new(mut solenoid: P) -> Self {
        if let Err(e) = solenoid.set_low() {
            warn!("Could not de-energize launcher: {:?}", e);
        }
        Self { solenoid }
    }

    /// Energizes the solenoid for `duration`
    pub async fn fire<D: DelayNs>(&mut self, duration: Duration, delay: &mut D) {
        debug!("Firing ball for {} ms", duration.as_millis());
        if let Err(e) = self.solenoid.set_high() {
            warn!("Launcher did not energize: {:?}", e);
        }
        pause(delay, duration).await;
        if let Err(e) = self.solenoid.set_low() {
            warn!("Launcher did not de-energize: {:?}", e);
        }
    }
}

impl<P: OutputPin> Drop for BallLauncher<P> {
    fn drop(&mut self) {
        // leave the solenoid cold whatever path got us here
        let _ = self.solenoid.set_low();
    }
}
