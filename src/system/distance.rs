//! Distance register
//!
//! Bridges the rangefinder sampler and the control loop. The sampler writes
//! every measurement, readers take whatever is newest. There is no history
//! here and no compare-and-swap: last write wins and a reader may act on a
//! value that is one sample old.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Reported for a measurement that timed out waiting for an echo edge.
///
/// Far beyond anything the HC-SR04 can range (~4 m), so the control loop
/// always treats it as "nobody there".
pub const SENTINEL_DISTANCE: f64 = 9_999.0;

/// Returns true when `distance` is the timeout sentinel rather than a reading
pub fn is_sentinel(distance: f64) -> bool {
    distance >= SENTINEL_DISTANCE
}

/// Mutex guarded cell holding the most recent distance in meters
pub struct DistanceRegister {
    latest: Mutex<CriticalSectionRawMutex, Cell<f64>>,
}

impl DistanceRegister {
    /// Creates a register that reads as "no echo" until the first sample lands
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(Cell::new(SENTINEL_DISTANCE)),
        }
    }

    pub fn get(&self) -> f64 {
        self.latest.lock(|latest| latest.get())
    }

    pub fn set(&self, distance: f64) {
        self.latest.lock(|latest| latest.set(distance));
    }
}

impl Default for DistanceRegister {
    fn default() -> Self {
        Self::new()
    }
}
