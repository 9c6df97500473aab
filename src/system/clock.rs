//! Time sources
//!
//! Components read time through [`Clock`] and sleep through an
//! [`embedded_hal_async::delay::DelayNs`] so both can be swapped for simulated
//! time in tests.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;

/// Source of monotonic timestamps
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sleeps for `duration` on the given delay provider
pub async fn pause<D: DelayNs>(delay: &mut D, duration: Duration) {
    // DelayNs takes u32 microseconds, which covers a bit over an hour
    let micros = duration.as_micros().min(u32::MAX as u64) as u32;
    delay.delay_us(micros).await;
}
