//! Distance reporting

use core::fmt::Write as _;

use log::info;

use crate::system::context::Context;
use crate::system::distance::is_sentinel;
use crate::system::filter::{MovingAverage, AVERAGE_WINDOW_SIZE};
use crate::system::resources::Platform;
use crate::task::control::{shutdown, POLL_INTERVAL};
use crate::task::rangefinder::Rangefinder;

/// Human readable distance, `no echo` for a failed reading
pub fn format_distance(distance: f64) -> String {
    if is_sentinel(distance) {
        "no echo".to_owned()
    } else {
        format!("{distance:.3} m")
    }
}

/// One settled measurement
pub async fn report_distance<P: Platform>(rangefinder: &mut Rangefinder<P>) -> f64 {
    let distance = rangefinder.measure().await;
    info!("Measured {}", format_distance(distance));
    distance
}

/// Prints raw and filtered distance every poll until stopped, then shuts down
///
/// Expects the sampler to be running already.
pub async fn monitor_distance<P: Platform>(ctx: &Context<P>, mut emit: impl FnMut(&str)) {
    let mut filter = MovingAverage::<AVERAGE_WINDOW_SIZE>::new();
    let mut line = String::new();
    while !ctx.stop_requested() {
        let raw = ctx.distance.get();
        filter.insert(raw);
        line.clear();
        // writing into a String cannot fail
        let _ = write!(
            line,
            "raw {:>10}  filtered {:>10}",
            format_distance(raw),
            format_distance(filter.value())
        );
        emit(&line);
        ctx.pause(POLL_INTERVAL).await;
    }
    shutdown(ctx).await;
}
