//! Moving average filter
//!
//! Smooths raw rangefinder readings for the control loop. A window made with
//! [`MovingAverage::new`] starts zero filled, so until it has seen `N` real
//! samples the average is pulled towards zero, which the control loop accepts
//! by default. [`MovingAverage::filled`] with the sentinel keeps early
//! averages on the far side instead.

/// Number of samples the control loop averages over
pub const AVERAGE_WINDOW_SIZE: usize = 3;

/// Fixed window arithmetic mean, newest sample first
#[derive(Debug, Clone)]
pub struct MovingAverage<const N: usize> {
    window: [f64; N],
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self { window: [0.0; N] }
    }

    /// Window with every slot preset to `value`
    pub const fn filled(value: f64) -> Self {
        Self { window: [value; N] }
    }

    /// Pushes `sample` to the front, dropping the oldest value
    pub fn insert(&mut self, sample: f64) {
        self.window.rotate_right(1);
        self.window[0] = sample;
    }

    /// Mean over every slot of the window
    pub fn value(&self) -> f64 {
        self.window.iter().sum::<f64>() / N as f64
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}
