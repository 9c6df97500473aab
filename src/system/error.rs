//! Error types
//!
//! Only failures that stop a command end up here. A door command that never
//! gets through or a rangefinder timeout is part of normal operation and is
//! handled where it happens.

use thiserror::Error;

use crate::task::control::ThresholdError;

type Source = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to claim GPIO line {line} on {path}: {source}")]
    Gpio {
        path: String,
        line: u32,
        #[source]
        source: Source,
    },
    #[error("failed to open I2C bus {path}: {source}")]
    Bus {
        path: String,
        #[source]
        source: Source,
    },
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("invalid distance thresholds: {0}")]
    Thresholds(#[from] ThresholdError),
    #[error("failed to start sampler thread: {0}")]
    Thread(#[source] std::io::Error),
}
