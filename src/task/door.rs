//! Door command channel
//!
//! The door servo sits behind a small controller on the I2C bus that takes
//! one byte per command. The bus is shared with other devices and a write can
//! lose arbitration, so every command is retried a bounded number of times.
//! A command that never gets through is logged and otherwise ignored: the
//! door simply stays where it was.

use embassy_time::Duration;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error};

use crate::system::clock::pause;

/// I2C address of the door controller
pub const DOOR_ADDRESS: u8 = 0x42;

/// Attempts per door command before giving up
pub const DOOR_ATTEMPTS: u8 = 10;

/// Back-off between attempts after bus contention
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Commands understood by the door controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorCommand {
    Open,
    Close,
    /// Quick shudder of the door without fully opening it
    Twitch,
}

impl DoorCommand {
    /// Byte written to the controller
    pub const fn code(self) -> u8 {
        match self {
            DoorCommand::Open => 0x01,
            DoorCommand::Close => 0x02,
            DoorCommand::Twitch => 0x03,
        }
    }
}

/// How a command send ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u8 },
    Failed { attempts: u8 },
}

/// Bus errors worth another try
fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::ArbitrationLoss | ErrorKind::Bus | ErrorKind::Other)
}

/// Door controller on a serial bus
pub struct Door<B> {
    bus: B,
    address: u8,
}

impl<B: I2c> Door<B> {
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    /// Writes `command`, retrying transient bus errors up to `max_attempts` times
    ///
    /// Never fails: an undeliverable command is logged once and reported in
    /// the returned [`Delivery`].
    pub async fn send<D: DelayNs>(
        &mut self,
        command: DoorCommand,
        max_attempts: u8,
        delay: &mut D,
    ) -> Delivery {
        let mut attempts = 0;
        while attempts < max_attempts {
            attempts += 1;
            match self.bus.write(self.address, &[command.code()]) {
                Ok(()) => {
                    debug!("Door {:?} delivered after {} attempt(s)", command, attempts);
                    return Delivery::Delivered { attempts };
                }
                Err(e) if is_transient(e.kind()) => {
                    debug!(
                        "Door {:?} attempt {}/{} failed: {:?}",
                        command,
                        attempts,
                        max_attempts,
                        e.kind()
                    );
                    if attempts < max_attempts {
                        pause(delay, RETRY_BACKOFF).await;
                    }
                }
                Err(e) => {
                    error!("Door {:?} rejected by bus: {:?}", command, e.kind());
                    return Delivery::Failed { attempts };
                }
            }
        }
        error!("Door {:?} not delivered after {} attempts", command, attempts);
        Delivery::Failed { attempts }
    }
}
