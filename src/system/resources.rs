//! Hardware Resource Management
//!
//! Defines which hardware the prop talks to and who owns it.
//!
//! # Resource Groups
//! - Rangefinder: HC-SR04 trigger and echo lines, owned by the sampler task
//! - Door: servo controller on the I2C bus, shared through the [`Context`]
//! - Launcher: solenoid driver line, shared through the [`Context`]
//!
//! Everything is claimed once at start-up by [`acquire`]. Lines and the bus
//! are released when their owners drop them.
//!
//! [`Context`]: crate::system::context::Context

use embassy_time::Delay;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use embedded_hal_async::delay::DelayNs;
use gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::{CdevPin, I2cdev};
use log::info;

use crate::system::audio::{Audio, ProcessAudio};
use crate::system::clock::{Clock, EmbassyClock};
use crate::system::context::Context;
use crate::system::error::Error;

/// Default GPIO character device
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";
/// Default I2C adapter the door controller hangs off
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

/// HC-SR04 trigger line (BCM numbering)
const TRIGGER_LINE: u32 = 23;
/// HC-SR04 echo line, behind a 5V -> 3.3V divider
const ECHO_LINE: u32 = 24;
/// Solenoid driver line for the ball launcher
const LAUNCHER_LINE: u32 = 17;

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "monster-prop";

/// The set of hardware types a build runs against
pub trait Platform {
    /// Serial bus carrying door commands
    type Bus: I2c;
    /// Solenoid output of the ball launcher
    type Launch: OutputPin;
    /// Rangefinder trigger output
    type Trigger: OutputPin;
    /// Rangefinder echo input
    type Echo: InputPin;
    type Clock: Clock + Clone;
    type Delay: DelayNs + Clone;
    type Audio: Audio;
}

/// Raspberry Pi style Linux host: GPIO character device plus i2c-dev
pub struct LinuxPlatform;

impl Platform for LinuxPlatform {
    type Bus = I2cdev;
    type Launch = CdevPin;
    type Trigger = CdevPin;
    type Echo = CdevPin;
    type Clock = EmbassyClock;
    type Delay = Delay;
    type Audio = ProcessAudio;
}

/// Context type every host task receives
pub type HostContext = Context<LinuxPlatform>;

/// Where to find the hardware
#[derive(Debug, Clone)]
pub struct HardwarePaths {
    pub gpio_chip: String,
    pub i2c_bus: String,
}

/// Everything claimed from the kernel at start-up
pub struct Resources {
    pub door_bus: I2cdev,
    pub launcher: CdevPin,
    pub trigger: CdevPin,
    pub echo: CdevPin,
}

/// Claims every line and the bus, failing before anything moves
pub fn acquire(paths: &HardwarePaths) -> Result<Resources, Error> {
    let mut chip = Chip::new(&paths.gpio_chip).map_err(gpio_error(&paths.gpio_chip, 0))?;

    // outputs start low so nothing fires while we are still setting up
    let mut request = |line: u32, flags: LineRequestFlags| -> Result<CdevPin, Error> {
        let handle = chip
            .get_line(line)
            .and_then(|l| l.request(flags, 0, CONSUMER))
            .map_err(gpio_error(&paths.gpio_chip, line))?;
        CdevPin::new(handle).map_err(gpio_error(&paths.gpio_chip, line))
    };

    let trigger = request(TRIGGER_LINE, LineRequestFlags::OUTPUT)?;
    let echo = request(ECHO_LINE, LineRequestFlags::INPUT)?;
    let launcher = request(LAUNCHER_LINE, LineRequestFlags::OUTPUT)?;

    let door_bus = I2cdev::new(&paths.i2c_bus).map_err(|e| Error::Bus {
        path: paths.i2c_bus.clone(),
        source: e.into(),
    })?;

    info!(
        "Hardware claimed: {} (trigger {}, echo {}, launcher {}), {}",
        paths.gpio_chip, TRIGGER_LINE, ECHO_LINE, LAUNCHER_LINE, paths.i2c_bus
    );

    Ok(Resources {
        door_bus,
        launcher,
        trigger,
        echo,
    })
}

fn gpio_error<E>(path: &str, line: u32) -> impl FnOnce(E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let path = path.to_owned();
    move |e| Error::Gpio {
        path,
        line,
        source: e.into(),
    }
}
