//! Command line interface
//!
//! Every command has a fixed set of typed arguments. Anything clap cannot
//! turn into a [`Command`] is rejected here, before any hardware is opened.

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use embassy_time::Duration;

use crate::system::audio::{DEFAULT_PLAYER, DEFAULT_SOUNDS_DIR};
use crate::system::resources::{HardwarePaths, DEFAULT_GPIO_CHIP, DEFAULT_I2C_BUS};
use crate::task::control::Thresholds;

#[derive(Debug, Parser)]
#[command(name = "monster-prop")]
#[command(version, about = "Proximity triggered monster prop", long_about = None)]
pub struct Cli {
    /// I2C adapter the door controller is attached to
    #[arg(long, global = true, env = "MONSTER_I2C_BUS", default_value = DEFAULT_I2C_BUS)]
    pub i2c_bus: String,

    /// GPIO character device carrying the rangefinder and launcher lines
    #[arg(long, global = true, env = "MONSTER_GPIO_CHIP", default_value = DEFAULT_GPIO_CHIP)]
    pub gpio_chip: String,

    /// Command line audio player, called as `<player> -q [--loop -1] <file>`
    #[arg(long, global = true, env = "MONSTER_AUDIO_PLAYER", default_value = DEFAULT_PLAYER)]
    pub audio_player: String,

    /// Directory with the sound assets
    #[arg(long, global = true, env = "MONSTER_SOUNDS", default_value = DEFAULT_SOUNDS_DIR)]
    pub sounds: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Flap the door a few times
    SayHi {
        /// Seconds between door moves
        #[arg(default_value = "0.5", value_parser = parse_seconds)]
        interval: Duration,
        /// Number of close/open cycles
        #[arg(default_value = "5")]
        reps: u32,
    },
    /// Close the door
    CloseDoor,
    /// Open the door
    OpenDoor,
    /// Open the door, wait, close it again
    ToggleDoor {
        /// Seconds the door stays open
        #[arg(default_value = "0.8", value_parser = parse_seconds)]
        open_for: Duration,
    },
    /// Shudder the door
    TwitchDoor,
    /// Launch one ball
    FireBall {
        /// Seconds the solenoid is energized
        #[arg(default_value = "0.3", value_parser = parse_seconds)]
        duration: Duration,
    },
    /// Twitch the door and launch two balls with overlapping motions
    FireAndDoor,
    /// Take one distance measurement
    ReportDistance,
    /// Print raw and filtered distance until interrupted
    MonitorDistance,
    /// Run the prop until interrupted
    RunLoop {
        /// Fire at or below this distance in meters
        #[arg(default_value = "1.0", value_parser = parse_meters)]
        trigger: f64,
        /// Call people closer below this distance in meters
        #[arg(default_value = "2.0", value_parser = parse_meters)]
        come_closer: f64,
        /// Run door and launcher motions concurrently
        #[arg(long)]
        overlap: bool,
        /// Keep playing the come closer cue during the post fire lockout
        #[arg(long)]
        approach_during_lockout: bool,
        /// Treat the prop as alone until real readings fill the average
        #[arg(long)]
        start_far: bool,
    },
}

impl Cli {
    /// Parses and validates `args`, the first item being the program name
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Self::try_parse_from(args)?;
        if let Command::RunLoop {
            trigger,
            come_closer,
            ..
        } = cli.command
        {
            // clap checks arguments one by one, the pair is checked here
            if let Err(e) = Thresholds::new(trigger, come_closer) {
                return Err(Self::command().error(ErrorKind::ValueValidation, e));
            }
        }
        Ok(cli)
    }

    pub fn hardware_paths(&self) -> HardwarePaths {
        HardwarePaths {
            gpio_chip: self.gpio_chip.clone(),
            i2c_bus: self.i2c_bus.clone(),
        }
    }
}

fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let seconds: f64 = arg
        .parse()
        .map_err(|e| format!("`{arg}` is not a number of seconds: {e}"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("`{arg}` must be a positive number of seconds"));
    }
    Ok(Duration::from_micros((seconds * 1_000_000.0).round() as u64))
}

fn parse_meters(arg: &str) -> Result<f64, String> {
    let meters: f64 = arg
        .parse()
        .map_err(|e| format!("`{arg}` is not a distance in meters: {e}"))?;
    if !meters.is_finite() || meters <= 0.0 {
        return Err(format!("`{arg}` must be a positive distance in meters"));
    }
    Ok(meters)
}
