//! Monster prop entry point
//!
//! Parses the command line, claims the hardware and runs the requested
//! command on an embassy executor. The application task exits the process
//! once the command is done.

use std::panic::{self, AssertUnwindSafe};
use std::process;

use embassy_executor::Executor;
use embassy_time::Delay;
use env_logger::Env;
use log::{error, info};
use static_cell::StaticCell;

use crate::cli::Cli;
use crate::system::audio::ProcessAudio;
use crate::system::clock::EmbassyClock;
use crate::system::context::Context;
use crate::system::error::Error;
use crate::system::resources::{self, HostContext};
use crate::task::command::{run_command, EXIT_FAILURE};
use crate::task::door::{Door, DOOR_ADDRESS};
use crate::task::launcher::BallLauncher;
use crate::task::rangefinder::Rangefinder;

/// Command line parsing
mod cli;
/// System core modules
mod system;
/// Task implementations
mod task;

/// Exit code for an unknown command or bad arguments
const EXIT_USAGE: i32 = 1;
/// Exit code after a panic, matching the default Rust runtime
const EXIT_PANIC: i32 = 101;

static CONTEXT: StaticCell<HostContext> = StaticCell::new();
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // usage goes to stdout, and nothing is touched on a bad command line
    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            println!("{}", e.render());
            process::exit(if e.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };

    let hardware = match resources::acquire(&cli.hardware_paths()) {
        Ok(hardware) => hardware,
        Err(e) => {
            error!("{}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    let ctx: &'static HostContext = CONTEXT.init(Context::new(
        Door::new(hardware.door_bus, DOOR_ADDRESS),
        BallLauncher::new(hardware.launcher),
        EmbassyClock,
        Delay,
        ProcessAudio::new(cli.audio_player, cli.sounds),
    ));
    let rangefinder = Rangefinder::new(hardware.trigger, hardware.echo, EmbassyClock, Delay);

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Stop requested");
        ctx.request_stop();
    }) {
        error!("{}", Error::from(e));
        ctx.release_now();
        process::exit(EXIT_FAILURE);
    }

    let command = cli.command;
    let executor = EXECUTOR.init(Executor::new());
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        executor.run(|spawner| spawner.must_spawn(run_command(spawner, ctx, command, rangefinder)))
    }));

    // the executor only ever comes back by unwinding
    if outcome.is_err() {
        error!("Panicked, releasing hardware");
        ctx.release_now();
        process::exit(EXIT_PANIC);
    }
}
