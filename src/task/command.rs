//! Command execution
//!
//! Maps each parsed [`Command`] to its handler and owns the application
//! task, which runs one command and then ends the process.
//!
//! Long running commands (`run-loop`, `monitor-distance`) start the
//! rangefinder sampler first and shut everything down themselves once a stop
//! is requested. One shot commands simply run to completion.

use embassy_executor::Spawner;
use log::{debug, error, info};

use crate::cli::Command;
use crate::system::error::Error;
use crate::system::resources::{HostContext, LinuxPlatform};
use crate::task::control::{run_loop, LoopSettings, Thresholds};
use crate::task::door::{Delivery, DoorCommand};
use crate::task::monitor::{format_distance, monitor_distance, report_distance};
use crate::task::rangefinder::{spawn_sampler, Rangefinder};
use crate::task::sequence::{fire_and_door, say_hi, toggle_door, SpawnDispatch};

/// Exit code for a command that failed at runtime
pub const EXIT_FAILURE: i32 = 2;

/// Runs `command` to completion
pub async fn execute(
    spawner: Spawner,
    ctx: &'static HostContext,
    command: Command,
    rangefinder: Rangefinder<LinuxPlatform>,
) -> Result<(), Error> {
    info!("Running {:?}", command);
    match command {
        Command::SayHi { interval, reps } => say_hi(ctx, interval, reps).await,
        Command::CloseDoor => move_door(ctx, DoorCommand::Close).await,
        Command::OpenDoor => move_door(ctx, DoorCommand::Open).await,
        Command::ToggleDoor { open_for } => toggle_door(ctx, open_for).await,
        Command::TwitchDoor => move_door(ctx, DoorCommand::Twitch).await,
        Command::FireBall { duration } => ctx.fire_ball(duration).await,
        Command::FireAndDoor => fire_and_door(ctx, &SpawnDispatch::new(spawner, ctx)).await,
        Command::ReportDistance => {
            let mut rangefinder = rangefinder;
            let distance = report_distance(&mut rangefinder).await;
            println!("{}", format_distance(distance));
        }
        Command::MonitorDistance => {
            spawn_sampler(ctx, rangefinder)?;
            monitor_distance(ctx, |line| println!("{line}")).await;
        }
        Command::RunLoop {
            trigger,
            come_closer,
            overlap,
            approach_during_lockout,
            start_far,
        } => {
            let thresholds = Thresholds::new(trigger, come_closer)?;
            let settings =
                LoopSettings::new(thresholds, overlap, approach_during_lockout, start_far);
            spawn_sampler(ctx, rangefinder)?;
            run_loop(ctx, settings, &SpawnDispatch::new(spawner, ctx)).await;
        }
    }
    Ok(())
}

async fn move_door(ctx: &HostContext, command: DoorCommand) {
    match ctx.send_door(command).await {
        Delivery::Delivered { attempts } => {
            info!("Door {:?} done after {} attempt(s)", command, attempts)
        }
        // already reported by the door itself
        Delivery::Failed { attempts } => debug!("Door {:?} dropped after {}", command, attempts),
    }
}

/// Application task: runs the command, releases the hardware, exits
#[embassy_executor::task]
pub async fn run_command(
    spawner: Spawner,
    ctx: &'static HostContext,
    command: Command,
    rangefinder: Rangefinder<LinuxPlatform>,
) {
    let code = match execute(spawner, ctx, command, rangefinder).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            EXIT_FAILURE
        }
    };
    ctx.release().await;
    info!("Done");
    std::process::exit(code);
}
