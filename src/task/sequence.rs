//! Actuation sequences
//!
//! Scripted combinations of door commands and ball shots.
//!
//! The fire sequence is a door twitch followed by two shots a second apart.
//! It runs either inline on the caller, or split into a door timeline and a
//! ball timeline that run as separate tasks so the motions overlap. Detached
//! timelines each hold a [`WorkToken`] so shutdown can wait for them.

use embassy_executor::Spawner;
use embassy_time::Duration;
use log::{info, warn};

use crate::system::audio::{Audio, HELLO_CUE};
use crate::system::context::Context;
use crate::system::resources::{HostContext, Platform};
use crate::system::work::WorkToken;
use crate::task::door::DoorCommand;
use crate::task::launcher::DEFAULT_PULSE;

/// Gap between the steps of the fire sequence
const STEP_GAP: Duration = Duration::from_secs(1);

/// Independently schedulable halves of the fire sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    /// Door twitch
    Door,
    /// Wait, shoot, wait, shoot
    Ball,
}

/// How the control loop runs a fire sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FireMode {
    /// Inline on the control loop, one step after the other
    #[default]
    Sequential,
    /// Door and ball timelines as two detached tasks
    Concurrent,
}

/// Starts a timeline detached from the caller
///
/// The token must live exactly as long as the timeline runs.
pub trait Dispatch<'a> {
    fn dispatch(&self, timeline: Timeline, token: WorkToken<'a>);
}

/// Full fire sequence on the calling task, about 2.6 s
pub async fn fire_sequence<P: Platform>(ctx: &Context<P>) {
    info!("Fire sequence");
    door_timeline(ctx).await;
    ball_timeline(ctx).await;
}

/// Splits the fire sequence into two detached timelines
///
/// Both are counted as outstanding before either is started.
pub fn dispatch_fire<'a, P: Platform, D: Dispatch<'a>>(ctx: &'a Context<P>, dispatcher: &D) {
    info!("Fire sequence, overlapped");
    let door = ctx.work.begin();
    let ball = ctx.work.begin();
    dispatcher.dispatch(Timeline::Door, door);
    dispatcher.dispatch(Timeline::Ball, ball);
}

/// Runs one timeline and retires its token
pub async fn run_timeline<P: Platform>(ctx: &Context<P>, timeline: Timeline, token: WorkToken<'_>) {
    match timeline {
        Timeline::Door => door_timeline(ctx).await,
        Timeline::Ball => ball_timeline(ctx).await,
    }
    drop(token);
}

async fn door_timeline<P: Platform>(ctx: &Context<P>) {
    ctx.send_door(DoorCommand::Twitch).await;
}

async fn ball_timeline<P: Platform>(ctx: &Context<P>) {
    ctx.pause(STEP_GAP).await;
    ctx.fire_ball(DEFAULT_PULSE).await;
    ctx.pause(STEP_GAP).await;
    ctx.fire_ball(DEFAULT_PULSE).await;
}

/// Overlapped fire sequence that returns once both timelines are done
pub async fn fire_and_door<'a, P: Platform, D: Dispatch<'a>>(ctx: &'a Context<P>, dispatcher: &D) {
    dispatch_fire(ctx, dispatcher);
    ctx.work.wait_idle().await;
}

/// Flaps the door `reps` times
pub async fn say_hi<P: Platform>(ctx: &Context<P>, interval: Duration, reps: u32) {
    ctx.audio().play(HELLO_CUE);
    for _ in 0..reps {
        if ctx.stop_requested() {
            break;
        }
        ctx.send_door(DoorCommand::Close).await;
        ctx.pause(interval).await;
        ctx.send_door(DoorCommand::Open).await;
        ctx.pause(interval).await;
    }
}

/// Opens the door for `open_for`, then closes it
pub async fn toggle_door<P: Platform>(ctx: &Context<P>, open_for: Duration) {
    ctx.send_door(DoorCommand::Open).await;
    ctx.pause(open_for).await;
    ctx.send_door(DoorCommand::Close).await;
}

/// Runs timelines as pooled executor tasks
pub struct SpawnDispatch {
    spawner: Spawner,
    ctx: &'static HostContext,
}

impl SpawnDispatch {
    pub fn new(spawner: Spawner, ctx: &'static HostContext) -> Self {
        Self { spawner, ctx }
    }
}

impl Dispatch<'static> for SpawnDispatch {
    fn dispatch(&self, timeline: Timeline, token: WorkToken<'static>) {
        // a failed spawn drops the token along with the task arguments
        if let Err(e) = self.spawner.spawn(timeline_task(self.ctx, timeline, token)) {
            warn!("Could not start {:?} timeline: {:?}", timeline, e);
        }
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn timeline_task(ctx: &'static HostContext, timeline: Timeline, token: WorkToken<'static>) {
    run_timeline(ctx, timeline, token).await;
}
