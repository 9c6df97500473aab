//! Process-lifetime context
//!
//! One [`Context`] is created at start-up and handed to every task by
//! reference. It owns all shared state and the actuator handles:
//!
//! - the distance register written by the sampler and read by the control loop
//! - the outstanding work counter for detached actuation timelines
//! - the cooperative stop flag raised by the signal handler
//! - the door and launcher handles, each behind its own mutex
//!
//! Actuators are kept as `Option`s so shutdown can take them out and drop them,
//! which returns the lines and the bus to the kernel in a safe state.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};
use log::{info, warn};

use crate::system::audio::Audio;
use crate::system::clock::{self, Clock};
use crate::system::distance::DistanceRegister;
use crate::system::resources::Platform;
use crate::system::work::OutstandingWork;
use crate::task::door::{Delivery, Door, DoorCommand, DOOR_ATTEMPTS};
use crate::task::launcher::BallLauncher;

pub struct Context<P: Platform> {
    /// Latest raw rangefinder reading
    pub distance: DistanceRegister,
    /// Actuation timelines still running
    pub work: OutstandingWork,
    stop: AtomicBool,
    sampler_running: AtomicBool,
    sampler_exited: Signal<CriticalSectionRawMutex, ()>,
    door: Mutex<CriticalSectionRawMutex, Option<Door<P::Bus>>>,
    launcher: Mutex<CriticalSectionRawMutex, Option<BallLauncher<P::Launch>>>,
    clock: P::Clock,
    delay: P::Delay,
    audio: P::Audio,
}

impl<P: Platform> Context<P> {
    pub fn new(
        door: Door<P::Bus>,
        launcher: BallLauncher<P::Launch>,
        clock: P::Clock,
        delay: P::Delay,
        audio: P::Audio,
    ) -> Self {
        Self {
            distance: DistanceRegister::new(),
            work: OutstandingWork::new(),
            stop: AtomicBool::new(false),
            sampler_running: AtomicBool::new(false),
            sampler_exited: Signal::new(),
            door: Mutex::new(Some(door)),
            launcher: Mutex::new(Some(launcher)),
            clock,
            delay,
            audio,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// A fresh handle on the delay provider
    pub fn delay(&self) -> P::Delay {
        self.delay.clone()
    }

    pub async fn pause(&self, duration: Duration) {
        clock::pause(&mut self.delay(), duration).await;
    }

    pub fn audio(&self) -> &P::Audio {
        &self.audio
    }

    /// Asks every loop to wind down at its next iteration
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Called right before the sampler task is spawned
    pub fn sampler_started(&self) {
        self.sampler_running.store(true, Ordering::SeqCst);
    }

    /// Called by the sampler as the very last thing it does
    pub fn sampler_finished(&self) {
        self.sampler_running.store(false, Ordering::SeqCst);
        self.sampler_exited.signal(());
    }

    /// Waits for the sampler to exit; returns at once if it never ran
    pub async fn join_sampler(&self) {
        if self.sampler_running.load(Ordering::SeqCst) {
            self.sampler_exited.wait().await;
        }
    }

    /// Sends a door command with the standard retry budget
    pub async fn send_door(&self, command: DoorCommand) -> Delivery {
        let mut door = self.door.lock().await;
        match door.as_mut() {
            Some(door) => door.send(command, DOOR_ATTEMPTS, &mut self.delay()).await,
            None => {
                warn!("Door already released, dropping {:?}", command);
                Delivery::Failed { attempts: 0 }
            }
        }
    }

    /// Fires one ball, holding the solenoid for `duration`
    pub async fn fire_ball(&self, duration: Duration) {
        let mut launcher = self.launcher.lock().await;
        match launcher.as_mut() {
            Some(launcher) => launcher.fire(duration, &mut self.delay()).await,
            None => warn!("Launcher already released, not firing"),
        }
    }

    /// Drops every actuator handle and silences audio
    ///
    /// Waits for anyone currently using an actuator to finish with it first.
    /// Safe to call more than once.
    pub async fn release(&self) {
        let launcher = self.launcher.lock().await.take();
        let door = self.door.lock().await.take();
        if launcher.is_some() || door.is_some() {
            info!("Releasing hardware");
        }
        drop(launcher);
        drop(door);
        self.audio.silence();
    }

    /// Best effort synchronous release for paths that cannot await
    pub fn release_now(&self) {
        match self.launcher.try_lock() {
            Ok(mut launcher) => drop(launcher.take()),
            Err(_) => warn!("Launcher busy, leaving it to the kernel"),
        }
        match self.door.try_lock() {
            Ok(mut door) => drop(door.take()),
            Err(_) => warn!("Door busy, leaving it to the kernel"),
        }
        self.audio.silence();
    }
}
