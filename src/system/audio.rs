//! Audio cues
//!
//! Sound is fire-and-forget: the control loop asks for a cue and moves on
//! without ever waiting for playback or checking that it worked.

use core::cell::RefCell;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use log::{debug, warn};

/// Player used when none is configured
pub const DEFAULT_PLAYER: &str = "mpg123";
/// Directory holding the sound assets
pub const DEFAULT_SOUNDS_DIR: &str = "/usr/share/monster-prop/sounds";

/// Played right before a fire sequence
pub const FIRE_CUE: &str = "fire.mp3";
/// Played when somebody lingers in the approach zone
pub const APPROACH_CUE: &str = "come_closer.mp3";
/// Played by say-hi
pub const HELLO_CUE: &str = "hello.mp3";
/// Background track looped while the control loop runs
pub const AMBIENT_LOOP: &str = "ambient.mp3";

/// Something that can play named sound assets
pub trait Audio {
    /// Plays `asset` once
    fn play(&self, asset: &str);
    /// Plays `asset` until silenced
    fn loop_play(&self, asset: &str);
    /// Stops everything that is still playing
    fn silence(&self) {}
}

/// Plays assets by spawning an external player process per cue
pub struct ProcessAudio {
    program: String,
    sounds: PathBuf,
    children: Mutex<CriticalSectionRawMutex, RefCell<Vec<Child>>>,
}

impl ProcessAudio {
    pub fn new(program: impl Into<String>, sounds: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            sounds: sounds.into(),
            children: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    fn spawn(&self, asset: &str, looped: bool) {
        let path = self.sounds.join(asset);
        let mut command = Command::new(&self.program);
        command.arg("-q");
        if looped {
            command.args(["--loop", "-1"]);
        }
        command
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match command.spawn() {
            Ok(child) => {
                debug!("Playing {} (pid {})", path.display(), child.id());
                self.children.lock(|children| {
                    let mut children = children.borrow_mut();
                    // reap whatever already finished so the list stays short
                    children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
                    children.push(child);
                });
            }
            Err(e) => warn!("Failed to start {} for {}: {}", self.program, path.display(), e),
        }
    }
}

impl Audio for ProcessAudio {
    fn play(&self, asset: &str) {
        self.spawn(asset, false);
    }

    fn loop_play(&self, asset: &str) {
        self.spawn(asset, true);
    }

    fn silence(&self) {
        self.children.lock(|children| {
            for mut child in children.borrow_mut().drain(..) {
                let _ = child.kill();
                let _ = child.wait();
            }
        });
    }
}

impl Drop for ProcessAudio {
    fn drop(&mut self) {
        self.silence();
    }
}
