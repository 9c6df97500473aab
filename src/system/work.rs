//! Outstanding work tracking
//!
//! Counts actuation timelines that run detached from the control loop. Every
//! timeline holds a [`WorkToken`] for as long as it runs; shutdown waits for
//! the count to drop to zero before hardware is released.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::signal::Signal;

/// Wait group for in-flight actuation work
pub struct OutstandingWork {
    count: Mutex<CriticalSectionRawMutex, Cell<usize>>,
    /// Raised every time the count returns to zero
    idle: Signal<CriticalSectionRawMutex, ()>,
}

impl OutstandingWork {
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
            idle: Signal::new(),
        }
    }

    /// Registers one unit of work; it stays outstanding until the token drops
    pub fn begin(&self) -> WorkToken<'_> {
        self.count.lock(|count| count.set(count.get() + 1));
        WorkToken { work: self }
    }

    /// Number of tokens currently alive
    pub fn pending(&self) -> usize {
        self.count.lock(|count| count.get())
    }

    /// Resolves once no work is outstanding
    pub async fn wait_idle(&self) {
        loop {
            if self.pending() == 0 {
                return;
            }
            // a stale signal from an earlier idle period just loops once more
            self.idle.wait().await;
        }
    }

    fn finish(&self) {
        let remaining = self.count.lock(|count| {
            let remaining = count.get().saturating_sub(1);
            count.set(remaining);
            remaining
        });
        if remaining == 0 {
            self.idle.signal(());
        }
    }
}

impl Default for OutstandingWork {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of one outstanding unit of work, released on drop
#[must_use = "work is finished as soon as the token is dropped"]
pub struct WorkToken<'a> {
    work: &'a OutstandingWork,
}

impl Drop for WorkToken<'_> {
    fn drop(&mut self) {
        self.work.finish();
    }
}
