//! Shutdown watchdog: arms a forced-exit timer so a stuck compile or a
//! wedged capability query can't hang the host process forever after the
//! client asks it to shut down.
//!
//! A plain detached timer thread is simpler and more predictable here than
//! wiring up `tokio::time` for a single one-shot timeout, and this crate has
//! no async runtime dependency to reach for in the first place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

/// Forced-exit delay after [`Watchdog::arm`] is called.
pub const FORCED_EXIT_DELAY: Duration = Duration::from_secs(10);

/// A process-exit callback, so tests can observe the watchdog firing
/// without actually calling `std::process::exit`.
pub type ExitFn = Arc<dyn Fn() + Send + Sync>;

pub struct Watchdog {
    armed: Arc<AtomicBool>,
    disarmed: Arc<AtomicBool>,
    exit: ExitFn,
}

impl Watchdog {
    pub fn new(exit: ExitFn) -> Self {
        Self { armed: Arc::new(AtomicBool::new(false)), disarmed: Arc::new(AtomicBool::new(false)), exit }
    }

    /// Starts the forced-exit timer. Idempotent — calling `arm` twice only
    /// starts one timer.
    pub fn arm(&self) {
        if self.armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let disarmed = Arc::clone(&self.disarmed);
        let exit = Arc::clone(&self.exit);
        std::thread::spawn(move || {
            std::thread::sleep(FORCED_EXIT_DELAY);
            if !disarmed.load(Ordering::SeqCst) {
                warn!("watchdog expired without a clean shutdown, forcing exit");
                (exit)();
            }
        });
    }

    /// Cancels a pending forced exit (the process shut down cleanly before
    /// the timer elapsed).
    pub fn disarm(&self) {
        self.disarmed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn arm_is_idempotent() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let watchdog = Watchdog::new(Arc::new(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));
        watchdog.arm();
        watchdog.arm();
        watchdog.disarm();
        // Disarmed before the (10s) delay elapses, so exit should never fire.
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
