//! Cooperative cancellation
//!
//! A stop request never interrupts a plugin. It raises a shared flag that
//! plugins poll at safe points (loop iterations, input calls). Interpreters
//! that never poll cannot be stopped this way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Shared {
    requested: AtomicBool,
    notify: Notify,
}

/// Shared stop flag handed to every suspending operation of a run.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    shared: Arc<Shared>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake anything suspended in [`StopToken::stopped`].
    pub fn request_stop(&self) {
        self.shared.requested.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Check for a pending stop.
    ///
    /// With `consume` set, a pending request is cleared as it is observed, so a
    /// single request cancels exactly one in-flight run. Without it the flag
    /// is left alone, which is what long-running loops poll with.
    pub fn should_stop(&self, consume: bool) -> bool {
        if consume {
            self.shared.requested.swap(false, Ordering::SeqCst)
        } else {
            self.shared.requested.load(Ordering::SeqCst)
        }
    }

    pub fn is_requested(&self) -> bool {
        self.should_stop(false)
    }

    /// Drop any stale request. Called when a new run starts.
    pub fn reset(&self) {
        self.shared.requested.store(false, Ordering::SeqCst);
    }

    /// Resolve once a stop has been requested. Does not consume the request.
    pub async fn stopped(&self) {
        loop {
            let notified = self.shared.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}
