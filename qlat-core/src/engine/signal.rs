use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot latch: once fired it stays fired, and every current or future waiter
/// is released.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub(crate) async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent `fire` can't be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// External stop request for a run (e.g. Ctrl-C). Cloning shares the same signal.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Signal>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.fire();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.is_fired()
    }

    pub async fn stopped(&self) {
        self.inner.wait().await;
    }
}
