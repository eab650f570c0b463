//! Outstanding-work counter with awaitable quiescence.

use tokio::sync::watch;
use tracing::warn;

/// Counts objects that have been registered but not yet terminated.
///
/// Incremented once per unique OID at registration, decremented exactly
/// once when that OID reaches a terminal state (success, final failure, or
/// skip). A retry keeps the object outstanding, so [`wait`](Self::wait)
/// cannot complete while any retry is in flight.
pub(crate) struct Pending {
    counter: watch::Sender<usize>,
}

impl Pending {
    pub(crate) fn new() -> Self {
        let (counter, _) = watch::channel(0);
        Self { counter }
    }

    /// One more object outstanding.
    pub(crate) fn add(&self) {
        self.counter.send_modify(|n| *n += 1);
    }

    /// One object reached a terminal state.
    pub(crate) fn done(&self) {
        let mut underflow = false;
        self.counter.send_modify(|n| {
            if *n == 0 {
                underflow = true;
            } else {
                *n -= 1;
            }
        });
        if underflow {
            warn!("pending counter decremented below zero; accounting bug");
        }
    }

    /// Current number of outstanding objects.
    pub(crate) fn count(&self) -> usize {
        *self.counter.borrow()
    }

    /// Wait until no objects are outstanding.
    pub(crate) async fn wait(&self) {
        let mut rx = self.counter.subscribe();
        // Err only if the sender is gone, and we hold the sender.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
