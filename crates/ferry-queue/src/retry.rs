//! Per-object retry accounting.

use std::collections::HashMap;
use std::sync::Mutex;

use ferry_types::{Oid, TransferError};
use tracing::debug;

/// Maps OIDs to the number of retries already enqueued, under a cap.
///
/// The ledger is agnostic of error shapes; classification is delegated to
/// [`TransferError::is_retriable`].
pub(crate) struct RetryLedger {
    counts: Mutex<HashMap<Oid, u32>>,
    max_retries: u32,
}

impl RetryLedger {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            max_retries,
        }
    }

    /// Record one more retry for `oid`, returning the new count.
    pub(crate) fn record(&self, oid: &Oid) -> u32 {
        let mut counts = self.counts.lock().expect("retry lock poisoned");
        let count = counts.entry(oid.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Retries enqueued so far for `oid`.
    pub(crate) fn count(&self, oid: &Oid) -> u32 {
        self.counts
            .lock()
            .expect("retry lock poisoned")
            .get(oid)
            .copied()
            .unwrap_or(0)
    }

    /// Whether `oid` may be retried after failing with `err`.
    ///
    /// True iff the retries already enqueued do not exceed the cap *and*
    /// the error is classified retriable. The comparison is `<=` because
    /// the count reflects re-enqueues already made; the cap is the number
    /// of extra attempts permitted.
    pub(crate) fn can_retry_object(&self, oid: &Oid, err: &TransferError) -> bool {
        let count = self.count(oid);
        if count > self.max_retries {
            debug!(%oid, count, "refusing retry, cap exhausted");
            return false;
        }
        err.is_retriable()
    }
}
