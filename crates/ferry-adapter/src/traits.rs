//! Core adapter traits and callback types.

use std::sync::Arc;

use ferry_types::{Direction, TransferError};
use tokio::sync::mpsc;

use crate::job::{TransferJob, TransferResult};

/// Byte-progress callback handed to an adapter at begin time.
///
/// Arguments: file name, cumulative bytes read, total bytes, and the number
/// of transfers currently in flight. Infallible; a meter can never wedge a
/// transfer.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64, usize) + Send + Sync>;

/// A pluggable byte-movement backend.
///
/// Implementations vary in protocol and internal concurrency; the queue only
/// sees this capability set. At most one session (`begin` .. `end`) is
/// active per adapter at a time.
#[async_trait::async_trait]
pub trait TransferAdapter: Send + Sync {
    /// The adapter's wire name (what the remote chooses by).
    fn name(&self) -> &str;

    /// Start a transfer session.
    ///
    /// The adapter may run up to `max_concurrency` simultaneous transfers,
    /// reports byte movement through `progress`, and delivers one
    /// [`TransferResult`] per submitted job on `results`. The result channel
    /// must be closed (all senders dropped) once `end` has completed.
    async fn begin(
        &self,
        max_concurrency: usize,
        progress: ProgressCallback,
        results: mpsc::Sender<TransferResult>,
    ) -> Result<(), TransferError>;

    /// Submit one job to the running session. Only valid after `begin`.
    async fn add(&self, job: TransferJob);

    /// Finish the session: wait for in-flight jobs, then close the result
    /// stream.
    async fn end(&self);
}

/// Builds adapters for a [`crate::AdapterRegistry`] entry.
pub trait AdapterFactory: Send + Sync {
    /// Create an adapter for the given transfer direction.
    fn new_adapter(&self, direction: Direction) -> Arc<dyn TransferAdapter>;
}

impl<F> AdapterFactory for F
where
    F: Fn(Direction) -> Arc<dyn TransferAdapter> + Send + Sync,
{
    fn new_adapter(&self, direction: Direction) -> Arc<dyn TransferAdapter> {
        self(direction)
    }
}
