//! Adapter lifecycle management.

use std::sync::Arc;

use ferry_adapter::{
    AdapterRegistry, ProgressCallback, TransferAdapter, TransferJob, TransferResult,
};
use ferry_types::{Direction, TransferError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the result channel handed to a beginning adapter.
const ADAPTER_RESULT_BUFFER: usize = 20;

#[derive(Default)]
struct DriverState {
    adapter: Option<Arc<dyn TransferAdapter>>,
    in_progress: bool,
    forwarder: Option<JoinHandle<()>>,
}

/// Owns the currently selected adapter and its session lifecycle.
///
/// All transitions are serialised by one async mutex, held across
/// begin/end only. Results flow from the adapter's bounded channel through
/// a forwarder task into the queue's result intake, so a slow adapter
/// cannot observe queue internals and vice versa.
pub(crate) struct AdapterDriver {
    registry: Arc<AdapterRegistry>,
    direction: Direction,
    concurrency: usize,
    state: Mutex<DriverState>,
}

impl AdapterDriver {
    pub(crate) fn new(registry: Arc<AdapterRegistry>, direction: Direction, concurrency: usize) -> Self {
        Self {
            registry,
            direction,
            concurrency,
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Select the adapter registered under `name`.
    ///
    /// Reselecting the same name is a no-op (the normal path: every batch
    /// names the same adapter). Switching names while a session is in
    /// progress ends the old session first; a remote changing adapters
    /// between batches is unusual but legal.
    pub(crate) async fn use_adapter(&self, name: &str) {
        let mut state = self.state.lock().await;

        if let Some(current) = &state.adapter {
            if current.name() == name {
                return;
            }
            debug!(from = current.name(), to = name, "switching transfer adapter");
            Self::finish_locked(&mut state).await;
        }

        match self.registry.new_adapter_or_default(name, self.direction) {
            Some(adapter) => {
                debug!(adapter = adapter.name(), "selected transfer adapter");
                state.adapter = Some(adapter);
            }
            None => warn!(name, "no transfer adapter available"),
        }
    }

    /// Begin a session on the selected adapter if none is in progress.
    ///
    /// Each adapter result is forwarded into `results` by a background
    /// task that lives until [`finish`](Self::finish) observes the
    /// adapter's stream close.
    pub(crate) async fn ensure_begun(
        &self,
        progress: &ProgressCallback,
        results: mpsc::Sender<TransferResult>,
    ) -> Result<(), TransferError> {
        let mut state = self.state.lock().await;

        if state.in_progress {
            return Ok(());
        }

        let adapter = state.adapter.clone().ok_or_else(|| TransferError::AdapterInit {
            name: String::new(),
            reason: "no adapter selected".to_string(),
        })?;

        let (tx, mut rx) = mpsc::channel::<TransferResult>(ADAPTER_RESULT_BUFFER);
        debug!(adapter = adapter.name(), concurrency = self.concurrency, "starting transfer adapter");
        adapter.begin(self.concurrency, Arc::clone(progress), tx).await?;

        state.in_progress = true;
        state.forwarder = Some(tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                if results.send(result).await.is_err() {
                    warn!("result intake closed while adapter still producing");
                    break;
                }
            }
        }));

        Ok(())
    }

    /// Hand one job to the in-progress adapter.
    pub(crate) async fn submit(&self, job: TransferJob) {
        let adapter = { self.state.lock().await.adapter.clone() };
        match adapter {
            Some(adapter) => adapter.add(job).await,
            None => warn!(oid = %job.oid(), "job submitted with no adapter selected"),
        }
    }

    /// End the in-progress session, if any, and wait for its result stream
    /// to close.
    pub(crate) async fn finish(&self) {
        let mut state = self.state.lock().await;
        Self::finish_locked(&mut state).await;
    }

    async fn finish_locked(state: &mut DriverState) {
        if state.in_progress {
            if let Some(adapter) = &state.adapter {
                debug!(adapter = adapter.name(), "ending transfer adapter");
                adapter.end().await;
            }
            state.in_progress = false;
            state.adapter = None;
        }
        if let Some(forwarder) = state.forwarder.take() {
            let _ = forwarder.await;
        }
    }
}
