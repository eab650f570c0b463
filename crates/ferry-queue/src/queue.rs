//! The transfer queue orchestrator.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use ferry_adapter::{AdapterRegistry, BASIC_ADAPTER, ProgressCallback, TransferJob, TransferResult};
use ferry_api::{BatchItem, BatchRequest, ObjectClient, ObjectResource};
use ferry_batch::Batcher;
use ferry_config::{ConfigWriter, TransferConfig};
use ferry_progress::ProgressMeter;
use ferry_types::{Direction, Oid, TransferError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::driver::AdapterDriver;
use crate::pending::Pending;
use crate::retry::RetryLedger;
use crate::transferable::Transferable;

/// Objects negotiated per metadata call; also the buffer depth of the
/// queue's internal intakes and of watcher sinks.
const BATCH_SIZE: usize = ferry_batch::DEFAULT_BATCH_SIZE;

#[derive(Default)]
struct Handles {
    negotiator: Option<JoinHandle<()>>,
    retry_collector: Option<JoinHandle<()>>,
    error_collector: Option<JoinHandle<()>>,
    result_loop: Option<JoinHandle<()>>,
}

/// Organises the wider process of uploading and downloading: negotiating
/// with the remote, handing jobs to transfer adapters, and dealing with
/// progress, errors and retries.
///
/// Construct with [`TransferQueue::new`] inside a tokio runtime, feed it
/// with [`add`](Self::add), then call [`wait`](Self::wait) to drain and
/// quiesce. Accumulated failures are read with [`errors`](Self::errors)
/// afterwards.
pub struct TransferQueue {
    inner: Arc<Inner>,
    handles: tokio::sync::Mutex<Handles>,
    wait_done: tokio::sync::Mutex<bool>,
}

struct Inner {
    direction: Direction,
    config: TransferConfig,
    client: Arc<dyn ObjectClient>,
    adapters: Arc<AdapterRegistry>,
    meter: Arc<dyn ProgressMeter>,
    config_writer: Option<Arc<dyn ConfigWriter>>,
    driver: AdapterDriver,
    progress: ProgressCallback,

    sealed: AtomicBool,
    transferables: Mutex<HashMap<Oid, Arc<Transferable>>>,
    retries: RetryLedger,
    pending: Pending,
    batcher: Option<Batcher<Arc<Transferable>>>,

    // Intakes. Each has exactly one closer (wait) and multiple writers;
    // writers clone the sender per send, so taking the stored sender is
    // what closes the channel.
    legacy_tx: Mutex<Option<mpsc::Sender<Arc<Transferable>>>>,
    legacy_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Arc<Transferable>>>>,
    retry_tx: Mutex<Option<mpsc::Sender<Arc<Transferable>>>>,
    error_tx: Mutex<Option<mpsc::Sender<TransferError>>>,
    results_tx: Mutex<Option<mpsc::Sender<TransferResult>>>,

    watchers: Mutex<Option<Vec<mpsc::Sender<Oid>>>>,
    errors: Mutex<Vec<TransferError>>,
    meter_started: Once,
    workers_launched: AtomicBool,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TransferQueue {
    /// Build a queue and start its worker loops.
    ///
    /// Negotiation mode follows `config.batch_transfer`; the adapter
    /// concurrency budget and the legacy worker count follow
    /// `config.concurrent_transfers`. `config_writer`, when given, is how
    /// the queue persists the batch-mode preference after a remote reports
    /// the batch endpoint unimplemented.
    pub fn new(
        direction: Direction,
        config: TransferConfig,
        client: Arc<dyn ObjectClient>,
        adapters: Arc<AdapterRegistry>,
        meter: Arc<dyn ProgressMeter>,
        config_writer: Option<Arc<dyn ConfigWriter>>,
    ) -> Self {
        let (legacy_tx, legacy_rx) = mpsc::channel(BATCH_SIZE);
        let (retry_tx, retry_rx) = mpsc::channel(BATCH_SIZE);
        let (error_tx, error_rx) = mpsc::channel(BATCH_SIZE);
        let (results_tx, results_rx) = mpsc::channel(BATCH_SIZE);

        let progress: ProgressCallback = {
            let meter = Arc::clone(&meter);
            Arc::new(move |name: &str, read, total, current| {
                meter.transfer_bytes(direction, name, read, total, current);
            })
        };

        let batcher = config.batch_transfer.then(|| Batcher::new(BATCH_SIZE));

        let inner = Arc::new(Inner {
            direction,
            driver: AdapterDriver::new(Arc::clone(&adapters), direction, config.concurrent_transfers),
            client,
            adapters,
            meter,
            config_writer,
            progress,
            sealed: AtomicBool::new(false),
            transferables: Mutex::new(HashMap::new()),
            retries: RetryLedger::new(config.max_retries),
            pending: Pending::new(),
            batcher,
            legacy_tx: Mutex::new(Some(legacy_tx)),
            legacy_rx: Arc::new(tokio::sync::Mutex::new(legacy_rx)),
            retry_tx: Mutex::new(Some(retry_tx)),
            error_tx: Mutex::new(Some(error_tx)),
            results_tx: Mutex::new(Some(results_tx)),
            watchers: Mutex::new(Some(Vec::new())),
            errors: Mutex::new(Vec::new()),
            meter_started: Once::new(),
            workers_launched: AtomicBool::new(false),
            worker_handles: Mutex::new(Vec::new()),
            config,
        });

        let mut handles = Handles {
            error_collector: Some(tokio::spawn(error_collector(Arc::clone(&inner), error_rx))),
            retry_collector: Some(tokio::spawn(retry_collector(Arc::clone(&inner), retry_rx))),
            result_loop: Some(tokio::spawn(result_loop(Arc::clone(&inner), results_rx))),
            negotiator: None,
        };

        if inner.batcher.is_some() {
            debug!(batch_size = BATCH_SIZE, "running as batched queue");
            handles.negotiator = Some(tokio::spawn(batch_routine(Arc::clone(&inner))));
        } else {
            debug!("running as individual queue");
            inner.launch_legacy_workers();
        }

        Self {
            inner,
            handles: tokio::sync::Mutex::new(handles),
            wait_done: tokio::sync::Mutex::new(false),
        }
    }

    /// Submit one object for transfer.
    ///
    /// Only the first `add` of an OID registers it and counts toward the
    /// pending work; later duplicates are dropped. May be called from any
    /// task until [`wait`](Self::wait) has been initiated.
    pub async fn add(&self, t: Transferable) {
        if self.inner.sealed.load(Ordering::SeqCst) {
            warn!(oid = %t.oid(), "add after wait; dropping");
            return;
        }
        self.inner.add_transferable(Arc::new(t)).await;
    }

    /// Inform the progress meter that `size` bytes will not be transferred.
    pub fn skip(&self, size: u64) {
        self.inner.meter.skip(size);
    }

    /// Register a completion sink.
    ///
    /// The OID of every successful transfer is written to every sink in
    /// registration order; sinks close when the queue quiesces. Must be
    /// called before [`wait`](Self::wait).
    pub fn watch(&self) -> mpsc::Receiver<Oid> {
        let (tx, rx) = mpsc::channel(BATCH_SIZE);
        match self
            .inner
            .watchers
            .lock()
            .expect("watcher lock poisoned")
            .as_mut()
        {
            Some(watchers) => watchers.push(tx),
            None => warn!("watch called after wait; returning a closed stream"),
        }
        rx
    }

    /// Drain the queue and quiesce every worker.
    ///
    /// Seals the queue against new work, publishes the partial batch, waits
    /// for all registered objects to terminate (retries included), then
    /// tears down in order: retry collector, negotiation routine, legacy
    /// workers, adapter session, result loop, error collector, watcher
    /// sinks, meter. Idempotent.
    pub async fn wait(&self) {
        let mut done = self.wait_done.lock().await;
        if *done {
            return;
        }

        self.inner.sealed.store(true, Ordering::SeqCst);

        // Publish any partial batch so everything submitted can negotiate.
        // The batcher itself is not exited yet: the negotiation routine must
        // stay alive for batches re-entered by the retry collector.
        if let Some(batcher) = &self.inner.batcher {
            batcher.flush();
        }

        self.inner.pending.wait().await;

        let mut handles = self.handles.lock().await;

        // Nothing is outstanding, so the retry intake is idle: close it and
        // drain the collector.
        self.inner.retry_tx.lock().expect("retry lock poisoned").take();
        if let Some(handle) = handles.retry_collector.take() {
            let _ = handle.await;
        }

        // Stop feeding the legacy workers and let the negotiation routine
        // observe end of input.
        self.inner.legacy_tx.lock().expect("legacy lock poisoned").take();
        if let Some(batcher) = &self.inner.batcher {
            batcher.exit();
        }
        if let Some(handle) = handles.negotiator.take() {
            let _ = handle.await;
        }

        // Legacy workers (initial mode or fallback) exit once the channel
        // drains; the launcher may still be adding handles while we join.
        loop {
            let workers: Vec<_> = {
                let mut held = self
                    .inner
                    .worker_handles
                    .lock()
                    .expect("worker lock poisoned");
                held.drain(..).collect()
            };
            if workers.is_empty() {
                break;
            }
            for worker in workers {
                let _ = worker.await;
            }
        }

        self.inner.driver.finish().await;

        // The adapter's forwarder is gone; ours is the last result sender.
        self.inner
            .results_tx
            .lock()
            .expect("results lock poisoned")
            .take();
        if let Some(handle) = handles.result_loop.take() {
            let _ = handle.await;
        }

        self.inner.error_tx.lock().expect("error lock poisoned").take();
        if let Some(handle) = handles.error_collector.take() {
            let _ = handle.await;
        }

        if let Some(watchers) = self
            .inner
            .watchers
            .lock()
            .expect("watcher lock poisoned")
            .take()
        {
            drop(watchers);
        }

        self.inner.meter.finish();
        debug!("transfer queue quiesced");
        *done = true;
    }

    /// Errors accumulated so far, in reporting order.
    pub fn errors(&self) -> Vec<TransferError> {
        self.inner.errors.lock().expect("errors lock poisoned").clone()
    }
}

impl Inner {
    /// Register (first sight) and route one transferable.
    ///
    /// Re-adds of a registered OID are dropped unless the retry ledger has
    /// recorded a retry for it — that is how retry re-entry shares this
    /// path without a second registration or pending increment.
    async fn add_transferable(self: &Arc<Self>, t: Arc<Transferable>) {
        let (t, newly_registered) = {
            let mut map = self.transferables.lock().expect("registry lock poisoned");
            match map.entry(t.oid().clone()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&t));
                    (t, true)
                }
            }
        };

        if newly_registered {
            self.pending.add();
            trace!(oid = %t.oid(), size = t.size(), "registered transferable");
        } else if self.retries.count(t.oid()) == 0 {
            trace!(oid = %t.oid(), "duplicate add dropped");
            return;
        }

        match &self.batcher {
            Some(batcher) => batcher.add(t),
            None => self.send_legacy(t).await,
        }
    }

    fn registered(&self, oid: &Oid) -> Option<Arc<Transferable>> {
        self.transferables
            .lock()
            .expect("registry lock poisoned")
            .get(oid)
            .cloned()
    }

    async fn send_legacy(&self, t: Arc<Transferable>) {
        let tx = self.legacy_tx.lock().expect("legacy lock poisoned").clone();
        match tx {
            Some(tx) => {
                let _ = tx.send(t).await;
            }
            None => warn!(oid = %t.oid(), "legacy intake closed; dropping"),
        }
    }

    async fn send_retry(&self, t: Arc<Transferable>) {
        let tx = self.retry_tx.lock().expect("retry lock poisoned").clone();
        match tx {
            Some(tx) => {
                let _ = tx.send(t).await;
            }
            None => warn!(oid = %t.oid(), "retry intake closed; dropping"),
        }
    }

    async fn report_error(&self, err: TransferError) {
        let tx = self.error_tx.lock().expect("error lock poisoned").clone();
        match tx {
            Some(tx) => {
                let _ = tx.send(err).await;
            }
            None => warn!(error = %err, "error intake closed; dropping"),
        }
    }

    fn start_meter(&self) {
        self.meter_started.call_once(|| self.meter.start());
    }

    fn can_retry_object(&self, oid: &Oid, err: &TransferError) -> bool {
        self.retries.can_retry_object(oid, err)
    }

    /// Hand a negotiated transferable to the adapter (or short-circuit it
    /// in dry-run mode).
    async fn add_to_adapter(self: &Arc<Self>, t: Arc<Transferable>) {
        let Some(resource) = t.resource() else {
            warn!(oid = %t.oid(), "transferable reached the adapter without a resource");
            self.pending.done();
            return;
        };
        let job = TransferJob::new(t.name(), t.path(), resource);

        if self.config.dry_run {
            debug!(oid = %t.oid(), "dry run; not transferring");
            self.handle_result(TransferResult::ok(job)).await;
            return;
        }

        let results = self
            .results_tx
            .lock()
            .expect("results lock poisoned")
            .clone();
        let Some(results) = results else {
            warn!(oid = %t.oid(), "result intake closed; dropping job");
            return;
        };

        if let Err(err) = self.driver.ensure_begun(&self.progress, results).await {
            self.report_error(err).await;
            self.meter.skip(t.size());
            self.pending.done();
            return;
        }
        self.driver.submit(job).await;
    }

    /// Arbitrate one adapter result: complete, retry, or fail.
    async fn handle_result(self: &Arc<Self>, result: TransferResult) {
        let oid = result.oid().clone();

        let Some(err) = result.error else {
            let watchers = self
                .watchers
                .lock()
                .expect("watcher lock poisoned")
                .clone()
                .unwrap_or_default();
            for watcher in watchers {
                let _ = watcher.send(oid.clone()).await;
            }
            self.meter.finish_transfer(&result.job.name);
            self.pending.done();
            return;
        };

        if self.can_retry_object(&oid, &err) {
            match self.registered(&oid) {
                Some(t) => {
                    debug!(%oid, "retrying object");
                    self.send_retry(t).await;
                }
                None => {
                    // Results come from jobs this queue submitted, so a
                    // missing registration is an internal invariant breach.
                    debug_assert!(false, "result for unregistered object {oid}");
                    warn!(%oid, "result for unregistered object");
                    self.report_error(err).await;
                }
            }
        } else {
            self.report_error(err).await;
            self.pending.done();
        }
    }

    /// Route one negotiated resource from a successful batch response.
    async fn dispatch_negotiated(self: &Arc<Self>, resource: ObjectResource) {
        if let Some(obj_err) = &resource.error {
            let err = TransferError::Object {
                oid: resource.oid.clone(),
                code: obj_err.code,
                message: obj_err.message.clone(),
            };
            self.report_error(err).await;
            self.meter.skip(resource.size);
            self.pending.done();
            return;
        }

        if resource.action_for(self.direction).is_none() {
            debug!(oid = %resource.oid, "object already satisfied; skipping");
            self.meter.skip(resource.size);
            self.pending.done();
            return;
        }

        match self.registered(&resource.oid) {
            Some(t) => {
                t.set_resource(resource);
                self.meter.add(t.name());
                self.add_to_adapter(t).await;
            }
            None => {
                // Remote-controlled data; log the anomaly, leave the
                // pending counter alone (nothing was registered for it).
                warn!(oid = %resource.oid, "remote negotiated an object this queue never added");
                self.meter.skip(resource.size);
            }
        }
    }

    /// Start the legacy negotiation workers, once.
    ///
    /// A single worker runs first; its first successful negotiation signals
    /// the launcher to start the rest, so a credential prompt happens once
    /// rather than `concurrent_transfers` times.
    fn launch_legacy_workers(self: &Arc<Self>) {
        if self.workers_launched.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(self);
        let launcher = tokio::spawn(async move {
            let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);

            let first = tokio::spawn(legacy_worker(Arc::clone(&inner), Some(ready_tx)));
            inner
                .worker_handles
                .lock()
                .expect("worker lock poisoned")
                .push(first);

            if ready_rx.recv().await.is_some() {
                let extra = inner.config.concurrent_transfers.saturating_sub(1);
                debug!(workers = extra + 1, "launching remaining negotiation workers");

                let mut held = inner.worker_handles.lock().expect("worker lock poisoned");
                for _ in 0..extra {
                    held.push(tokio::spawn(legacy_worker(Arc::clone(&inner), None)));
                }
            }
        });

        self.worker_handles
            .lock()
            .expect("worker lock poisoned")
            .push(launcher);
    }
}

/// Negotiates batches until the batcher ends (or batch support turns out
/// to be missing, in which case everything is rerouted to the legacy
/// workers and this routine retires).
async fn batch_routine(inner: Arc<Inner>) {
    let batcher = inner
        .batcher
        .as_ref()
        .expect("batch routine requires a batcher");
    let adapter_names = inner.adapters.names();

    while let Some(batch) = batcher.next().await {
        if batch.is_empty() {
            continue;
        }
        debug!(size = batch.len(), "sending batch");

        let request = BatchRequest {
            operation: inner.direction,
            transfers: adapter_names.clone(),
            objects: batch
                .iter()
                .map(|t| BatchItem {
                    oid: t.oid().clone(),
                    size: t.size(),
                })
                .collect(),
        };

        match inner.client.batch(&request).await {
            Err(err) if err.is_not_implemented() => {
                info!("batch negotiation not implemented; falling back to per-object requests");
                if let Some(writer) = &inner.config_writer {
                    if let Err(persist_err) = writer.disable_batch_transfer() {
                        warn!(error = %persist_err, "failed to persist batch preference");
                    }
                }

                inner.launch_legacy_workers();
                for t in batch {
                    inner.send_legacy(t).await;
                }
                while let Some(batch) = batcher.next().await {
                    for t in batch {
                        inner.send_legacy(t).await;
                    }
                }
                return;
            }
            Err(err) => {
                // One negotiation failure covers the whole batch: retry what
                // can be retried, fail the rest, but surface the error once.
                let mut reported = false;
                for t in batch {
                    if inner.can_retry_object(t.oid(), &err) {
                        inner.send_retry(t).await;
                    } else {
                        inner.pending.done();
                        if !reported {
                            reported = true;
                            inner.report_error(err.clone()).await;
                        }
                    }
                }
            }
            Ok(response) => {
                let adapter_name = response.transfer.as_deref().unwrap_or(BASIC_ADAPTER);
                inner.driver.use_adapter(adapter_name).await;
                inner.start_meter();

                for resource in response.objects {
                    inner.dispatch_negotiated(resource).await;
                }
            }
        }
    }
}

/// One legacy negotiation worker: pulls individual transferables and
/// resolves them through the per-object endpoint. Only the first worker
/// carries the `ready` signal used to launch the rest.
async fn legacy_worker(inner: Arc<Inner>, ready: Option<mpsc::Sender<()>>) {
    loop {
        let t = { inner.legacy_rx.lock().await.recv().await };
        let Some(t) = t else { break };

        match inner
            .client
            .legacy_check(inner.direction, t.oid(), t.size())
            .await
        {
            Err(err) => {
                if inner.can_retry_object(t.oid(), &err) {
                    inner.send_retry(t).await;
                } else {
                    inner.report_error(err).await;
                    inner.pending.done();
                }
            }
            Ok(resource) => {
                if let Some(ready) = &ready {
                    inner.start_meter();
                    let _ = ready.try_send(());
                }

                // The legacy protocol predates adapter selection.
                inner.driver.use_adapter(BASIC_ADAPTER).await;

                match resource {
                    Some(resource) => {
                        t.set_resource(resource);
                        inner.meter.add(t.name());
                        inner.add_to_adapter(t).await;
                    }
                    None => {
                        debug!(oid = %t.oid(), "object already satisfied; skipping");
                        inner.meter.skip(t.size());
                        inner.pending.done();
                    }
                }
            }
        }
    }
}

/// Feeds adapter results to the arbitration logic.
async fn result_loop(inner: Arc<Inner>, mut results: mpsc::Receiver<TransferResult>) {
    while let Some(result) = results.recv().await {
        inner.handle_result(result).await;
    }
}

/// Records retries in the ledger and re-enters objects through the normal
/// add path. In batch mode the batch is flushed immediately so a retried
/// object never sits in a partial batch waiting for peers that will not
/// come.
async fn retry_collector(inner: Arc<Inner>, mut retries: mpsc::Receiver<Arc<Transferable>>) {
    while let Some(t) = retries.recv().await {
        let attempt = inner.retries.record(t.oid());
        debug!(oid = %t.oid(), attempt, size = t.size(), "enqueueing retry");

        inner.add_transferable(t).await;
        if let Some(batcher) = &inner.batcher {
            batcher.flush();
        }
    }
}

/// Accumulates reported errors in arrival order.
async fn error_collector(inner: Arc<Inner>, mut errors: mpsc::Receiver<TransferError>) {
    while let Some(err) = errors.recv().await {
        debug!(error = %err, "recording transfer error");
        inner.errors.lock().expect("errors lock poisoned").push(err);
    }
}
