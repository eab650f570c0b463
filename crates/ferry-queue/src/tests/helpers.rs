//! Shared fixtures: a scripted negotiation client, registries around
//! [`SimAdapter`] instances, and small constructors.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ferry_adapter::{AdapterRegistry, SimAdapter, TransferAdapter};
use ferry_api::{ActionLink, BatchRequest, BatchResponse, ObjectClient, ObjectError, ObjectResource};
use ferry_config::{ConfigError, ConfigWriter, TransferConfig};
use ferry_progress::{ProgressMeter, TallyMeter};
use ferry_types::{Direction, Oid, TransferError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{TransferQueue, Transferable};

pub(crate) fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// A transferable named after its OID.
pub(crate) fn t(oid: &str, size: u64) -> Transferable {
    Transferable::new(oid, size, format!("{oid}.bin"), format!("/tmp/{oid}.bin"))
}

/// Default batched configuration.
pub(crate) fn batch_config() -> TransferConfig {
    TransferConfig::default()
}

/// Configuration that starts in legacy per-object mode.
pub(crate) fn legacy_config() -> TransferConfig {
    TransferConfig {
        batch_transfer: false,
        ..TransferConfig::default()
    }
}

/// A registry serving the given sim adapters, preference in slice order.
///
/// Each factory returns the same instance every time, so tests can assert
/// on recorded submissions after the run.
pub(crate) fn registry_of(adapters: &[&Arc<SimAdapter>]) -> Arc<AdapterRegistry> {
    let registry = AdapterRegistry::new();
    for sim in adapters {
        let instance = Arc::clone(sim);
        registry.register(
            sim.name().to_string(),
            Arc::new(move |_direction: Direction| {
                Arc::clone(&instance) as Arc<dyn TransferAdapter>
            }),
        );
    }
    Arc::new(registry)
}

/// A download queue over one basic sim adapter and a tally meter.
pub(crate) fn download_queue(
    config: TransferConfig,
    client: &Arc<ScriptClient>,
    basic: &Arc<SimAdapter>,
    meter: &Arc<TallyMeter>,
) -> TransferQueue {
    TransferQueue::new(
        Direction::Download,
        config,
        Arc::clone(client) as Arc<dyn ObjectClient>,
        registry_of(&[basic]),
        Arc::clone(meter) as Arc<dyn ProgressMeter>,
        None,
    )
}

/// Collect every OID a watcher delivers until it closes.
pub(crate) fn spawn_drain(mut rx: mpsc::Receiver<Oid>) -> JoinHandle<Vec<Oid>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(oid) = rx.recv().await {
            seen.push(oid);
        }
        seen
    })
}

/// Occurrences of `oid` in a submission log.
pub(crate) fn submissions_for(submissions: &[Oid], oid: &str) -> usize {
    let oid = Oid::from(oid);
    submissions.iter().filter(|s| **s == oid).count()
}

/// A [`ConfigWriter`] that records the disable call instead of touching disk.
#[derive(Default)]
pub(crate) struct RecordingConfigWriter {
    disabled: AtomicBool,
}

impl RecordingConfigWriter {
    pub(crate) fn disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

impl ConfigWriter for RecordingConfigWriter {
    fn disable_batch_transfer(&self) -> Result<(), ConfigError> {
        self.disabled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn with_action(direction: Direction, oid: &Oid, size: u64) -> ObjectResource {
    let mut resource = ObjectResource::new(oid.clone(), size);
    resource.actions.insert(
        direction.as_str().to_string(),
        ActionLink {
            href: format!("https://remote.test/objects/{oid}"),
            header: HashMap::new(),
            expires_at: None,
        },
    );
    resource
}

/// A scripted [`ObjectClient`].
///
/// By default every object negotiates successfully with an action link for
/// the requested direction. Tests queue up batch-level errors, mark objects
/// as already satisfied, attach per-object errors, or script legacy
/// failures; every call is recorded for later assertions.
#[derive(Default)]
pub(crate) struct ScriptClient {
    batch_errors: Mutex<VecDeque<TransferError>>,
    adapter: Mutex<Option<String>>,
    satisfied: Mutex<HashSet<Oid>>,
    object_errors: Mutex<HashMap<Oid, ObjectError>>,
    legacy_errors: Mutex<HashMap<Oid, VecDeque<TransferError>>>,
    batch_sizes: Mutex<Vec<usize>>,
    advertised: Mutex<Vec<Vec<String>>>,
    legacy_calls: Mutex<Vec<Oid>>,
}

impl ScriptClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next batch call with `err` (queued; one error per call).
    pub(crate) fn fail_next_batch(&self, err: TransferError) {
        self.batch_errors.lock().unwrap().push_back(err);
    }

    /// Name the adapter in every successful batch response.
    pub(crate) fn choose_adapter(&self, name: &str) {
        *self.adapter.lock().unwrap() = Some(name.to_string());
    }

    /// Negotiate `oid` as already satisfied (no action link / no resource).
    pub(crate) fn mark_satisfied(&self, oid: &str) {
        self.satisfied.lock().unwrap().insert(Oid::from(oid));
    }

    /// Attach a per-object error to `oid` in batch responses.
    pub(crate) fn reject_object(&self, oid: &str, code: u32, message: &str) {
        self.object_errors.lock().unwrap().insert(
            Oid::from(oid),
            ObjectError {
                code,
                message: message.to_string(),
            },
        );
    }

    /// Fail the next legacy check for `oid` with `err` (queued).
    pub(crate) fn fail_legacy(&self, oid: &str, err: TransferError) {
        self.legacy_errors
            .lock()
            .unwrap()
            .entry(Oid::from(oid))
            .or_default()
            .push_back(err);
    }

    /// Sizes of every batch call made so far.
    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    /// Adapter names advertised on each batch call.
    pub(crate) fn advertised(&self) -> Vec<Vec<String>> {
        self.advertised.lock().unwrap().clone()
    }

    /// OIDs checked through the legacy endpoint, in call order.
    pub(crate) fn legacy_calls(&self) -> Vec<Oid> {
        self.legacy_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ObjectClient for ScriptClient {
    async fn batch(&self, request: &BatchRequest) -> Result<BatchResponse, TransferError> {
        // Snapshot the scripted state before recording the call, so a test
        // that sequences on batch_sizes() cannot race this response.
        let chosen = self.adapter.lock().unwrap().clone();
        let queued_error = self.batch_errors.lock().unwrap().pop_front();

        self.batch_sizes.lock().unwrap().push(request.objects.len());
        self.advertised.lock().unwrap().push(request.transfers.clone());

        if let Some(err) = queued_error {
            return Err(err);
        }

        let resources = request
            .objects
            .iter()
            .map(|item| {
                if let Some(obj_err) = self.object_errors.lock().unwrap().get(&item.oid) {
                    let mut resource = ObjectResource::new(item.oid.clone(), item.size);
                    resource.error = Some(obj_err.clone());
                    resource
                } else if self.satisfied.lock().unwrap().contains(&item.oid) {
                    ObjectResource::new(item.oid.clone(), item.size)
                } else {
                    with_action(request.operation, &item.oid, item.size)
                }
            })
            .collect();

        Ok(BatchResponse {
            transfer: chosen,
            objects: resources,
        })
    }

    async fn legacy_check(
        &self,
        direction: Direction,
        oid: &Oid,
        size: u64,
    ) -> Result<Option<ObjectResource>, TransferError> {
        self.legacy_calls.lock().unwrap().push(oid.clone());

        if let Some(queued) = self.legacy_errors.lock().unwrap().get_mut(oid) {
            if let Some(err) = queued.pop_front() {
                return Err(err);
            }
        }

        if self.satisfied.lock().unwrap().contains(oid) {
            return Ok(None);
        }

        Ok(Some(with_action(direction, oid, size)))
    }
}
