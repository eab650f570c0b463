//! An in-process adapter with scripted failures and seeded latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ferry_types::{Oid, TransferError};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::job::{TransferJob, TransferResult};
use crate::registry::BASIC_ADAPTER;
use crate::traits::{ProgressCallback, TransferAdapter};

enum Script {
    Transient { remaining: u32 },
    TransientAlways,
    Fatal,
}

struct Session {
    progress: ProgressCallback,
    results: mpsc::Sender<TransferResult>,
    semaphore: Arc<Semaphore>,
    tasks: Vec<JoinHandle<()>>,
}

/// A [`TransferAdapter`] that moves no bytes but behaves like one that does.
///
/// Jobs complete after an optional seeded random delay; per-object failure
/// scripts inject transient or fatal errors. Useful for exercising the
/// queue's retry, accounting, and teardown paths without a network.
///
/// # Example
///
/// ```ignore
/// let adapter = SimAdapter::new("basic")
///     .latency(1, 5)                    // 1–5 ms per job
///     .seed(42)
///     .fail_transient(oid.clone(), 1);  // first attempt fails, rest succeed
/// ```
pub struct SimAdapter {
    name: String,
    latency_ms: (u64, u64),
    refuse_begin: Option<String>,
    rng: Mutex<StdRng>,
    scripts: Mutex<HashMap<Oid, Script>>,
    submissions: Mutex<Vec<Oid>>,
    in_flight: Arc<AtomicUsize>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl SimAdapter {
    /// Create a simulation adapter with zero latency and no failures.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency_ms: (0, 0),
            refuse_begin: None,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            scripts: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// A simulation adapter under the [`BASIC_ADAPTER`] name.
    pub fn basic() -> Self {
        Self::new(BASIC_ADAPTER)
    }

    /// Set the per-job latency range in milliseconds (uniform random).
    pub fn latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the RNG seed for deterministic latency.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Fail the first `times` attempts for `oid` with a retriable error.
    pub fn fail_transient(self, oid: Oid, times: u32) -> Self {
        self.scripts
            .lock()
            .expect("script lock poisoned")
            .insert(oid, Script::Transient { remaining: times });
        self
    }

    /// Fail every attempt for `oid` with a retriable error.
    pub fn fail_transient_always(self, oid: Oid) -> Self {
        self.scripts
            .lock()
            .expect("script lock poisoned")
            .insert(oid, Script::TransientAlways);
        self
    }

    /// Fail every attempt for `oid` with a non-retriable error.
    pub fn fail_fatal(self, oid: Oid) -> Self {
        self.scripts
            .lock()
            .expect("script lock poisoned")
            .insert(oid, Script::Fatal);
        self
    }

    /// Make `begin` refuse with an adapter-init error.
    pub fn refuse_begin(mut self, reason: impl Into<String>) -> Self {
        self.refuse_begin = Some(reason.into());
        self
    }

    /// Every OID submitted so far, in submission order.
    ///
    /// Lets tests assert retry counts and the no-submission-after-cap rule.
    pub fn submissions(&self) -> Vec<Oid> {
        self.submissions
            .lock()
            .expect("submission lock poisoned")
            .clone()
    }

    fn next_outcome(&self, oid: &Oid) -> Option<TransferError> {
        let mut scripts = self.scripts.lock().expect("script lock poisoned");
        match scripts.get_mut(oid) {
            Some(Script::Transient { remaining }) if *remaining > 0 => {
                *remaining -= 1;
                Some(TransferError::Transient(format!(
                    "simulated transient failure for {oid}"
                )))
            }
            Some(Script::TransientAlways) => Some(TransferError::Transient(format!(
                "simulated transient failure for {oid}"
            ))),
            Some(Script::Fatal) => Some(TransferError::Failed {
                oid: oid.clone(),
                reason: "simulated permanent failure".to_string(),
            }),
            _ => None,
        }
    }

    fn next_delay(&self) -> u64 {
        let (min, max) = self.latency_ms;
        if max == 0 {
            0
        } else if min == max {
            min
        } else {
            self.rng
                .lock()
                .expect("rng lock poisoned")
                .random_range(min..=max)
        }
    }
}

#[async_trait::async_trait]
impl TransferAdapter for SimAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(
        &self,
        max_concurrency: usize,
        progress: ProgressCallback,
        results: mpsc::Sender<TransferResult>,
    ) -> Result<(), TransferError> {
        if let Some(reason) = &self.refuse_begin {
            return Err(TransferError::AdapterInit {
                name: self.name.clone(),
                reason: reason.clone(),
            });
        }

        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        *session = Some(Session {
            progress,
            results,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tasks: Vec::new(),
        });
        Ok(())
    }

    async fn add(&self, job: TransferJob) {
        let oid = job.oid().clone();
        self.submissions
            .lock()
            .expect("submission lock poisoned")
            .push(oid.clone());

        let outcome = self.next_outcome(&oid);
        let delay_ms = self.next_delay();

        let mut session = self.session.lock().await;
        let Some(session) = session.as_mut() else {
            warn!(%oid, "job submitted before begin; dropping");
            return;
        };

        let progress = Arc::clone(&session.progress);
        let results = session.results.clone();
        let semaphore = Arc::clone(&session.semaphore);
        let in_flight = Arc::clone(&self.in_flight);

        session.tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            in_flight.fetch_add(1, Ordering::SeqCst);

            if delay_ms > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }

            let result = match outcome {
                None => {
                    let size = job.size();
                    progress(&job.name, size, size, in_flight.load(Ordering::SeqCst));
                    TransferResult::ok(job)
                }
                Some(error) => TransferResult::failed(job, error),
            };

            in_flight.fetch_sub(1, Ordering::SeqCst);
            let _ = results.send(result).await;
        }));
    }

    async fn end(&self) {
        let taken = self.session.lock().await.take();
        if let Some(session) = taken {
            for task in session.tasks {
                let _ = task.await;
            }
            // Dropping the session drops the last result sender, closing the
            // stream the driver's forwarder is draining.
        }
    }
}
