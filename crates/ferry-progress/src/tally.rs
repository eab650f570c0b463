//! Counter-backed meter for assertions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use ferry_types::Direction;

use crate::meter::ProgressMeter;

/// A meter that keeps queryable tallies instead of rendering.
///
/// Byte progress is tracked per file name as the latest cumulative `read`
/// value, so [`bytes_transferred`](Self::bytes_transferred) reflects what
/// actually moved rather than double-counting incremental callbacks.
#[derive(Debug, Default)]
pub struct TallyMeter {
    started: AtomicBool,
    finished: AtomicBool,
    files_added: AtomicUsize,
    transfers_finished: AtomicUsize,
    skipped_bytes: AtomicU64,
    read_by_name: Mutex<HashMap<String, u64>>,
}

impl TallyMeter {
    /// Create a meter with all tallies at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `start` was called.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether `finish` was called.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of files added to the plan.
    pub fn files_added(&self) -> usize {
        self.files_added.load(Ordering::SeqCst)
    }

    /// Number of transfers reported finished.
    pub fn transfers_finished(&self) -> usize {
        self.transfers_finished.load(Ordering::SeqCst)
    }

    /// Total bytes reported skipped.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes.load(Ordering::SeqCst)
    }

    /// Sum of the latest cumulative `read` value per file.
    pub fn bytes_transferred(&self) -> u64 {
        self.read_by_name
            .lock()
            .expect("tally lock poisoned")
            .values()
            .sum()
    }
}

impl ProgressMeter for TallyMeter {
    fn add(&self, _name: &str) {
        self.files_added.fetch_add(1, Ordering::SeqCst);
    }

    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn transfer_bytes(
        &self,
        _direction: Direction,
        name: &str,
        read: u64,
        _total: u64,
        _current: usize,
    ) {
        let mut map = self.read_by_name.lock().expect("tally lock poisoned");
        let entry = map.entry(name.to_string()).or_insert(0);
        *entry = (*entry).max(read);
    }

    fn finish_transfer(&self, _name: &str) {
        self.transfers_finished.fetch_add(1, Ordering::SeqCst);
    }

    fn skip(&self, size: u64) {
        self.skipped_bytes.fetch_add(size, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}
