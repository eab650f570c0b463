//! File-backed progress log.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferry_types::Direction;
use tracing::warn;

use crate::meter::ProgressMeter;

/// Appends one machine-readable line per progress event to a log file.
///
/// Line format:
///
/// ```text
/// <direction> <finished>/<planned> <read>/<total> <name>
/// ```
///
/// Write failures are logged once and the meter goes quiet; progress
/// reporting must never take a transfer down with it.
pub struct LogMeter {
    writer: Mutex<Option<BufWriter<File>>>,
    planned: AtomicUsize,
    finished: AtomicUsize,
}

impl LogMeter {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
            planned: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }

    fn write_line(&self, line: &str) {
        let mut guard = self.writer.lock().expect("progress log lock poisoned");
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writeln!(writer, "{line}") {
                warn!(error = %e, "progress log write failed; disabling log");
                *guard = None;
            }
        }
    }
}

impl ProgressMeter for LogMeter {
    fn add(&self, _name: &str) {
        self.planned.fetch_add(1, Ordering::Relaxed);
    }

    fn start(&self) {}

    fn transfer_bytes(
        &self,
        direction: Direction,
        name: &str,
        read: u64,
        total: u64,
        _current: usize,
    ) {
        let finished = self.finished.load(Ordering::Relaxed);
        let planned = self.planned.load(Ordering::Relaxed);
        self.write_line(&format!(
            "{direction} {finished}/{planned} {read}/{total} {name}"
        ));
    }

    fn finish_transfer(&self, _name: &str) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn skip(&self, _size: u64) {}

    fn finish(&self) {
        let mut guard = self.writer.lock().expect("progress log lock poisoned");
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "progress log flush failed");
            }
        }
    }
}
