//! Job and result types crossing the adapter boundary.

use std::path::PathBuf;

use ferry_api::ObjectResource;
use ferry_types::{Oid, TransferError};

/// One unit of byte movement handed to an adapter.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Human-readable name (shown by progress meters).
    pub name: String,
    /// Local filesystem path to read from or write to.
    pub path: PathBuf,
    /// The negotiated resource carrying the action link for this transfer.
    pub resource: ObjectResource,
}

impl TransferJob {
    /// Build a job from its parts.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, resource: ObjectResource) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            resource,
        }
    }

    /// The object this job moves.
    pub fn oid(&self) -> &Oid {
        &self.resource.oid
    }

    /// Size in bytes per the negotiated resource.
    pub fn size(&self) -> u64 {
        self.resource.size
    }
}

/// The outcome of one job, delivered on the adapter's result channel.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// The job this result is for.
    pub job: TransferJob,
    /// `None` on success.
    pub error: Option<TransferError>,
}

impl TransferResult {
    /// A successful result for `job`.
    pub fn ok(job: TransferJob) -> Self {
        Self { job, error: None }
    }

    /// A failed result for `job`.
    pub fn failed(job: TransferJob, error: TransferError) -> Self {
        Self {
            job,
            error: Some(error),
        }
    }

    /// The object this result is for.
    pub fn oid(&self) -> &Oid {
        self.job.oid()
    }
}
