//! Shared types for the ferry transfer queue.
//!
//! This crate defines the identifiers and the error taxonomy used across the
//! ferry workspace: the content-address identifier ([`Oid`]), the transfer
//! [`Direction`], and the shared [`TransferError`] enum whose classification
//! methods ([`TransferError::is_retriable`],
//! [`TransferError::is_not_implemented`]) drive the queue's retry and
//! fallback decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Oid
// ---------------------------------------------------------------------------

/// Content-addressed identifier for one object.
///
/// Opaque on the wire (a lowercase hex digest string); unique within a queue.
/// Two [`Oid`]s are equal iff their string forms are equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// Create an OID by hashing object content with BLAKE3.
    pub fn from_content(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Return the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Oid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Oid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way bytes move, fixed at queue construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fetch objects from the remote.
    Download,
    /// Send objects to the remote.
    Upload,
}

impl Direction {
    /// The wire name of this direction, also the action-link key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while negotiating or transferring objects.
///
/// All variants are cloneable so a single batch-level failure can be
/// weighed per object and still surfaced once.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    /// Transient transport failure (network hiccup, 5xx). Safe to retry.
    #[error("transient transfer failure: {0}")]
    Transient(String),

    /// The remote does not implement batch negotiation.
    #[error("batch negotiation not implemented by remote")]
    NotImplemented,

    /// The remote rejected a single object during negotiation.
    #[error("object {oid} rejected by remote ({code}): {message}")]
    Object {
        /// Which object was rejected.
        oid: Oid,
        /// Remote status code.
        code: u32,
        /// Remote-supplied message.
        message: String,
    },

    /// Authentication or authorization failure.
    #[error("authorization failed: {0}")]
    Unauthorized(String),

    /// The selected transfer adapter could not begin a session.
    #[error("transfer adapter {name:?} failed to start: {reason}")]
    AdapterInit {
        /// Adapter name, or the requested name when none could be resolved.
        name: String,
        /// Why begin was refused.
        reason: String,
    },

    /// Hard failure while moving bytes for one object.
    #[error("transfer of {oid} failed: {reason}")]
    Failed {
        /// Which object failed.
        oid: Oid,
        /// Adapter-supplied reason.
        reason: String,
    },
}

impl TransferError {
    /// Whether this error is worth re-attempting for the same object.
    ///
    /// This is the single classification point the retry ledger consults;
    /// the ledger itself is agnostic of error shapes.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransferError::Transient(_))
    }

    /// Whether this error means the remote lacks the batch endpoint,
    /// triggering the permanent fallback to per-object negotiation.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, TransferError::NotImplemented)
    }
}
