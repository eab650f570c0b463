//! Wire-shaped types for batch negotiation.

use std::collections::HashMap;

use ferry_types::{Direction, Oid};
use serde::{Deserialize, Serialize};

/// One object descriptor in a batch negotiation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Content address of the object.
    pub oid: Oid,
    /// Declared size in bytes.
    pub size: u64,
}

/// A batch negotiation request.
///
/// `transfers` lists the adapter names the client can drive, in preference
/// order; the remote picks one for the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Which way the bytes will move.
    pub operation: Direction,
    /// Acceptable adapter names, most preferred first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transfers: Vec<String>,
    /// Objects to negotiate.
    pub objects: Vec<BatchItem>,
}

/// A batch negotiation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Adapter name chosen by the remote. Absent means the basic adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<String>,
    /// One resource per negotiated object.
    pub objects: Vec<ObjectResource>,
}

/// Per-object error reported inside an otherwise successful batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectError {
    /// Remote status code for this object.
    pub code: u32,
    /// Human-readable reason.
    pub message: String,
}

/// Protocol-specific link information for one action on one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLink {
    /// Where the adapter should move bytes to or from.
    pub href: String,
    /// Headers the adapter must send (auth tokens and the like).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub header: HashMap<String, String>,
    /// RFC 3339 expiry of the link, when the remote bounds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// The negotiated descriptor the remote returns for one object.
///
/// Presence of an action link for the current direction means the object
/// needs to move; absence means it is already satisfied and can be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResource {
    /// Content address of the object.
    pub oid: Oid,
    /// Size in bytes as known to the remote.
    pub size: u64,
    /// Set when this object cannot proceed even though the batch succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
    /// Action kind (`"download"` / `"upload"`) to link information.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub actions: HashMap<String, ActionLink>,
}

impl ObjectResource {
    /// A resource with no error and no actions.
    pub fn new(oid: Oid, size: u64) -> Self {
        Self {
            oid,
            size,
            error: None,
            actions: HashMap::new(),
        }
    }

    /// The link for the given direction, if this object needs to move.
    pub fn action_for(&self, direction: Direction) -> Option<&ActionLink> {
        self.actions.get(direction.as_str())
    }
}
