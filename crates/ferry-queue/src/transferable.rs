//! The caller-supplied unit of work.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ferry_api::ObjectResource;
use ferry_types::Oid;

/// One object the caller wants uploaded or downloaded.
///
/// Carries the content address, the declared size, a human-readable name,
/// and the local path; the negotiated [`ObjectResource`] is attached once
/// the remote has authorised the transfer. Equality and hashing follow the
/// OID alone — the queue performs one logical transfer per OID.
pub struct Transferable {
    oid: Oid,
    size: u64,
    name: String,
    path: PathBuf,
    resource: Mutex<Option<ObjectResource>>,
}

impl Transferable {
    /// Describe one object to transfer.
    pub fn new(
        oid: impl Into<Oid>,
        size: u64,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            oid: oid.into(),
            size,
            name: name.into(),
            path: path.into(),
            resource: Mutex::new(None),
        }
    }

    /// The content address.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Human-readable name shown in progress output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local filesystem path to read from or write to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attach the server-issued resource after negotiation.
    pub fn set_resource(&self, resource: ObjectResource) {
        *self.resource.lock().expect("resource lock poisoned") = Some(resource);
    }

    /// The negotiated resource, once attached.
    pub fn resource(&self) -> Option<ObjectResource> {
        self.resource.lock().expect("resource lock poisoned").clone()
    }
}

impl PartialEq for Transferable {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for Transferable {}

impl Hash for Transferable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oid.hash(state);
    }
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transferable")
            .field("oid", &self.oid)
            .field("size", &self.size)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
