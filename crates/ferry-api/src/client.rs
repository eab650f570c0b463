//! The negotiation client trait.

use ferry_types::{Direction, Oid, TransferError};

use crate::resource::{BatchRequest, BatchResponse, ObjectResource};

/// Resolves object descriptors into transfer instructions.
///
/// The queue depends on this trait instead of a concrete HTTP client, so
/// tests can script responses and hosts can bring their own transport.
/// One collaborator covers both protocol generations: the batch endpoint
/// and the legacy per-object check used as its fallback.
#[async_trait::async_trait]
pub trait ObjectClient: Send + Sync {
    /// Negotiate a batch of objects in one metadata call.
    ///
    /// `request.transfers` lists acceptable adapter names in preference
    /// order; the response names the one chosen for the whole batch.
    /// Returns [`TransferError::NotImplemented`] when the remote lacks the
    /// batch endpoint.
    async fn batch(&self, request: &BatchRequest) -> Result<BatchResponse, TransferError>;

    /// Negotiate a single object through the legacy endpoint.
    ///
    /// `Ok(None)` means the object is already satisfied and nothing needs
    /// to move. Legacy negotiation only supports the basic adapter.
    async fn legacy_check(
        &self,
        direction: Direction,
        oid: &Oid,
        size: u64,
    ) -> Result<Option<ObjectResource>, TransferError>;
}
