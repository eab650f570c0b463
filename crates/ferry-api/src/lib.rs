//! Negotiation interface between the transfer queue and the remote.
//!
//! The queue never speaks HTTP itself; it talks to an [`ObjectClient`],
//! which resolves batches of `{oid, size}` descriptors into
//! [`ObjectResource`]s carrying the per-object transfer instructions.
//! This crate defines that trait and the wire-shaped types it exchanges.

mod client;
mod resource;

pub use client::ObjectClient;
pub use resource::{ActionLink, BatchItem, BatchRequest, BatchResponse, ObjectError, ObjectResource};
