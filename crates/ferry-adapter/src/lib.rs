//! Pluggable transfer adapters.
//!
//! An adapter is the component that actually moves bytes; the queue drives
//! it through the uniform [`TransferAdapter`] capability set (`name`,
//! `begin`, `add`, `end`). This crate defines that trait, the job and
//! result types that cross it, the [`AdapterRegistry`] that resolves a
//! remote-chosen adapter name to a factory (falling back to
//! [`BASIC_ADAPTER`]), and [`SimAdapter`], an in-process adapter with
//! seeded latency and failure injection for tests and chaos runs.

mod job;
mod registry;
mod sim;
mod traits;

pub use job::{TransferJob, TransferResult};
pub use registry::{AdapterRegistry, BASIC_ADAPTER};
pub use sim::SimAdapter;
pub use traits::{AdapterFactory, ProgressCallback, TransferAdapter};
