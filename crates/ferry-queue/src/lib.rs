//! The transfer queue orchestrator.
//!
//! [`TransferQueue`] mediates between a caller that wants to move many
//! content-addressed objects and a remote that authorises those moves:
//!
//! - metadata round-trips are amortised by negotiating objects in batches
//!   (with a permanent fallback to legacy per-object negotiation when the
//!   remote lacks batch support);
//! - byte movement is delegated to a pluggable transfer adapter driven
//!   under a fixed concurrency budget;
//! - retriable failures re-enter the queue under a bounded per-object
//!   retry cap, without ever dropping or double-counting work;
//! - [`TransferQueue::wait`] quiesces every collaborating worker before
//!   returning.
//!
//! ```ignore
//! let queue = TransferQueue::new(Direction::Download, config, client, adapters, meter, None);
//! let mut done = queue.watch();
//! queue.add(transferable).await;
//! queue.wait().await;
//! for err in queue.errors() { eprintln!("{err}"); }
//! ```

mod driver;
mod pending;
mod queue;
mod retry;
mod transferable;

pub use queue::TransferQueue;
pub use transferable::Transferable;

#[cfg(test)]
mod tests;
