//! Progress accounting for the transfer queue.
//!
//! The queue reports every meaningful event — a file joining the plan, bytes
//! moving, a transfer finishing, bytes skipped — to a [`ProgressMeter`].
//! Rendering is someone else's job; this crate ships the trait plus three
//! non-rendering implementations:
//!
//! - [`NullMeter`] — discards everything.
//! - [`LogMeter`] — appends machine-readable progress lines to a file.
//! - [`TallyMeter`] — keeps queryable counters, used heavily in tests.

mod log;
mod meter;
mod tally;

pub use log::LogMeter;
pub use meter::{NullMeter, ProgressMeter};
pub use tally::TallyMeter;
