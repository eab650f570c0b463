//! The meter trait and the discarding implementation.

use ferry_types::Direction;

/// Receives progress events from the transfer queue.
///
/// The queue advances the meter for failures and skips as well as successes,
/// so the "bytes expected" accounting always balances. Implementations must
/// be cheap and infallible; a meter can tally or log but never wedge a
/// transfer.
pub trait ProgressMeter: Send + Sync {
    /// A named file has entered the transfer plan.
    fn add(&self, name: &str);

    /// Transfers are about to begin. Called once per queue lifetime.
    fn start(&self);

    /// Bytes moved for one file: `read` of `total` so far, with `current`
    /// transfers in flight.
    fn transfer_bytes(&self, direction: Direction, name: &str, read: u64, total: u64, current: usize);

    /// One file finished successfully.
    fn finish_transfer(&self, name: &str);

    /// `size` bytes will not be transferred (already satisfied or failed).
    fn skip(&self, size: u64);

    /// The queue has quiesced; no further events follow.
    fn finish(&self);
}

/// A meter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMeter;

impl ProgressMeter for NullMeter {
    fn add(&self, _name: &str) {}
    fn start(&self) {}
    fn transfer_bytes(
        &self,
        _direction: Direction,
        _name: &str,
        _read: u64,
        _total: u64,
        _current: usize,
    ) {
    }
    fn finish_transfer(&self, _name: &str) {}
    fn skip(&self, _size: u64) {}
    fn finish(&self) {}
}
