//! Fixed-size batching for the transfer queue.
//!
//! A [`Batcher`] accumulates items submitted one at a time into groups of up
//! to `batch_size`, preserving submission order. Producers never block; the
//! consumer side ([`Batcher::next`]) blocks until a full batch, an explicitly
//! flushed partial batch, or — once [`Batcher::exit`] has been called and the
//! backlog is drained — the end of input.

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Number of items grouped into one negotiation batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

enum Input<T> {
    Item(T),
    Flush,
    Exit,
}

struct Inner<T> {
    rx: mpsc::UnboundedReceiver<Input<T>>,
    partial: Vec<T>,
    exited: bool,
}

/// Groups items into bounded, order-preserving batches.
///
/// Producers call [`add`](Self::add) / [`flush`](Self::flush) /
/// [`exit`](Self::exit) from any task without blocking; a single consumer
/// loop calls [`next`](Self::next). Items queued after `exit` (retry
/// re-entries racing the shutdown) are still delivered before the end
/// marker is honoured.
pub struct Batcher<T> {
    batch_size: usize,
    tx: mpsc::UnboundedSender<Input<T>>,
    inner: Mutex<Inner<T>>,
}

impl<T: Send> Batcher<T> {
    /// Create a batcher that publishes groups of up to `batch_size` items.
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            batch_size,
            tx,
            inner: Mutex::new(Inner {
                rx,
                partial: Vec::new(),
                exited: false,
            }),
        }
    }

    /// Append an item to the current batch. Never blocks.
    ///
    /// When the batch reaches the configured size it is published and a
    /// fresh batch begins.
    pub fn add(&self, item: T) {
        let _ = self.tx.send(Input::Item(item));
    }

    /// Publish the current partial batch immediately, even if below the
    /// batch size. A flush of an empty batch is a no-op.
    pub fn flush(&self) {
        let _ = self.tx.send(Input::Flush);
    }

    /// Signal that no further items are expected. After the backlog is
    /// drained (possibly emitting a final partial batch), [`next`](Self::next)
    /// returns `None`.
    pub fn exit(&self) {
        let _ = self.tx.send(Input::Exit);
    }

    /// The next batch, or `None` once the batcher has exited and drained.
    ///
    /// Blocks until a full batch accumulates, a partial batch is flushed,
    /// or the end of input is reached.
    pub async fn next(&self) -> Option<Vec<T>> {
        let mut inner = self.inner.lock().await;

        loop {
            if inner.exited {
                // Terminal drain: consume whatever is already queued, then end.
                loop {
                    match inner.rx.try_recv() {
                        Ok(Input::Item(item)) => {
                            inner.partial.push(item);
                            if inner.partial.len() >= self.batch_size {
                                return Some(std::mem::take(&mut inner.partial));
                            }
                        }
                        Ok(Input::Flush) | Ok(Input::Exit) => {
                            if !inner.partial.is_empty() {
                                return Some(std::mem::take(&mut inner.partial));
                            }
                        }
                        Err(_) => break,
                    }
                }

                if !inner.partial.is_empty() {
                    return Some(std::mem::take(&mut inner.partial));
                }

                trace!("batcher drained");
                return None;
            }

            // The batcher owns a sender for its whole lifetime, so recv only
            // yields None if that invariant is ever broken; treat it as exit.
            match inner.rx.recv().await {
                None => inner.exited = true,
                Some(Input::Item(item)) => {
                    inner.partial.push(item);
                    if inner.partial.len() >= self.batch_size {
                        return Some(std::mem::take(&mut inner.partial));
                    }
                }
                Some(Input::Flush) => {
                    if !inner.partial.is_empty() {
                        return Some(std::mem::take(&mut inner.partial));
                    }
                }
                Some(Input::Exit) => {
                    inner.exited = true;
                    if !inner.partial.is_empty() {
                        return Some(std::mem::take(&mut inner.partial));
                    }
                }
            }
        }
    }
}
