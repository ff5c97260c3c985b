use std::sync::mpsc::{self, Receiver, Sender, SyncSender};

/// The input-queue sending half: bounded drop-tail when `max_buffer` is
/// configured, unbounded when it is absent (spec.md §3, invariant I3 —
/// "absent ⇒ unbounded"). Both variants share one `Receiver<T>`, since
/// `mpsc::channel`/`mpsc::sync_channel` return the same receiver type;
/// only the sending half differs.
pub enum DataSender<T> {
    Bounded(SyncSender<T>),
    Unbounded(Sender<T>),
}

impl<T> Clone for DataSender<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<T> DataSender<T> {
    /// Enqueues `item`. Returns `false` when the bounded variant's queue
    /// is full and the item was dropped (drop-tail); the unbounded
    /// variant never drops. Both variants return `false` if the
    /// receiving end has gone away.
    pub fn try_push(&self, item: T) -> bool {
        match self {
            Self::Bounded(tx) => tx.try_send(item).is_ok(),
            Self::Unbounded(tx) => tx.send(item).is_ok(),
        }
    }
}

/// Builds the input queue for `max_buffer`: `Some(k)` yields a bounded
/// channel of depth `k` paired with [`DataSender::Bounded`]; `None`
/// yields an unbounded channel paired with [`DataSender::Unbounded`].
pub fn data_channel<T>(max_buffer: Option<usize>) -> (DataSender<T>, Receiver<T>) {
    match max_buffer {
        Some(k) => {
            let (tx, rx) = mpsc::sync_channel(k.max(1));
            (DataSender::Bounded(tx), rx)
        }
        None => {
            let (tx, rx) = mpsc::channel();
            (DataSender::Unbounded(tx), rx)
        }
    }
}
