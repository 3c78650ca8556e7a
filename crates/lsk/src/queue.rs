//! 🚚 Bounded queues: the conveyor belts between the fetcher, the workers, and the updater.
//!
//! Thin wrapper over `async_channel` so the pipeline speaks in its own verbs:
//! `try_enqueue` never blocks and hands the item back when it can't take it,
//! `enqueue` waits for room (that's the backpressure), `dequeue` returns `None`
//! only once the queue is closed AND drained. Close is idempotent, like saying
//! "we're closed" to the same customer twice. 🦆

use async_channel::{Receiver, Sender, TrySendError};

/// 🚫 Why `try_enqueue` refused an item. The item comes back to you either way.
#[derive(Debug, PartialEq, Eq)]
pub enum Rejected<T> {
    /// 📦 at capacity, try again next tick
    Full(T),
    /// 🔒 closed, there is no next tick
    Closed(T),
}

impl<T> Rejected<T> {
    pub fn into_inner(self) -> T {
        match self {
            Rejected::Full(item) | Rejected::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Rejected::Full(_))
    }
}

/// 📥 Producer side. Cheap to clone; every clone feeds the same belt.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// 📤 Consumer side. Clone it and every consumer competes for the same items;
/// each item goes to exactly one of them.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: Receiver<T>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// 🏗️ Build a fixed-capacity FIFO. A capacity of zero is bumped to one,
/// because a zero-slot queue is a rendezvous and nobody here wants to meet in person.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    (QueueSender { tx }, QueueReceiver { rx })
}

impl<T> QueueSender<T> {
    /// ⚡ Non-blocking enqueue. Full or closed → the item comes straight back.
    pub fn try_enqueue(&self, item: T) -> Result<(), Rejected<T>> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => Rejected::Full(item),
            TrySendError::Closed(item) => Rejected::Closed(item),
        })
    }

    /// ⏳ Waits for room. Errs (with the item) only if the queue got closed.
    pub async fn enqueue(&self, item: T) -> Result<(), T> {
        self.tx.send(item).await.map_err(|err| err.into_inner())
    }

    /// 🔒 "No more work will be submitted." Returns true if this call did the closing.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

impl<T> QueueReceiver<T> {
    /// 📬 Next item, or `None` once the queue is closed and nothing is left in it.
    pub async fn dequeue(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}
