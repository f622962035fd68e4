//! FIFO pending-slot queue with O(1) logical cancellation.
//!
//! Grounded on the check-then-add/pop-then-wake shape of a `Mutex<VecDeque<Waker>>`
//! waiter list (the serialize-under-one-lock approach is safe here because the
//! lock is always released before any `.await` or callback runs), adapted to
//! resolve waiters through a one-shot channel per slot instead of a raw waker
//! so each slot carries its own typed result.
//!
//! Slots are tombstoned rather than scanned-and-removed: cancelling a slot
//! just drops it from the id->sender map, and `dequeue_one` skips ids whose
//! mapping is already gone. Every id is pushed and popped from the order
//! queue exactly once over its lifetime, so cancellation storms cannot
//! degrade into per-call O(n) scans.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

pub(crate) struct WaitQueue<T> {
    next_id: u64,
    order: VecDeque<u64>,
    slots: HashMap<u64, oneshot::Sender<T>>,
}

impl<T> WaitQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            order: VecDeque::new(),
            slots: HashMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Enlist a new pending slot, returning its id (for cancellation) and
    /// the receiving half of its one-shot channel.
    pub(crate) fn enqueue(&mut self) -> (u64, oneshot::Receiver<T>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.order.push_back(id);
        self.slots.insert(id, tx);
        (id, rx)
    }

    /// Tombstone a slot. Returns `true` if it was still pending. A no-op
    /// (returning `false`) if the slot was already dispatched or cancelled.
    pub(crate) fn cancel(&mut self, id: u64) -> bool {
        self.slots.remove(&id).is_some()
    }

    /// Pop the oldest still-pending slot, skipping tombstones.
    pub(crate) fn dequeue_one(&mut self) -> Option<oneshot::Sender<T>> {
        while let Some(id) = self.order.pop_front() {
            if let Some(tx) = self.slots.remove(&id) {
                return Some(tx);
            }
        }
        None
    }

    /// Pop every still-pending slot in FIFO order, emptying the queue.
    pub(crate) fn drain_all(&mut self) -> Vec<oneshot::Sender<T>> {
        let mut out = Vec::with_capacity(self.slots.len());
        while let Some(tx) = self.dequeue_one() {
            out.push(tx);
        }
        out
    }
}
