//! Counting semaphore.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tracing::trace;

use crate::cancel::CancelHandle;
use crate::error::WaitError;
use crate::handle::LockHandle;
use crate::queue::WaitQueue;
use crate::waiter::{PreparedWait, Waiter};

struct State {
    available: u32,
    queue: WaitQueue<LockHandle>,
}

struct Inner {
    state: SyncMutex<State>,
    capacity: u32,
}

impl Inner {
    fn make_handle(self: &Arc<Self>) -> LockHandle {
        let inner = self.clone();
        LockHandle::new(move || inner.release())
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.available += 1;
        while state.available > 0 {
            let Some(tx) = state.queue.dequeue_one() else {
                break;
            };
            state.available -= 1;
            let handle = self.make_handle();
            if tx.send(handle).is_err() {
                // Receiver already gone (cancelled mid-dispatch race). The
                // handle was never observed by anyone, so drop it without
                // releasing (would double-credit) and put the permit back.
                state.available += 1;
            }
        }
        trace!(available = state.available, "semaphore released");
    }
}

/// An N-permit counting semaphore.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

impl Semaphore {
    pub fn new(capacity: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SyncMutex::new(State {
                    available: capacity,
                    queue: WaitQueue::new(),
                }),
                capacity,
            }),
        }
    }

    pub fn available_count(&self) -> u32 {
        self.inner.state.lock().available
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub async fn acquire(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted("Semaphore wait"));
            }
        }

        let immediate = {
            let mut state = self.inner.state.lock();
            if state.available > 0 {
                state.available -= 1;
                true
            } else {
                false
            }
        };

        if immediate {
            return Ok(self.inner.make_handle());
        }

        let (id, rx) = self.inner.state.lock().queue.enqueue();
        let sub = cancel.map(|c| {
            let inner = self.inner.clone();
            c.on_abort(move || {
                inner.state.lock().queue.cancel(id);
            })
        });

        let result = rx.await.map_err(|_| WaitError::aborted("Semaphore wait"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    pub fn waiter(&self) -> SemaphoreWaiter {
        SemaphoreWaiter {
            inner: self.inner.clone(),
        }
    }
}

/// Cheap, shareable view of a [`Semaphore`] implementing [`Waiter`].
#[derive(Clone)]
pub struct SemaphoreWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for SemaphoreWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        Semaphore {
            inner: self.inner.clone(),
        }
        .acquire(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted(
                    "Semaphore wait",
                )));
            }
        }

        let mut state = self.inner.state.lock();
        if state.available > 0 {
            state.available -= 1;
            drop(state);
            return Some(PreparedWait::already_resolved(self.inner.make_handle()));
        }

        let (id, rx) = state.queue.enqueue();
        drop(state);

        let inner = self.inner.clone();
        let sub = cancel.map(|c| {
            let inner = inner.clone();
            c.on_abort(move || {
                inner.state.lock().queue.cancel(id);
            })
        });

        Some(PreparedWait::pending(
            rx,
            move || {
                inner.state.lock().queue.cancel(id);
            },
            sub,
        ))
    }
}
