//! Binary mutual exclusion with a starvation-escape yield policy.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tracing::trace;

use crate::cancel::CancelHandle;
use crate::config::DEFAULT_MAX_CONSECUTIVE;
use crate::error::WaitError;
use crate::handle::LockHandle;
use crate::queue::WaitQueue;
use crate::waiter::{PreparedWait, Waiter};

struct State {
    held: bool,
    queue: WaitQueue<LockHandle>,
    consecutive: u32,
}

struct Inner {
    state: SyncMutex<State>,
    max_consecutive: u32,
}

impl Inner {
    fn make_handle(self: &Arc<Self>) -> LockHandle {
        let inner = self.clone();
        LockHandle::new(move || inner.release())
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.state.lock();
        loop {
            match state.queue.dequeue_one() {
                Some(tx) => {
                    state.consecutive = 0;
                    let handle = self.make_handle();
                    if tx.send(handle).is_err() {
                        // Receiver already gone (its task was dropped
                        // outside our cancellation path); try the next
                        // queued waiter instead of leaking the lock.
                        continue;
                    }
                    trace!("mutex dispatched to queued waiter");
                    return;
                }
                None => {
                    state.held = false;
                    trace!("mutex released, now unheld");
                    return;
                }
            }
        }
    }
}

/// A cooperative mutex. Every `max_consecutive` synchronous, uncontended
/// acquisitions force one `yield_now` so the acquiring task cannot
/// monopolise the executor in a tight lock/release loop.
#[derive(Clone)]
pub struct AsyncMutex {
    inner: Arc<Inner>,
}

impl AsyncMutex {
    pub fn new() -> Self {
        Self::with_max_consecutive(DEFAULT_MAX_CONSECUTIVE)
    }

    pub fn with_max_consecutive(max_consecutive: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SyncMutex::new(State {
                    held: false,
                    queue: WaitQueue::new(),
                    consecutive: 0,
                }),
                max_consecutive,
            }),
        }
    }

    /// Deprecated alias kept for call sites ported from the original
    /// `createAsyncLock` name.
    pub fn create_async_lock(max_consecutive: u32) -> Self {
        Self::with_max_consecutive(max_consecutive)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.lock().held
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub async fn lock(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted("Mutex wait"));
            }
        }

        let immediate = {
            let mut state = self.inner.state.lock();
            if !state.held && state.queue.is_empty() {
                state.held = true;
                state.consecutive += 1;
                Some(state.consecutive)
            } else {
                None
            }
        };

        if let Some(count) = immediate {
            if count >= self.inner.max_consecutive {
                self.inner.state.lock().consecutive = 0;
                tokio::task::yield_now().await;
            }
            return Ok(self.inner.make_handle());
        }

        let (id, rx) = self.inner.state.lock().queue.enqueue();
        let sub = cancel.map(|c| {
            let inner = self.inner.clone();
            c.on_abort(move || {
                inner.state.lock().queue.cancel(id);
            })
        });

        let result = rx.await.map_err(|_| WaitError::aborted("Mutex wait"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    pub fn waiter(&self) -> MutexWaiter {
        MutexWaiter {
            inner: self.inner.clone(),
        }
    }
}

impl Default for AsyncMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, shareable view of an [`AsyncMutex`] implementing the uniform
/// [`Waiter`] protocol, for use with [`crate::trigger_wait::trigger_and_wait`].
#[derive(Clone)]
pub struct MutexWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for MutexWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        AsyncMutex {
            inner: self.inner.clone(),
        }
        .lock(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted(
                    "Mutex wait",
                )));
            }
        }

        let mut state = self.inner.state.lock();
        if !state.held && state.queue.is_empty() {
            state.held = true;
            state.consecutive += 1;
            let force_yield = state.consecutive >= self.inner.max_consecutive;
            if force_yield {
                state.consecutive = 0;
            }
            drop(state);
            let handle = self.inner.make_handle();
            return Some(if force_yield {
                PreparedWait::already_resolved_after_yield(handle)
            } else {
                PreparedWait::already_resolved(handle)
            });
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uncontended_lock_is_immediate() {
        let mutex = AsyncMutex::new();
        let handle = mutex.lock(None).await.unwrap();
        assert!(mutex.is_locked());
        handle.release();
        assert!(!mutex.is_locked());
    }

    #[tokio::test]
    async fn sequential_acquisitions_trace() {
        let mutex = AsyncMutex::new();
        let trace = Arc::new(SyncMutex::new(Vec::<&'static str>::new()));

        let held = mutex.lock(None).await.unwrap();
        trace.lock().push("A:acquired");

        let mutex2 = mutex.clone();
        let trace2 = trace.clone();
        let b = tokio::spawn(async move {
            trace2.lock().push("B:requesting");
            let handle = mutex2.lock(None).await.unwrap();
            trace2.lock().push("B:acquired");
            handle.release();
            trace2.lock().push("B:released");
        });

        tokio::task::yield_now().await;
        trace.lock().push("A:working");
        held.release();
        trace.lock().push("A:released");

        b.await.unwrap();

        let events = trace.lock().clone();
        assert_eq!(
            events,
            vec![
                "A:acquired",
                "B:requesting",
                "A:working",
                "A:released",
                "B:acquired",
                "B:released",
            ]
        );
    }

    #[tokio::test]
    async fn contended_waiter_is_queued_and_dispatched_fifo() {
        let mutex = AsyncMutex::new();
        let held = mutex.lock(None).await.unwrap();
        assert_eq!(mutex.pending_count(), 0);

        let mutex2 = mutex.clone();
        let waiter = tokio::spawn(async move { mutex2.lock(None).await });
        tokio::task::yield_now().await;
        assert_eq!(mutex.pending_count(), 1);

        held.release();
        let handle = waiter.await.unwrap().unwrap();
        assert!(handle.is_active());
        assert_eq!(mutex.pending_count(), 0);
    }

    #[tokio::test]
    async fn starvation_escape_yields_every_max_consecutive() {
        let mutex = AsyncMutex::with_max_consecutive(3);
        for _ in 0..2 {
            let h = mutex.lock(None).await.unwrap();
            h.release();
        }
        // third acquisition hits max_consecutive and forces a yield, but
        // still resolves to an active handle.
        let h = mutex.lock(None).await.unwrap();
        assert!(h.is_active());
        h.release();
        assert_eq!(mutex.inner.state.lock().consecutive, 0);
    }

    #[tokio::test]
    async fn starvation_escape_also_applies_through_prepare_wait() {
        let mutex = AsyncMutex::with_max_consecutive(3);
        let waiter = mutex.waiter();
        for _ in 0..2 {
            let h = waiter.prepare_wait(None).unwrap().wait().await.unwrap();
            h.release();
        }
        assert_eq!(mutex.inner.state.lock().consecutive, 2);

        // The third acquisition through prepare_wait hits max_consecutive:
        // it must force the same yield lock() would, not silently skip it.
        let prepared = waiter.prepare_wait(None).unwrap();
        assert_eq!(mutex.inner.state.lock().consecutive, 0);
        let h = prepared.wait().await.unwrap();
        assert!(h.is_active());
        h.release();
    }

    #[tokio::test]
    async fn already_aborted_cancel_rejects_without_enqueueing() {
        let mutex = AsyncMutex::new();
        let _held = mutex.lock(None).await.unwrap();

        let cancel = CancelHandle::new();
        cancel.abort();
        let result = mutex.lock(Some(&cancel)).await;
        assert!(result.unwrap_err().is_aborted());
        assert_eq!(mutex.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancelling_a_queued_waiter_rejects_and_clears_its_slot() {
        let mutex = AsyncMutex::new();
        let held = mutex.lock(None).await.unwrap();

        let cancel = CancelHandle::new();
        let cancel_for_task = cancel.clone();
        let mutex2 = mutex.clone();
        let waiter =
            tokio::spawn(async move { mutex2.lock(Some(&cancel_for_task)).await });
        tokio::task::yield_now().await;
        assert_eq!(mutex.pending_count(), 1);

        cancel.abort();
        let result = waiter.await.unwrap();
        assert!(result.unwrap_err().is_aborted());
        assert_eq!(mutex.pending_count(), 0);

        held.release();
    }
}
