//! Level-triggered manual-reset signal.

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
    set: bool,
    queue: WaitQueue<LockHandle>,
}

struct Inner {
    state: SyncMutex<State>,
}

/// A broadcast, level-triggered signal. While `set`, every wait resolves
/// immediately (with a dummy handle, nothing to release); `reset` makes
/// subsequent waits block again without affecting waiters already
/// resolved.
#[derive(Clone)]
pub struct ManualSignal {
    inner: Arc<Inner>,
}

impl ManualSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SyncMutex::new(State {
                    set: false,
                    queue: WaitQueue::new(),
                }),
            }),
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.state.lock().set
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Set the signal and wake every current waiter. No-op if already set.
    pub fn set(&self) {
        let mut state = self.inner.state.lock();
        if state.set {
            return;
        }
        state.set = true;
        let waiters = state.queue.drain_all();
        drop(state);
        let woken = waiters.len();
        for tx in waiters {
            let _ = tx.send(LockHandle::dummy());
        }
        trace!(woken, "manual signal set, broadcast to waiters");
    }

    /// Clear the signal. Does not affect waiters already resolved.
    pub fn reset(&self) {
        self.inner.state.lock().set = false;
    }

    pub async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted_exact("Signal aborted"));
            }
        }

        let immediate = self.inner.state.lock().set;
        if immediate {
            return Ok(LockHandle::dummy());
        }

        let (id, rx) = self.inner.state.lock().queue.enqueue();
        let sub = cancel.map(|c| {
            let inner = self.inner.clone();
            c.on_abort(move || {
                inner.state.lock().queue.cancel(id);
            })
        });
        let result = rx
            .await
            .map_err(|_| WaitError::aborted_exact("Signal aborted"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    pub fn waiter(&self) -> SignalWaiter {
        SignalWaiter {
            inner: self.inner.clone(),
        }
    }
}

impl Default for ManualSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, shareable view of a [`ManualSignal`] implementing [`Waiter`].
#[derive(Clone)]
pub struct SignalWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for SignalWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        ManualSignal {
            inner: self.inner.clone(),
        }
        .wait(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted_exact(
                    "Signal aborted",
                )));
            }
        }

        let mut state = self.inner.state.lock();
        if state.set {
            drop(state);
            return Some(PreparedWait::already_resolved(LockHandle::dummy()));
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
    async fn set_before_wait_resolves_immediately() {
        let signal = ManualSignal::new();
        signal.set();
        let handle = signal.wait(None).await.unwrap();
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn broadcast_wakes_five_waiters() {
        let signal = ManualSignal::new();
        let mut waiters = Vec::new();
        for _ in 0..5 {
            let signal2 = signal.clone();
            waiters.push(tokio::spawn(async move { signal2.wait(None).await }));
        }
        tokio::task::yield_now().await;
        assert_eq!(signal.pending_count(), 5);

        signal.set();
        for w in waiters {
            assert!(w.await.unwrap().is_ok());
        }
        assert_eq!(signal.pending_count(), 0);
    }

    #[tokio::test]
    async fn reset_blocks_subsequent_waiters_until_next_set() {
        let signal = ManualSignal::new();
        signal.set();
        signal.wait(None).await.unwrap();
        signal.reset();

        let signal2 = signal.clone();
        let sixth = tokio::spawn(async move { signal2.wait(None).await });
        tokio::task::yield_now().await;
        assert_eq!(signal.pending_count(), 1);

        signal.set();
        assert!(sixth.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn abort_message_is_exactly_signal_aborted() {
        let signal = ManualSignal::new();
        let cancel = CancelHandle::new();
        cancel.abort();
        let err = signal.wait(Some(&cancel)).await.unwrap_err();
        assert_eq!(err.to_string(), "Signal aborted");
    }
}
