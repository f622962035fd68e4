//! Union of level-triggered and edge-triggered semantics: `raise`/`drop`
//! behave like [`crate::signal::ManualSignal`], `trigger` behaves like
//! [`crate::conditional::Conditional`], and the two interact so that
//! `trigger` always consumes one unit of readiness regardless of source.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tracing::trace;

use crate::cancel::CancelHandle;
use crate::error::WaitError;
use crate::handle::LockHandle;
use crate::queue::WaitQueue;
use crate::trigger_wait::trigger_and_wait;
use crate::waiter::{PreparedWait, Triggerable, Waiter};

struct State {
    raised: bool,
    queue: WaitQueue<LockHandle>,
}

struct Inner {
    state: SyncMutex<State>,
}

/// A signal combining level-triggered broadcast (`raise`/`drop`) with
/// edge-triggered single-wake (`trigger`).
#[derive(Clone)]
pub struct ManuallyConditional {
    inner: Arc<Inner>,
}

impl ManuallyConditional {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SyncMutex::new(State {
                    raised: false,
                    queue: WaitQueue::new(),
                }),
            }),
        }
    }

    pub fn is_raised(&self) -> bool {
        self.inner.state.lock().raised
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Set raised and wake every current waiter. New waiters started while
    /// raised resolve immediately.
    pub fn raise(&self) {
        let mut state = self.inner.state.lock();
        if state.raised {
            return;
        }
        state.raised = true;
        let waiters = state.queue.drain_all();
        drop(state);
        let woken = waiters.len();
        for tx in waiters {
            let _ = tx.send(LockHandle::dummy());
        }
        trace!(woken, "manually-conditional raised, broadcast to waiters");
    }

    /// Clear raised. Does not affect waiters already resolved.
    pub fn drop_raised(&self) {
        self.inner.state.lock().raised = false;
    }

    /// Consume one unit of readiness: if raised, clear it (and dequeue one
    /// waiter if the queue happens to hold any); otherwise wake exactly one
    /// waiter, or lose the trigger if none is waiting.
    pub fn trigger(&self) {
        let mut state = self.inner.state.lock();
        if state.raised {
            state.raised = false;
            if let Some(tx) = state.queue.dequeue_one() {
                drop(state);
                let _ = tx.send(LockHandle::dummy());
            }
            trace!("manually-conditional trigger cleared raised state");
            return;
        }
        match state.queue.dequeue_one() {
            Some(tx) => {
                drop(state);
                let _ = tx.send(LockHandle::dummy());
                trace!("manually-conditional trigger woke a waiter");
            }
            None => trace!("manually-conditional trigger lost, no waiter"),
        }
    }

    pub async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted("ManuallyConditional wait"));
            }
        }

        let immediate = self.inner.state.lock().raised;
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
            .map_err(|_| WaitError::aborted("ManuallyConditional wait"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    pub async fn trigger_and_wait<W: Waiter + ?Sized>(
        &self,
        other: &W,
        cancel: Option<&CancelHandle>,
    ) -> Result<LockHandle, WaitError> {
        trigger_and_wait(self, other, cancel).await
    }

    pub fn waiter(&self) -> ManuallyConditionalWaiter {
        ManuallyConditionalWaiter {
            inner: self.inner.clone(),
        }
    }
}

impl Default for ManuallyConditional {
    fn default() -> Self {
        Self::new()
    }
}

impl Triggerable for ManuallyConditional {
    fn trigger_once(&self) -> Result<(), WaitError> {
        self.trigger();
        Ok(())
    }
}

/// Cheap, shareable view of a [`ManuallyConditional`] implementing
/// [`Waiter`].
#[derive(Clone)]
pub struct ManuallyConditionalWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for ManuallyConditionalWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        ManuallyConditional {
            inner: self.inner.clone(),
        }
        .wait(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted(
                    "ManuallyConditional wait",
                )));
            }
        }

        let mut state = self.inner.state.lock();
        if state.raised {
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
