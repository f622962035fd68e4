//! Edge-triggered, auto-reset, single-wake signal.

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

struct Inner {
    queue: SyncMutex<WaitQueue<LockHandle>>,
}

/// A purely edge-triggered signal: `trigger` wakes exactly one waiter, or
/// is lost if none is currently waiting. There is no latching — unlike
/// [`crate::signal::ManualSignal`], a `trigger` with nobody waiting has no
/// lasting effect.
#[derive(Clone)]
pub struct Conditional {
    inner: Arc<Inner>,
}

impl Conditional {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: SyncMutex::new(WaitQueue::new()),
            }),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted("Conditional wait"));
            }
        }

        let (id, rx) = self.inner.queue.lock().enqueue();
        let sub = cancel.map(|c| {
            let inner = self.inner.clone();
            c.on_abort(move || {
                inner.queue.lock().cancel(id);
            })
        });
        let result = rx
            .await
            .map_err(|_| WaitError::aborted("Conditional wait"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    /// Wake exactly one waiter, if any. Lost if nobody is waiting.
    pub fn trigger(&self) {
        let mut queue = self.inner.queue.lock();
        if let Some(tx) = queue.dequeue_one() {
            drop(queue);
            let _ = tx.send(LockHandle::dummy());
            trace!("conditional trigger woke a waiter");
        } else {
            trace!("conditional trigger lost, no waiter");
        }
    }

    /// Atomically trigger this conditional and enlist in `other`.
    pub async fn trigger_and_wait<W: Waiter + ?Sized>(
        &self,
        other: &W,
        cancel: Option<&CancelHandle>,
    ) -> Result<LockHandle, WaitError> {
        trigger_and_wait(self, other, cancel).await
    }

    pub fn waiter(&self) -> ConditionalWaiter {
        ConditionalWaiter {
            inner: self.inner.clone(),
        }
    }
}

impl Default for Conditional {
    fn default() -> Self {
        Self::new()
    }
}

impl Triggerable for Conditional {
    fn trigger_once(&self) -> Result<(), WaitError> {
        self.trigger();
        Ok(())
    }
}

/// Cheap, shareable view of a [`Conditional`] implementing [`Waiter`].
#[derive(Clone)]
pub struct ConditionalWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for ConditionalWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        Conditional {
            inner: self.inner.clone(),
        }
        .wait(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted(
                    "Conditional wait",
                )));
            }
        }

        let (id, rx) = self.inner.queue.lock().enqueue();
        let inner = self.inner.clone();
        let sub = cancel.map(|c| {
            let inner = inner.clone();
            c.on_abort(move || {
                inner.queue.lock().cancel(id);
            })
        });
        Some(PreparedWait::pending(
            rx,
            move || {
                inner.queue.lock().cancel(id);
            },
            sub,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_with_no_waiter_is_lost() {
        let cond = Conditional::new();
        cond.trigger();
        assert_eq!(cond.pending_count(), 0);
    }

    #[tokio::test]
    async fn trigger_wakes_exactly_one_waiter() {
        let cond = Conditional::new();
        let cond2 = cond.clone();
        let cond3 = cond.clone();
        let w1 = tokio::spawn(async move { cond2.wait(None).await });
        let w2 = tokio::spawn(async move { cond3.wait(None).await });
        tokio::task::yield_now().await;
        assert_eq!(cond.pending_count(), 2);

        cond.trigger();
        tokio::task::yield_now().await;
        assert_eq!(cond.pending_count(), 1);

        cond.trigger();
        assert!(w1.await.unwrap().is_ok());
        assert!(w2.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn excess_triggers_beyond_waiters_are_lost() {
        let cond = Conditional::new();
        let cond2 = cond.clone();
        let w = tokio::spawn(async move { cond2.wait(None).await });
        tokio::task::yield_now().await;

        cond.trigger();
        cond.trigger();
        cond.trigger();

        assert!(w.await.unwrap().is_ok());
        assert_eq!(cond.pending_count(), 0);
    }
}
