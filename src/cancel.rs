//! Cancellation handle and the `onAbort` hook.
//!
//! Grounded on this codebase's `AbortHandle` (atomic flag + `Notify`),
//! extended with a callback registry so a waiter can be told to drop its
//! queue slot the instant an abort fires, synchronously, with no
//! intervening await.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

type AbortCallback = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    aborted: AtomicBool,
    notify: Notify,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, AbortCallback)>>,
}

/// A cooperative cancellation handle. Clone-cheap, signal once, observed
/// many times.
#[derive(Clone)]
pub struct CancelHandle(Arc<Inner>);

impl CancelHandle {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            aborted: AtomicBool::new(false),
            notify: Notify::new(),
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(Vec::new()),
        }))
    }

    /// Signal every registered callback and waiter. Idempotent: a second
    /// call is a no-op.
    pub fn abort(&self) {
        if self.0.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.0.callbacks.lock());
        self.0.notify.notify_waiters();
        for (_, cb) in callbacks {
            cb();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::Acquire)
    }

    /// Wait until this handle is aborted. Returns immediately if it
    /// already was.
    pub async fn wait_for_abort(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Register `cb` to run exactly once, on abort. If already aborted,
    /// `cb` runs synchronously before this call returns and the returned
    /// subscription is already inert.
    pub fn on_abort(&self, cb: impl FnOnce() + Send + 'static) -> CancelSubscription {
        if self.is_aborted() {
            cb();
            return CancelSubscription::inert();
        }
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        self.0.callbacks.lock().push((id, Box::new(cb)));
        CancelSubscription::live(self.0.clone(), id)
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A disposable handle returned by [`CancelHandle::on_abort`]. Releasing it
/// before the handle fires detaches the callback.
pub struct CancelSubscription {
    inner: Option<(Arc<Inner>, u64)>,
}

impl CancelSubscription {
    fn live(inner: Arc<Inner>, id: u64) -> Self {
        Self {
            inner: Some((inner, id)),
        }
    }

    fn inert() -> Self {
        Self { inner: None }
    }

    /// Detach the callback if it has not already fired.
    pub fn release(mut self) {
        if let Some((inner, id)) = self.inner.take() {
            inner.callbacks.lock().retain(|(cb_id, _)| *cb_id != id);
        }
    }
}

/// Run `task` to completion, or return `Err` if `cancel` fires first.
pub async fn with_cancel<T, F>(task: F, cancel: &CancelHandle) -> Result<T, ()>
where
    F: Future<Output = T>,
{
    tokio::select! {
        result = task => Ok(result),
        _ = cancel.wait_for_abort() => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    #[tokio::test]
    async fn wait_for_abort_resolves_after_abort() {
        let handle = CancelHandle::new();
        let handle2 = handle.clone();

        let waiter = tokio::spawn(async move {
            handle2.wait_for_abort().await;
            true
        });

        tokio::task::yield_now().await;
        handle.abort();

        assert!(waiter.await.unwrap());
    }

    #[test]
    fn on_abort_runs_synchronously_when_already_aborted() {
        let handle = CancelHandle::new();
        handle.abort();

        let fired = Arc::new(StdAtomicBool::new(false));
        let fired2 = fired.clone();
        let _sub = handle.on_abort(move || fired2.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn on_abort_fires_on_later_abort() {
        let handle = CancelHandle::new();
        let fired = Arc::new(StdAtomicBool::new(false));
        let fired2 = fired.clone();
        let _sub = handle.on_abort(move || fired2.store(true, Ordering::SeqCst));
        assert!(!fired.load(Ordering::SeqCst));
        handle.abort();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn released_subscription_does_not_fire() {
        let handle = CancelHandle::new();
        let fired = Arc::new(StdAtomicBool::new(false));
        let fired2 = fired.clone();
        let sub = handle.on_abort(move || fired2.store(true, Ordering::SeqCst));
        sub.release();
        handle.abort();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn monitor_aborts_pending_task() {
        let handle = CancelHandle::new();
        handle.abort();
        let result = with_cancel(
            async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                42
            },
            &handle,
        )
        .await;
        assert_eq!(result, Err(()));
    }
}
