//! A one-shot resolvable/rejectable value, observable by more than one
//! awaiter.

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Notify;

use crate::cancel::CancelHandle;
use crate::error::{SharedError, WaitError};

struct Inner<T> {
    outcome: SyncMutex<Option<Result<T, WaitError>>>,
    notify: Notify,
}

/// A deferred value: settles at most once, via [`Deferred::resolve`] or
/// [`Deferred::reject`] (first call wins), and may be awaited via
/// [`Deferred::promise`] from more than one place — every observer sees the
/// same terminal outcome.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a deferred value. If `cancel` fires before this settles, it
    /// rejects with an aborted error.
    pub fn new(cancel: Option<&CancelHandle>) -> Self {
        let deferred = Self {
            inner: Arc::new(Inner {
                outcome: SyncMutex::new(None),
                notify: Notify::new(),
            }),
        };

        if let Some(c) = cancel {
            let linked = deferred.clone();
            c.on_abort(move || {
                linked.settle(Err(WaitError::aborted("Deferred")));
            });
        }

        deferred
    }

    /// Resolve with `value`. No-op if already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Reject with a user-supplied error, preserved verbatim rather than
    /// stringified. No-op if already settled.
    pub fn reject(&self, err: impl std::error::Error + Send + Sync + 'static) {
        self.settle(Err(WaitError::Rejected(SharedError::new(err))));
    }

    fn settle(&self, outcome: Result<T, WaitError>) {
        let mut state = self.inner.outcome.lock();
        if state.is_some() {
            return;
        }
        *state = Some(outcome);
        drop(state);
        self.inner.notify.notify_waiters();
    }

    pub fn is_settled(&self) -> bool {
        self.inner.outcome.lock().is_some()
    }

    /// Await the terminal outcome. Safe to call more than once, and from
    /// more than one clone of this handle.
    pub async fn promise(&self) -> Result<T, WaitError> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.inner.outcome.lock().clone() {
                return outcome;
            }
            notified.await;
        }
    }
}
