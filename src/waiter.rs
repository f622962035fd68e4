//! The uniform waiter protocol implemented by every primitive, and the
//! two-phase `prepare`/`commit`/`abort` surface that makes
//! [`crate::trigger_wait::trigger_and_wait`] atomic.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::cancel::{CancelHandle, CancelSubscription};
use crate::error::WaitError;
use crate::handle::LockHandle;

/// A pending acquisition that has already reserved its place in a queue.
///
/// Returned by [`Waiter::prepare_wait`]. The caller must eventually call
/// either [`PreparedWait::abort`] (to undo the enlistment) or
/// [`PreparedWait::wait`] (to await the outcome); `commit` is a pure marker
/// with no side effect beyond documenting intent at the call site.
pub struct PreparedWait {
    outcome: PreparedOutcome,
}

enum PreparedOutcome {
    AlreadyResolved { handle: LockHandle, force_yield: bool },
    AlreadyFailed(WaitError),
    Pending {
        receiver: oneshot::Receiver<LockHandle>,
        abort_fn: Box<dyn FnOnce() + Send>,
        cancel_sub: Option<CancelSubscription>,
    },
}

impl PreparedWait {
    pub(crate) fn already_resolved(handle: LockHandle) -> Self {
        Self {
            outcome: PreparedOutcome::AlreadyResolved {
                handle,
                force_yield: false,
            },
        }
    }

    /// Like [`Self::already_resolved`], but [`Self::wait`] forces one
    /// cooperative yield before returning the handle. Used by primitives
    /// whose starvation-escape threshold was just reached synchronously,
    /// so the yield happens regardless of whether the caller reaches it
    /// through `lock()` or through `prepare_wait(...).wait()`.
    pub(crate) fn already_resolved_after_yield(handle: LockHandle) -> Self {
        Self {
            outcome: PreparedOutcome::AlreadyResolved {
                handle,
                force_yield: true,
            },
        }
    }

    pub(crate) fn already_failed(err: WaitError) -> Self {
        Self {
            outcome: PreparedOutcome::AlreadyFailed(err),
        }
    }

    pub(crate) fn pending(
        receiver: oneshot::Receiver<LockHandle>,
        abort_fn: impl FnOnce() + Send + 'static,
        cancel_sub: Option<CancelSubscription>,
    ) -> Self {
        Self {
            outcome: PreparedOutcome::Pending {
                receiver,
                abort_fn: Box::new(abort_fn),
                cancel_sub,
            },
        }
    }

    /// No-op marker: the caller is now committed to awaiting this prepared
    /// wait rather than aborting it.
    pub fn commit(&mut self) {}

    /// Undo the reservation. No-op if the wait had already resolved
    /// synchronously at `prepare_wait` time.
    pub fn abort(self) {
        if let PreparedOutcome::Pending {
            abort_fn,
            cancel_sub,
            ..
        } = self.outcome
        {
            abort_fn();
            if let Some(sub) = cancel_sub {
                sub.release();
            }
        }
    }

    /// Await the reserved outcome.
    pub async fn wait(self) -> Result<LockHandle, WaitError> {
        match self.outcome {
            PreparedOutcome::AlreadyResolved { handle, force_yield } => {
                if force_yield {
                    tokio::task::yield_now().await;
                }
                Ok(handle)
            }
            PreparedOutcome::AlreadyFailed(err) => Err(err),
            PreparedOutcome::Pending {
                receiver,
                cancel_sub,
                ..
            } => {
                let result = receiver
                    .await
                    .map_err(|_| WaitError::aborted("wait"));
                if let Some(sub) = cancel_sub {
                    sub.release();
                }
                result
            }
        }
    }
}

/// Uniform capability implemented by every acquirable primitive.
#[async_trait]
pub trait Waiter: Send + Sync {
    /// Acquire directly, enqueueing if necessary.
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError>;

    /// Reserve a place atomically, for composition by
    /// [`crate::trigger_wait::trigger_and_wait`]. Returns `None` if this
    /// primitive cannot offer the two-phase protocol, in which case the
    /// caller should fall back to plain [`Waiter::wait`].
    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait>;
}

/// Capability implemented by primitives that can serve as the "trigger"
/// side of [`crate::trigger_wait::trigger_and_wait`].
pub trait Triggerable: Send + Sync {
    /// Perform one trigger/wake. Built-in primitives never fail; the
    /// fallible signature exists so the composer's "abort B, then
    /// propagate A's error" ordering is exercised generically rather than
    /// hard-coded to the two built-in triggerable types.
    fn trigger_once(&self) -> Result<(), WaitError>;
}
