//! Atomic "release A, acquire B" composition across two independent
//! waitables.

use crate::cancel::CancelHandle;
use crate::error::WaitError;
use crate::handle::LockHandle;
use crate::waiter::{Triggerable, Waiter};

/// Atomically trigger `trigger_side` and enlist in `wait_side`, so no
/// producer on `wait_side` can ever observe it as quiet between the two
/// steps.
///
/// When `wait_side` supports the two-phase protocol, the caller's slot is
/// reserved *before* `trigger_side` fires; if the trigger step fails, the
/// reservation is undone and the trigger's error is what propagates
/// (abort-before-raise). When `wait_side` has no two-phase protocol, the
/// two steps run back to back without that guarantee.
pub async fn trigger_and_wait<A, B>(
    trigger_side: &A,
    wait_side: &B,
    cancel: Option<&CancelHandle>,
) -> Result<LockHandle, WaitError>
where
    A: Triggerable + ?Sized,
    B: Waiter + ?Sized,
{
    if let Some(c) = cancel {
        if c.is_aborted() {
            return Err(WaitError::aborted("triggerAndWait"));
        }
    }

    match wait_side.prepare_wait(cancel) {
        Some(mut prepared) => match trigger_side.trigger_once() {
            Ok(()) => {
                prepared.commit();
                prepared.wait().await
            }
            Err(e) => {
                prepared.abort();
                Err(e)
            }
        },
        None => {
            trigger_side.trigger_once()?;
            wait_side.wait(cancel).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::Conditional;
    use crate::mutex::AsyncMutex;

    #[tokio::test]
    async fn conditional_wakes_waiter_while_composing_with_mutex() {
        let cond = Conditional::new();
        let mutex = AsyncMutex::new();

        let held = mutex.lock(None).await.unwrap();

        let cond_clone = cond.clone();
        let waiter = tokio::spawn(async move { cond_clone.wait(None).await });
        tokio::task::yield_now().await;

        let mutex_waiter = mutex.waiter();
        let composed = tokio::spawn(async move {
            trigger_and_wait(&cond, &mutex_waiter, None).await
        });
        tokio::task::yield_now().await;

        assert!(waiter.await.unwrap().is_ok());

        held.release();
        let handle = composed.await.unwrap().unwrap();
        assert!(handle.is_active());
    }
}
