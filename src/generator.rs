//! Push-style async sequence: a producer calls `yield_value`/`finish`/`fail`
//! from wherever is convenient; a consumer drains it with `next` (or as a
//! [`futures::Stream`] via [`DeferredGenerator::into_stream`]).

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Notify;

use crate::cancel::CancelHandle;
use crate::error::{SharedError, WaitError};

enum Status {
    Open,
    Closed,
    Failed(WaitError),
}

struct GenState<T> {
    buffer: VecDeque<T>,
    status: Status,
}

struct Inner<T> {
    state: SyncMutex<GenState<T>>,
    notify: Notify,
}

/// The producer half returned alongside a [`DeferredGenerator`].
pub struct GeneratorSender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for GeneratorSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> GeneratorSender<T> {
    /// Push an item. Handed directly to a waiting consumer if one is
    /// blocked in `next`, else buffered. No-op once closed or failed.
    pub fn yield_value(&self, value: T) {
        let mut state = self.inner.state.lock();
        if !matches!(state.status, Status::Open) {
            return;
        }
        state.buffer.push_back(value);
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// Close the sequence. Buffered items remain deliverable until drained.
    /// No-op once closed or failed.
    pub fn finish(&self) {
        let mut state = self.inner.state.lock();
        if !matches!(state.status, Status::Open) {
            return;
        }
        state.status = Status::Closed;
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// Fail the sequence. Any buffered-but-undelivered items are discarded;
    /// the next `next()` call throws `err`. No-op once closed or failed.
    pub fn fail(&self, err: impl std::error::Error + Send + Sync + 'static) {
        self.fail_with(WaitError::Rejected(SharedError::new(err)));
    }

    fn fail_with(&self, err: WaitError) {
        let mut state = self.inner.state.lock();
        if !matches!(state.status, Status::Open) {
            return;
        }
        state.buffer.clear();
        state.status = Status::Failed(err);
        drop(state);
        self.inner.notify.notify_waiters();
    }
}

/// The consumer half. A single-use, finite, lazy async sequence.
pub struct DeferredGenerator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DeferredGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> DeferredGenerator<T> {
    /// Pull the next item. `Ok(None)` means the sequence is closed and
    /// drained; `Err` means the sequence failed (and its buffer was
    /// discarded at the time of failure).
    pub async fn next(&self) -> Result<Option<T>, WaitError> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock();
                if let Some(item) = state.buffer.pop_front() {
                    return Ok(Some(item));
                }
                match &state.status {
                    Status::Failed(e) => return Err(e.clone()),
                    Status::Closed => return Ok(None),
                    Status::Open => {}
                }
            }
            notified.await;
        }
    }

    /// Adapt this generator into a [`futures::Stream`], terminating the
    /// stream after the first error (matching `next`'s "throws before any
    /// further buffered item" contract).
    pub fn into_stream(self) -> impl Stream<Item = Result<T, WaitError>> {
        enum State<T> {
            Active(DeferredGenerator<T>),
            Done,
        }

        stream::unfold(State::Active(self), |state| async move {
            match state {
                State::Done => None,
                State::Active(gen) => match gen.next().await {
                    Ok(Some(v)) => Some((Ok(v), State::Active(gen))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), State::Done)),
                },
            }
        })
    }
}

/// Create a linked producer/consumer pair. If `cancel` fires, the
/// generator fails with the exact message `"Deferred generator aborted"`.
pub fn deferred_generator<T: Send + 'static>(
    cancel: Option<&CancelHandle>,
) -> (GeneratorSender<T>, DeferredGenerator<T>) {
    let inner = Arc::new(Inner {
        state: SyncMutex::new(GenState {
            buffer: VecDeque::new(),
            status: Status::Open,
        }),
        notify: Notify::new(),
    });

    let sender = GeneratorSender {
        inner: inner.clone(),
    };
    let generator = DeferredGenerator { inner };

    if let Some(c) = cancel {
        let sender_for_abort = sender.clone();
        c.on_abort(move || {
            sender_for_abort.fail_with(WaitError::aborted_exact("Deferred generator aborted"));
        });
    }

    (sender, generator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::fmt;

    #[derive(Debug)]
    struct CustomError(&'static str);
    impl fmt::Display for CustomError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }
    impl std::error::Error for CustomError {}

    #[tokio::test]
    async fn yields_are_delivered_in_order() {
        let (tx, rx) = deferred_generator::<u32>(None);
        tx.yield_value(1);
        tx.yield_value(2);
        tx.finish();

        assert_eq!(rx.next().await.unwrap(), Some(1));
        assert_eq!(rx.next().await.unwrap(), Some(2));
        assert_eq!(rx.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn consumer_can_await_before_producer_yields() {
        let (tx, rx) = deferred_generator::<u32>(None);
        let consumer = tokio::spawn(async move { rx.next().await });
        tokio::task::yield_now().await;
        tx.yield_value(7);
        assert_eq!(consumer.await.unwrap().unwrap(), Some(7));
    }

    #[tokio::test]
    async fn fail_discards_buffered_items_and_throws() {
        let (tx, rx) = deferred_generator::<u32>(None);
        tx.yield_value(1);
        tx.yield_value(2);
        tx.fail(CustomError("bad state"));

        let err = rx.next().await.unwrap_err();
        assert_eq!(err.to_string(), "bad state");
    }

    #[tokio::test]
    async fn abort_after_two_items_throws_exact_message() {
        let cancel = CancelHandle::new();
        let (tx, rx) = deferred_generator::<u32>(Some(&cancel));
        tx.yield_value(1);
        tx.yield_value(2);

        assert_eq!(rx.next().await.unwrap(), Some(1));
        assert_eq!(rx.next().await.unwrap(), Some(2));

        cancel.abort();
        let err = rx.next().await.unwrap_err();
        assert_eq!(err.to_string(), "Deferred generator aborted");
    }

    #[tokio::test]
    async fn into_stream_yields_items_then_terminates() {
        let (tx, rx) = deferred_generator::<u32>(None);
        tx.yield_value(1);
        tx.yield_value(2);
        tx.finish();

        let items: Vec<_> = rx.into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(*items[0].as_ref().unwrap(), 1);
        assert_eq!(*items[1].as_ref().unwrap(), 2);
    }
}
