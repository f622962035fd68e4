//! Reader/writer lock with writer preference: once a writer is waiting, new
//! readers queue behind it rather than continuing to pile in ahead.

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
    readers: u32,
    has_writer: bool,
    reader_queue: WaitQueue<LockHandle>,
    writer_queue: WaitQueue<LockHandle>,
}

struct Inner {
    state: SyncMutex<State>,
}

impl Inner {
    fn reader_handle(self: &Arc<Self>) -> LockHandle {
        let inner = self.clone();
        LockHandle::new(move || inner.release_reader())
    }

    fn writer_handle(self: &Arc<Self>) -> LockHandle {
        let inner = self.clone();
        LockHandle::new(move || inner.release_writer())
    }

    fn release_reader(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.promote(&mut state);
        }
    }

    fn release_writer(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.has_writer = false;
        self.promote(&mut state);
    }

    /// Called whenever the lock is quiescent (no readers, no writer).
    /// Writer preference: wake the next writer if one is waiting, else
    /// drain every waiting reader.
    fn promote(self: &Arc<Self>, state: &mut State) {
        loop {
            if let Some(tx) = state.writer_queue.dequeue_one() {
                state.has_writer = true;
                let handle = self.writer_handle();
                if tx.send(handle).is_err() {
                    state.has_writer = false;
                    continue;
                }
                trace!("rwlock promoted queued writer");
                return;
            }
            break;
        }

        let readers = state.reader_queue.drain_all();
        if readers.is_empty() {
            return;
        }
        let mut woken = 0u32;
        for tx in readers {
            let handle = self.reader_handle();
            if tx.send(handle).is_ok() {
                woken += 1;
            }
        }
        state.readers += woken;
        trace!(woken, "rwlock promoted queued readers");
    }
}

/// A reader/writer lock with writer preference.
#[derive(Clone)]
pub struct RwLock {
    inner: Arc<Inner>,
}

impl RwLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SyncMutex::new(State {
                    readers: 0,
                    has_writer: false,
                    reader_queue: WaitQueue::new(),
                    writer_queue: WaitQueue::new(),
                }),
            }),
        }
    }

    pub fn current_readers(&self) -> u32 {
        self.inner.state.lock().readers
    }

    pub fn has_writer(&self) -> bool {
        self.inner.state.lock().has_writer
    }

    pub fn pending_readers(&self) -> usize {
        self.inner.state.lock().reader_queue.len()
    }

    pub fn pending_writers(&self) -> usize {
        self.inner.state.lock().writer_queue.len()
    }

    pub async fn read_lock(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted("RwLock read wait"));
            }
        }

        let immediate = {
            let mut state = self.inner.state.lock();
            if !state.has_writer && state.writer_queue.is_empty() {
                state.readers += 1;
                true
            } else {
                false
            }
        };

        if immediate {
            return Ok(self.inner.reader_handle());
        }

        let (id, rx) = self.inner.state.lock().reader_queue.enqueue();
        let sub = cancel.map(|c| {
            let inner = self.inner.clone();
            c.on_abort(move || {
                inner.state.lock().reader_queue.cancel(id);
            })
        });
        let result = rx.await.map_err(|_| WaitError::aborted("RwLock read wait"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    pub async fn write_lock(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Err(WaitError::aborted("RwLock write wait"));
            }
        }

        let immediate = {
            let mut state = self.inner.state.lock();
            if state.readers == 0 && !state.has_writer {
                state.has_writer = true;
                true
            } else {
                false
            }
        };

        if immediate {
            return Ok(self.inner.writer_handle());
        }

        let (id, rx) = self.inner.state.lock().writer_queue.enqueue();
        let sub = cancel.map(|c| {
            let inner = self.inner.clone();
            c.on_abort(move || {
                inner.state.lock().writer_queue.cancel(id);
            })
        });
        let result = rx
            .await
            .map_err(|_| WaitError::aborted("RwLock write wait"));
        if let Some(sub) = sub {
            sub.release();
        }
        result
    }

    pub fn read_waiter(&self) -> ReadWaiter {
        ReadWaiter {
            inner: self.inner.clone(),
        }
    }

    pub fn write_waiter(&self) -> WriteWaiter {
        WriteWaiter {
            inner: self.inner.clone(),
        }
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, shareable view of an [`RwLock`]'s read side implementing
/// [`Waiter`].
#[derive(Clone)]
pub struct ReadWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for ReadWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        RwLock {
            inner: self.inner.clone(),
        }
        .read_lock(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted(
                    "RwLock read wait",
                )));
            }
        }

        let mut state = self.inner.state.lock();
        if !state.has_writer && state.writer_queue.is_empty() {
            state.readers += 1;
            drop(state);
            return Some(PreparedWait::already_resolved(self.inner.reader_handle()));
        }

        let (id, rx) = state.reader_queue.enqueue();
        drop(state);
        let inner = self.inner.clone();
        let sub = cancel.map(|c| {
            let inner = inner.clone();
            c.on_abort(move || {
                inner.state.lock().reader_queue.cancel(id);
            })
        });
        Some(PreparedWait::pending(
            rx,
            move || {
                inner.state.lock().reader_queue.cancel(id);
            },
            sub,
        ))
    }
}

/// Cheap, shareable view of an [`RwLock`]'s write side implementing
/// [`Waiter`].
#[derive(Clone)]
pub struct WriteWaiter {
    inner: Arc<Inner>,
}

#[async_trait]
impl Waiter for WriteWaiter {
    async fn wait(&self, cancel: Option<&CancelHandle>) -> Result<LockHandle, WaitError> {
        RwLock {
            inner: self.inner.clone(),
        }
        .write_lock(cancel)
        .await
    }

    fn prepare_wait(&self, cancel: Option<&CancelHandle>) -> Option<PreparedWait> {
        if let Some(c) = cancel {
            if c.is_aborted() {
                return Some(PreparedWait::already_failed(WaitError::aborted(
                    "RwLock write wait",
                )));
            }
        }

        let mut state = self.inner.state.lock();
        if state.readers == 0 && !state.has_writer {
            state.has_writer = true;
            drop(state);
            return Some(PreparedWait::already_resolved(self.inner.writer_handle()));
        }

        let (id, rx) = state.writer_queue.enqueue();
        drop(state);
        let inner = self.inner.clone();
        let sub = cancel.map(|c| {
            let inner = inner.clone();
            c.on_abort(move || {
                inner.state.lock().writer_queue.cancel(id);
            })
        });
        Some(PreparedWait::pending(
            rx,
            move || {
                inner.state.lock().writer_queue.cancel(id);
            },
            sub,
        ))
    }
}
