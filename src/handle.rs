//! The ownership token returned by every successful acquisition.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// A releasable handle to a held resource.
///
/// `release` is idempotent: the first call runs the release callback and
/// flips `is_active` to false, later calls are no-ops. A "dummy" handle
/// (returned by level- and edge-triggered primitives that hand out nothing
/// releasable) is never active and releasing it does nothing.
#[derive(Clone)]
pub struct LockHandle {
    active: Arc<AtomicBool>,
    release_fn: Arc<Mutex<Option<ReleaseFn>>>,
}

impl LockHandle {
    pub(crate) fn new(release_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            release_fn: Arc::new(Mutex::new(Some(Box::new(release_fn)))),
        }
    }

    /// A handle with nothing to release, for waits that only observe
    /// readiness (manual signals, conditionals).
    pub(crate) fn dummy() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            release_fn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Release the held resource. No-op if already released or dummy.
    pub fn release(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(f) = self.release_fn.lock().take() {
                f();
            }
        }
    }

    /// Alias for [`release`](Self::release), for call sites that prefer a
    /// scoped-resource vocabulary.
    pub fn dispose(&self) {
        self.release();
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("is_active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn release_is_idempotent() {
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let handle = LockHandle::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_active());
        handle.release();
        assert!(!handle.is_active());
        handle.release();
        handle.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dummy_handle_is_inactive_and_releases_harmlessly() {
        let handle = LockHandle::dummy();
        assert!(!handle.is_active());
        handle.release();
        assert!(!handle.is_active());
    }
}
