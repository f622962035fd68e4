//! Cooperative asynchronous coordination primitives for tasks that need to
//! take turns rather than run in parallel: a mutex with a starvation
//! escape, a counting semaphore, a writer-preferring reader/writer lock,
//! level- and edge-triggered signals, a one-shot deferred value, a
//! push-style deferred generator, and an atomic trigger-and-wait composer
//! across any two of them.
//!
//! None of this provides preemption, cross-thread fairness guarantees,
//! priority inheritance, deadlock detection, or persistence — every
//! primitive here is a single FIFO wait queue guarded by an ordinary
//! mutex, same as the rest of this crate's dependency stack builds its own
//! `tokio::sync` primitives.

pub mod cancel;
pub mod config;
pub mod conditional;
pub mod deferred;
pub mod error;
pub mod generator;
pub mod handle;
pub mod logging;
pub mod manually_conditional;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;
pub mod signal;
pub mod trigger_wait;
pub mod waiter;

mod queue;

pub use cancel::{CancelHandle, CancelSubscription};
pub use conditional::{Conditional, ConditionalWaiter};
pub use deferred::Deferred;
pub use error::{SharedError, WaitError};
pub use generator::{deferred_generator, DeferredGenerator, GeneratorSender};
pub use handle::LockHandle;
pub use manually_conditional::{ManuallyConditional, ManuallyConditionalWaiter};
pub use mutex::{AsyncMutex, MutexWaiter};
pub use rwlock::{ReadWaiter, RwLock, WriteWaiter};
pub use semaphore::{Semaphore, SemaphoreWaiter};
pub use signal::{ManualSignal, SignalWaiter};
pub use trigger_wait::trigger_and_wait;
pub use waiter::{PreparedWait, Triggerable, Waiter};
