//! Error types shared by every coordination primitive in this crate.

use std::fmt;
use std::sync::Arc;

/// A type-erased, clonable error.
///
/// Deferred values and generators may be observed by more than one awaiter
/// after reaching a terminal state, so the stored error needs to be cheaply
/// shareable rather than consumed once.
#[derive(Clone)]
pub struct SharedError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl SharedError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for SharedError {}

/// The single error currency for every wait/acquire operation in this crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError {
    /// The operation was cancelled via a [`crate::cancel::CancelHandle`]
    /// before it could complete. Every variant's message contains the
    /// substring `"aborted"`.
    #[error("{0} aborted")]
    Aborted(String),

    /// A value supplied by the caller via `reject`/`throw`, propagated
    /// verbatim rather than stringified.
    #[error(transparent)]
    Rejected(#[from] SharedError),
}

impl WaitError {
    /// Build an aborted error whose message is `"{context} aborted"`.
    pub fn aborted(context: impl Into<String>) -> Self {
        WaitError::Aborted(context.into())
    }

    /// Build an aborted error whose message is exactly `text`, for the few
    /// call sites whose wording is part of the public contract (e.g. the
    /// deferred generator's `"Deferred generator aborted"`). `Aborted`
    /// always renders as `"{0} aborted"`, so this stores `text` minus its
    /// trailing `" aborted"`.
    pub fn aborted_exact(text: impl Into<String>) -> Self {
        let text = text.into();
        match text.strip_suffix(" aborted") {
            Some(stripped) => WaitError::Aborted(stripped.to_string()),
            None => WaitError::Rejected(SharedError::new(ExactMessage(text))),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, WaitError::Aborted(_))
    }
}

#[derive(Debug)]
struct ExactMessage(String);

impl fmt::Display for ExactMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ExactMessage {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_message_contains_aborted() {
        let err = WaitError::aborted("Mutex wait");
        assert!(err.to_string().contains("aborted"));
        assert!(err.is_aborted());
    }

    #[test]
    fn aborted_exact_matches_contract_strings() {
        let err = WaitError::aborted_exact("Deferred generator aborted");
        assert_eq!(err.to_string(), "Deferred generator aborted");

        let err = WaitError::aborted_exact("Signal aborted");
        assert_eq!(err.to_string(), "Signal aborted");
    }

    #[test]
    fn rejected_preserves_user_error() {
        #[derive(Debug)]
        struct Custom;
        impl fmt::Display for Custom {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("custom failure")
            }
        }
        impl std::error::Error for Custom {}

        let err: WaitError = SharedError::new(Custom).into();
        assert!(!err.is_aborted());
        assert_eq!(err.to_string(), "custom failure");
    }
}
