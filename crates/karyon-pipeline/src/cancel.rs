//! Cooperative cancellation shared between a caller and long-running
//! pipeline or alignment work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable flag that long-running work polls between units of work.
///
/// Cancelling is sticky: once set, every clone reports cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(error)` once cancelled, `Ok(())` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `error` if [`cancel`](Self::cancel) has been called on
    /// any clone of this token.
    pub fn check<E>(&self, error: E) -> Result<(), E> {
        if self.is_cancelled() { Err(error) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check("cancelled"), Ok(()));
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check("cancelled"), Err("cancelled"));
    }
}
