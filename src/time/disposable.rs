//! Idempotent cancellation tokens.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// A shared cancellation token.
///
/// `dispose` is idempotent and never fails; once disposed, the guarded
/// action (a pending timeout, usually) becomes a no-op. Firing an action
/// also marks its token disposed, so callers can treat "already ran" and
/// "cancelled" uniformly.
///
/// # Example
/// ```rust
/// use hive_rt::time::Disposable;
///
/// let token = Disposable::new();
/// assert!(!token.is_disposed());
/// token.dispose();
/// token.dispose(); // idempotent
/// assert!(token.is_disposed());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Disposable {
    disposed: Arc<AtomicBool>,
}

impl Disposable {
    /// A fresh, undisposed token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the token disposed. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Whether the token has been disposed (or its action already ran).
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Atomically claim the right to run the guarded action. Returns
    /// `true` exactly once.
    pub(crate) fn claim(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exactly_once() {
        let token = Disposable::new();
        assert!(token.claim());
        assert!(!token.claim());
        assert!(token.is_disposed());
    }

    #[test]
    fn dispose_prevents_claim() {
        let token = Disposable::new();
        token.dispose();
        assert!(!token.claim());
    }
}
