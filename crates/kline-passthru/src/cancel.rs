//! Cooperative cancellation for long-running receive loops

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag checked between reads
///
/// Clones observe the same flag, so one copy can be handed to a Ctrl+C
/// handler while the session polls another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let handler_copy = token.clone();
        assert!(!token.is_cancelled());
        handler_copy.cancel();
        assert!(token.is_cancelled());
    }
}
