use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::InferenceError;

/// Cooperative cancellation handle, checked between EM iterations and
/// between chromosomes. Cloning shares the underlying flag, so a UI
/// thread can hold one clone while inference holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The in-flight inference call discards its
    /// partial state at the next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Checkpoint: bail out with [`InferenceError::Cancelled`] if a
    /// cancellation was requested.
    pub fn ensure_active(&self) -> Result<(), InferenceError> {
        if self.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.ensure_active().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.ensure_active(), Err(InferenceError::Cancelled)));
    }
}
