use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ProcessError;

/// A cooperative cancellation flag shared by every worker of a run.
///
/// Workers poll it between units of work and never mid-peak, so anything
/// completed before cancellation stays in its finished state.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Convert the token state into a [`ProcessError::Cancelled`] for `?` propagation
    pub fn check(&self) -> Result<(), ProcessError> {
        if self.is_cancelled() {
            Err(ProcessError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shared_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(ProcessError::Cancelled));
    }
}
