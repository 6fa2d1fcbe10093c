use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::KMeansError;

/// Cooperative stop flag shared between the caller and a running clustering job.
///
/// Clones share the same flag. The drivers poll it before every iteration and
/// before every assignment block, so a cancelled run stops at the next block
/// boundary and returns [`KMeansError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self, iteration: usize) -> Result<(), KMeansError> {
        if self.is_cancelled() {
            Err(KMeansError::Cancelled { iteration })
        } else {
            Ok(())
        }
    }
}

/// Poll an optional token.
pub(crate) fn check_cancelled(
    token: Option<&CancellationToken>,
    iteration: usize,
) -> Result<(), KMeansError> {
    match token {
        Some(token) => token.check(iteration),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(
            check_cancelled(Some(&other), 3),
            Err(KMeansError::Cancelled { iteration: 3 })
        ));
    }

    #[test]
    fn test_missing_token_never_cancels() {
        assert!(check_cancelled(None, 0).is_ok());
    }
}
