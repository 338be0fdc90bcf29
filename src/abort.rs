//! Cooperative cancellation for long-running traversals (spec §5).
//!
//! Recursive operations (subkey-list flattening, whole-tree walks) check
//! an [`AbortFlag`] at each iteration boundary so a caller driving a slow
//! export or search over a very large hive can cancel it without waiting
//! for the current operation to unwind naturally.

use crate::error::{RegistryError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared, cooperative cancellation flag.
///
/// Cloning shares the same underlying flag; setting it from any clone is
/// visible to all others.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
}

impl AbortFlag {
    /// Creates a new, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True if [`AbortFlag::abort`] has been called.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns [`RegistryError::Aborted`] if the flag is set, `Ok(())`
    /// otherwise. Intended to be called at each step of a loop or
    /// recursive walk.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(RegistryError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flag_checks_ok() {
        let flag = AbortFlag::new();
        assert!(flag.check().is_ok());
    }

    #[test]
    fn aborting_is_visible_across_clones() {
        let flag = AbortFlag::new();
        let clone = flag.clone();
        clone.abort();
        assert!(flag.is_aborted());
        assert!(matches!(flag.check(), Err(RegistryError::Aborted)));
    }
}
