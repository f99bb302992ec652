//! Same-process access check.
//!
//! The store is private to the process that opened it. A handle that ends up
//! in another process (for example a forked child) is refused.

use crate::error::{KeypoolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGuard {
    owner: u32,
}

impl AccessGuard {
    /// Owned by the calling process.
    pub fn current() -> Self {
        Self {
            owner: std::process::id(),
        }
    }

    /// Owned by an explicit process id.
    pub fn for_owner(owner: u32) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> u32 {
        self.owner
    }

    pub fn check(&self) -> Result<()> {
        let caller = std::process::id();
        if caller != self.owner {
            return Err(KeypoolError::PermissionDenied {
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }
}

impl Default for AccessGuard {
    fn default() -> Self {
        Self::current()
    }
}
