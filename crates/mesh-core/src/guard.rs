// mesh-core/src/guard.rs

use crate::{CoreError, CoreResult};
use std::cell::Cell;

/// In-progress flag for externally reachable operations.
///
/// Set on entry, cleared when the returned scope drops (including on early
/// return through `?`). A nested entry while the flag is set is rejected.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    in_progress: Cell<bool>,
    current: Cell<&'static str>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, operation: &'static str) -> CoreResult<GuardScope<'_>> {
        if self.in_progress.get() {
            tracing::warn!(
                "Rejected nested call to {} while {} is in progress",
                operation,
                self.current.get()
            );
            return Err(CoreError::Reentrant(operation));
        }
        self.in_progress.set(true);
        self.current.set(operation);
        Ok(GuardScope { guard: self })
    }

    pub fn is_entered(&self) -> bool {
        self.in_progress.get()
    }
}

/// Clears the guard on drop
#[derive(Debug)]
pub struct GuardScope<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardScope<'_> {
    fn drop(&mut self) {
        self.guard.in_progress.set(false);
        self.guard.current.set("");
    }
}
