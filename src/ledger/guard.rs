//! Mutual exclusion across externally callable entry points.

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

/// One flag shared by every entry point it protects.
///
/// Entry points hold an [`EntryGuard`] for their whole duration, so code called
/// out to mid-flow (a venue, a lender) cannot re-enter any sibling entry point
/// sharing the same guard.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    active: Mutex<Option<&'static str>>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `entry` as executing, failing if any guarded entry point already is.
    pub fn enter(&self, entry: &'static str) -> Result<EntryGuard<'_>> {
        let mut active = self.active.lock();
        if let Some(current) = *active {
            warn!(entry, active = current, "Rejected reentrant call");
            return Err(Error::Reentrancy {
                entry,
                active: current,
            });
        }
        *active = Some(entry);
        Ok(EntryGuard { guard: self })
    }

    /// Name of the entry point currently executing, if any.
    pub fn active(&self) -> Option<&'static str> {
        *self.active.lock()
    }
}

/// Releases the guard when dropped, including on early error returns.
#[derive(Debug)]
pub struct EntryGuard<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        *self.guard.active.lock() = None;
    }
}
