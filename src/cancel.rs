//! Cooperative cancellation.
//!
//! A `CancelToken` is threaded through parse, lift, subset, write and
//! streaming. Components poll at coarse boundaries (every page, every xref
//! entry, every top-level object) and fail with `Error::Cancelled`;
//! partial output is discarded by the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that never fires unless `cancel` is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it on their next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Poll at a coarse boundary: returns `Err(Cancelled)` once fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
