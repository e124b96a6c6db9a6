//! Latest-wins tokens for background state refreshes.
//!
//! Each break starts a refresh that emits the assembly window and asks the
//! stub for registers, frame and stack. Issuing a new token (or resuming
//! the target) invalidates every older one, and a refresh holding a stale
//! token stops before its next emission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues refresh tokens; only the newest is current.
#[derive(Debug, Clone, Default)]
pub struct RefreshTokens {
    latest: Arc<AtomicU64>,
}

impl RefreshTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token, invalidating all earlier ones.
    pub fn issue(&self) -> RefreshToken {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        RefreshToken {
            generation,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Invalidate every issued token without issuing a new one.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}

/// Permission for one refresh to keep emitting.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl RefreshToken {
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}
