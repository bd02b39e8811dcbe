//! Interrupt controller
//!
//! One level-triggered flag per session: set by Stop/DeepDive dispatch and
//! inbound interrupt frames, cleared at each new turn's start, polled at
//! every checkpoint in the generation and synthesis loops. Level-triggered
//! so every concurrently suspended checkpoint observes a set flag exactly
//! once per turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-session cancellation signal
///
/// Single external setter, many readers. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    inner: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; stays set until the next turn starts
    pub fn set(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Lower the flag (new turn start)
    pub fn clear(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }

    /// Checkpoint poll
    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}
