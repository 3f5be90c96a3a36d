//! The run termination state machine.
//!
//! `Active → Terminated`, entered exactly once by the first terminal
//! event the relay observes. The gate is the single source of truth
//! consulted by the relay's drop logic and by callers that want to
//! know whether the run has concluded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use rr_domain::event::TerminalReason;

/// Monotonic terminal-state flag for one run.
///
/// Only the relay flips it; subscribers may read it but never set it.
pub struct TerminationGate {
    terminated: AtomicBool,
    reason: RwLock<Option<TerminalReason>>,
    dropped: AtomicU64,
}

impl TerminationGate {
    pub fn new() -> Self {
        Self {
            terminated: AtomicBool::new(false),
            reason: RwLock::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    /// Attempt the `Active → Terminated` transition.
    ///
    /// Returns `true` for the first caller; every later call loses and
    /// leaves the recorded reason untouched.
    pub fn try_terminate(&self, reason: TerminalReason) -> bool {
        if self
            .terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *self.reason.write() = Some(reason);
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// The recorded terminal reason, once terminated.
    pub fn reason(&self) -> Option<TerminalReason> {
        self.reason.read().clone()
    }

    /// Count one event observed after the terminal transition.
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dropped_after_terminal(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for TerminationGate {
    fn default() -> Self {
        Self::new()
    }
}
