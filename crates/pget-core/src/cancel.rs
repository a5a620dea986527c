//! Batch-wide cooperative cancellation.
//!
//! A `CancelSignal` fires once, either when the batch deadline passes or when
//! a task reports a failure, whichever happens first. Tasks read it at their
//! admission checkpoint only; nothing in-flight is interrupted.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

const NOT_FIRED: u8 = 0;
const DEADLINE: u8 = 1;
const FAILURE: u8 = 2;

/// Why a batch's signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The batch timeout elapsed.
    DeadlineElapsed,
    /// A task reported an error.
    TaskFailed,
}

/// Set-once cancellation token shared by all tasks of one batch.
#[derive(Debug)]
pub struct CancelSignal {
    deadline: Instant,
    state: AtomicU8,
}

impl CancelSignal {
    /// Signal that fires automatically `timeout` after `start`.
    /// A zero timeout has already expired by the time anyone checks it.
    pub fn with_deadline(start: Instant, timeout: Duration) -> Self {
        let deadline = start.checked_add(timeout).unwrap_or_else(far_future);
        Self {
            deadline,
            state: AtomicU8::new(NOT_FIRED),
        }
    }

    /// Fire the signal because a task failed. Returns true if this call fired
    /// it; false if it had already fired (for either reason).
    pub fn cancel(&self) -> bool {
        if Instant::now() >= self.deadline {
            self.fire(DEADLINE);
        }
        self.fire(FAILURE)
    }

    /// Non-blocking snapshot: `Some(reason)` once the signal has fired.
    ///
    /// The deadline is latched on first observation, so a later `cancel`
    /// cannot rewrite the reason.
    pub fn check(&self) -> Option<CancelReason> {
        if Instant::now() >= self.deadline {
            self.fire(DEADLINE);
        }
        match self.state.load(Ordering::Acquire) {
            DEADLINE => Some(CancelReason::DeadlineElapsed),
            FAILURE => Some(CancelReason::TaskFailed),
            _ => None,
        }
    }

    fn fire(&self, reason: u8) -> bool {
        self.state
            .compare_exchange(NOT_FIRED, reason, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// Timeouts too large to represent as an Instant never fire.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}
