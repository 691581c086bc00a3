//! Atomic activity bits for a task control block.
//!
//! Every cross-thread question about a task (is it schedulable, is it
//! waiting, has it terminated) is answered from one `AtomicU32`. The engine
//! pointers live behind the task's internal lock; the bits here are the
//! lock-free part of the wake/signal/yield protocol.

use std::sync::atomic::{AtomicU32, Ordering};

/// Task is live and schedulable: some engine queue holds it, or is about to.
const ACTIVE: u32 = 1 << 0;

/// Task is waiting for a `signal`. Mutually exclusive with `ACTIVE`.
const WAITING: u32 = 1 << 1;

/// Task is inside `multiplex`. Guards against re-entrant dispatch and lets
/// `signal` defer queue operations to the step epilogue.
const RUNNING: u32 = 1 << 2;

/// A `signal` arrived while the task was active or running. Consumed by the
/// next `wait` (the wake was already delivered) or cleared at step end.
const SIGNAL_PENDING: u32 = 1 << 3;

/// Abort requested. Level-triggered: the next `multiplex` observes it and
/// terminates the task.
const ABORTED: u32 = 1 << 4;

/// Terminal: the task ran to completion (possibly via abort).
const FINISHED: u32 = 1 << 5;

/// Terminal: the task was killed (engine flush / shutdown), no callbacks.
const KILLED: u32 = 1 << 6;

/// Terminal cleanup already ran. Makes `finalize` once-only.
const FINALIZED: u32 = 1 << 7;

const TERMINAL: u32 = FINISHED | KILLED;

/// Snapshot of the activity bits at one instant.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Activity(u32);

impl Activity {
    pub(crate) fn is_active(self) -> bool {
        self.0 & ACTIVE != 0
    }

    pub(crate) fn is_waiting(self) -> bool {
        self.0 & WAITING != 0
    }

    pub(crate) fn is_running(self) -> bool {
        self.0 & RUNNING != 0
    }

    pub(crate) fn is_signal_pending(self) -> bool {
        self.0 & SIGNAL_PENDING != 0
    }

    pub(crate) fn is_aborted(self) -> bool {
        self.0 & ABORTED != 0
    }

    pub(crate) fn is_finished(self) -> bool {
        self.0 & FINISHED != 0
    }

    pub(crate) fn is_killed(self) -> bool {
        self.0 & KILLED != 0
    }

    pub(crate) fn is_terminal(self) -> bool {
        self.0 & TERMINAL != 0
    }
}

impl std::fmt::Debug for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity")
            .field("active", &self.is_active())
            .field("waiting", &self.is_waiting())
            .field("running", &self.is_running())
            .field("signal_pending", &self.is_signal_pending())
            .field("aborted", &self.is_aborted())
            .field("finished", &self.is_finished())
            .field("killed", &self.is_killed())
            .finish()
    }
}

/// What [`ActivityCell::request_abort`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbortOutcome {
    /// Task already terminal; nothing to do.
    Ignored,
    /// Abort bit set; the task is active or running and will observe it.
    Noted,
    /// Task was waiting. It is active again and must be re-enqueued so the
    /// next dispatch observes the abort.
    Wake,
}

/// The atomic activity cell of one task.
#[derive(Debug)]
pub(crate) struct ActivityCell {
    bits: AtomicU32,
}

impl ActivityCell {
    pub(crate) fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub(crate) fn load(&self) -> Activity {
        Activity(self.bits.load(Ordering::Acquire))
    }

    /// Marks a fresh task active. Returns false if the task was already
    /// started or is terminal.
    pub(crate) fn try_activate(&self) -> bool {
        self.bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                if a & (ACTIVE | WAITING | TERMINAL) != 0 {
                    None
                } else {
                    Some(a | ACTIVE)
                }
            })
            .is_ok()
    }

    /// Enters a dispatch step. Returns the state before the step.
    pub(crate) fn begin_step(&self) -> Activity {
        let prior = self.bits.fetch_or(RUNNING, Ordering::AcqRel);
        debug_assert!(prior & RUNNING == 0, "multiplex dispatched re-entrantly");
        Activity(prior)
    }

    /// Leaves a dispatch step. Clears the running guard and any signal that
    /// was delivered while the step ran. Returns the state after clearing.
    pub(crate) fn finish_step(&self) -> Activity {
        let prior = self
            .bits
            .fetch_and(!(RUNNING | SIGNAL_PENDING), Ordering::AcqRel);
        Activity(prior & !(RUNNING | SIGNAL_PENDING))
    }

    /// Moves an active task into the waiting state, unless a signal is
    /// already pending, in which case the pending wake is consumed and the
    /// task stays active. Returns true if the task is now waiting.
    pub(crate) fn enter_wait(&self) -> bool {
        let mut waited = false;
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                debug_assert!(a & RUNNING != 0, "wait outside of multiplex");
                if a & SIGNAL_PENDING != 0 {
                    waited = false;
                    Some(a & !SIGNAL_PENDING)
                } else {
                    waited = true;
                    Some((a & !ACTIVE) | WAITING)
                }
            });
        waited
    }

    /// Wakes a waiting task. Returns false if the task was not waiting.
    pub(crate) fn try_wake(&self) -> bool {
        self.bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                if a & WAITING == 0 {
                    None
                } else {
                    Some((a & !WAITING) | ACTIVE)
                }
            })
            .is_ok()
    }

    /// Records one pending wake on a non-waiting task. Returns false if the
    /// task is terminal.
    pub(crate) fn note_signal(&self) -> bool {
        self.bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                if a & TERMINAL != 0 {
                    None
                } else {
                    Some(a | SIGNAL_PENDING)
                }
            })
            .is_ok()
    }

    /// Sets the abort bit. A waiting task becomes active again so the abort
    /// is observed by its next dispatch.
    pub(crate) fn request_abort(&self) -> AbortOutcome {
        let mut outcome = AbortOutcome::Ignored;
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                if a & TERMINAL != 0 {
                    outcome = AbortOutcome::Ignored;
                    None
                } else if a & WAITING != 0 {
                    outcome = AbortOutcome::Wake;
                    Some((a & !WAITING) | ACTIVE | ABORTED)
                } else {
                    outcome = AbortOutcome::Noted;
                    Some(a | ABORTED)
                }
            });
        outcome
    }

    /// Marks the task finished. A task that is already terminal is left
    /// unchanged. Returns the state before the transition.
    pub(crate) fn set_finished(&self) -> Activity {
        let result = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                if a & TERMINAL != 0 {
                    None
                } else {
                    Some((a & !(ACTIVE | WAITING | SIGNAL_PENDING)) | FINISHED)
                }
            });
        Activity(result.unwrap_or_else(|current| current))
    }

    /// Marks the task killed. A task that is already terminal is left
    /// unchanged. Returns the state before the transition.
    pub(crate) fn set_killed(&self) -> Activity {
        let result = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| {
                if a & TERMINAL != 0 {
                    None
                } else {
                    Some((a & !(ACTIVE | WAITING | SIGNAL_PENDING)) | KILLED)
                }
            });
        Activity(result.unwrap_or_else(|current| current))
    }

    /// Claims the once-only terminal cleanup. Returns true for the claimant.
    pub(crate) fn try_finalize(&self) -> bool {
        let prior = self.bits.fetch_or(FINALIZED, Ordering::AcqRel);
        prior & FINALIZED == 0
    }
}
