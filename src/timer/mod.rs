//! Timers and the per-interval timer queue.
//!
//! A [`Timer`] pairs a wall-clock expiration point with the task it will
//! wake. Timers of one interval live together in a [`TimerQueue`], appended
//! in arrival order, which for a single interval is also expiration order.
//! The queue is not thread-safe by itself; it is owned by a timer-thread
//! component that serialises access and, when an expiration fires, pops the
//! timer and signals the task. "No expiration" is represented as `None`,
//! not as a sentinel timer value.

mod queue;

pub use queue::TimerQueue;

use crate::task::Task;
use crate::tracing_compat::trace;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// A running timer: an expiration point and the task it wakes.
///
/// The back-reference to the task is weak. A timer never keeps its task
/// alive; if the task is gone by the time the timer fires, the expiration
/// is a no-op.
#[derive(Debug)]
pub struct Timer {
    expiration: Instant,
    task: Weak<Task>,
}

impl Timer {
    /// Creates a timer that will signal `task` at `expiration`.
    #[must_use]
    pub fn new(task: &Arc<Task>, expiration: Instant) -> Arc<Self> {
        Arc::new(Self {
            expiration,
            task: Arc::downgrade(task),
        })
    }

    /// The point in time at which this timer expires.
    #[must_use]
    pub fn expiration_point(&self) -> Instant {
        self.expiration
    }

    /// Fires the timer: signals the associated task.
    ///
    /// Returns false if the task no longer exists.
    pub fn expire(&self) -> bool {
        match self.task.upgrade() {
            Some(task) => {
                trace!(task = %task.id(), "timer expired, signaling task");
                task.signal();
                true
            }
            None => false,
        }
    }
}
