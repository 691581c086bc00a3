//! A queue of running (possibly cancelled) timers, all of the same interval.

use super::Timer;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Per-interval ordered queue of running timers with stable sequence ids.
///
/// Each entry is `Some(timer)` or `None` for a timer that was cancelled but
/// not yet swept. Cancelled entries are not removed from the middle of the
/// queue; shifting the tail on every cancellation would cost O(n) and
/// cancellation is frequent (a timed yield that is superseded cancels its
/// timer). Instead the slot is nulled in place and the cost of removing it
/// is charged to `pop` and to front-cancellations, which sweep runs of
/// `None` entries.
///
/// Invariants, maintained jointly by `push`, `cancel` and `pop`:
/// - the front entry, if present, is live (never `None`);
/// - an entry at index `i` has the externally visible id
///   `i + sequence_offset`, and `sequence_offset + size()` is the id the
///   next `push` will return;
/// - entries are ordered by expiration, because all timers share one
///   interval and arrive in expiration order.
///
/// In the descriptions below, "current" means the next timer that `pop`
/// would return, even if that timer has been cancelled in the meantime.
#[derive(Debug, Default)]
pub struct TimerQueue {
    /// The number of entries already popped or swept. Id base for the rest.
    sequence_offset: u64,
    /// All running timers for the related interval.
    running: VecDeque<Option<Arc<Timer>>>,
}

impl TimerQueue {
    /// Constructs an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new timer to the end of the queue.
    ///
    /// Returns an ever-increasing sequence id, starting at 0. The caller
    /// holds the id for a later [`cancel`](Self::cancel).
    pub fn push(&mut self, timer: Arc<Timer>) -> u64 {
        self.running.push_back(Some(timer));
        self.running.len() as u64 - 1 + self.sequence_offset
    }

    /// Returns true if `sequence` identifies the current timer.
    #[must_use]
    pub fn is_current(&self, sequence: u64) -> bool {
        sequence == self.sequence_offset
    }

    /// Cancels a running timer.
    ///
    /// `sequence` must come from a previous [`push`](Self::push) and the
    /// timer may not have been popped or cancelled already; either is a
    /// precondition violation. Returns true if the cancelled timer was the
    /// current one, in which case it and any cancelled timers behind it are
    /// removed immediately.
    pub fn cancel(&mut self, sequence: u64) -> bool {
        assert!(
            sequence >= self.sequence_offset,
            "cancel: sequence {sequence} was already popped"
        );
        let index = (sequence - self.sequence_offset) as usize;
        assert!(
            index < self.running.len(),
            "cancel: sequence {sequence} was never pushed"
        );
        let slot = &mut self.running[index];
        assert!(slot.is_some(), "cancel: timer {sequence} cancelled twice");
        *slot = None;
        let was_current = index == 0;
        if was_current {
            // The cancelled timer is at the front. Remove it together with
            // any run of already-cancelled timers behind it.
            loop {
                self.sequence_offset += 1;
                self.running.pop_front();
                match self.running.front() {
                    Some(None) => {}
                    _ => break,
                }
            }
        }
        was_current
    }

    /// Removes the current timer from the front of the queue and returns it.
    ///
    /// The queue must not be empty. The returned timer is always live: the
    /// front entry is never a cancelled placeholder. Cancelled entries
    /// directly behind the front are swept as part of the pop, so the next
    /// front is live too (or the queue is empty).
    pub fn pop(&mut self) -> Arc<Timer> {
        assert!(!self.running.is_empty(), "pop called on an empty TimerQueue");
        let front = self.running.pop_front();
        self.sequence_offset += 1;
        let Some(Some(timer)) = front else {
            unreachable!("TimerQueue invariant violated: cancelled timer at the front");
        };
        while let Some(None) = self.running.front() {
            self.running.pop_front();
            self.sequence_offset += 1;
        }
        timer
    }

    /// Returns the next time point at which a timer of this interval will
    /// expire, or `None` if no timer is running.
    #[must_use]
    pub fn next_expiration_point(&self) -> Option<Instant> {
        self.running
            .front()
            .and_then(|slot| slot.as_ref())
            .map(|timer| timer.expiration_point())
    }

    /// Returns true if no timers are running for the related interval.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.running.is_empty()
    }

    /// The number of entries in the queue, cancelled placeholders included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.running.len()
    }

    // Everything below is just for debugging.

    /// The number of cancelled placeholders still in the queue.
    #[must_use]
    pub fn cancelled_in_queue(&self) -> usize {
        self.running.iter().filter(|slot| slot.is_none()).count()
    }

    /// The number of entries popped or swept so far.
    #[must_use]
    pub fn sequence_offset(&self) -> u64 {
        self.sequence_offset
    }

    /// Iterates over the queue slots, front first.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Arc<Timer>>> {
        self.running.iter().map(|slot| slot.as_ref())
    }
}
