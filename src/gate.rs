//! Shutdown latch counting live tasks.
//!
//! A [`TaskCounterGate`] lets a host thread wait until every task it is
//! tracking has reached a terminal state, typically right before engines
//! are flushed and destroyed. Call [`increment`](TaskCounterGate::increment)
//! when a task starts and [`decrement`](TaskCounterGate::decrement) when it
//! terminates; [`wait`](TaskCounterGate::wait) blocks until the count hits
//! zero.
//!
//! The counter starts with a "not waiting" bit set, so it cannot reach zero
//! before `wait` arms the gate. Tasks that start and finish before shutdown
//! begins therefore never trip the latch early.

use crate::tracing_compat::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

/// Keeps the counter nonzero until `wait` is entered.
const NOT_WAITING: u64 = 1 << 63;

/// A latch that waits for a counter of live tasks to drain to zero.
#[derive(Debug)]
pub struct TaskCounterGate {
    counter: AtomicU64,
    zeroed_mutex: Mutex<()>,
    zeroed: Condvar,
}

impl Default for TaskCounterGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCounterGate {
    /// Creates a gate with a zero task count, not yet armed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(NOT_WAITING),
            zeroed_mutex: Mutex::new(()),
            zeroed: Condvar::new(),
        }
    }

    /// Records one more live task.
    pub fn increment(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the termination of one task. The final decrement wakes a
    /// blocked [`wait`](Self::wait).
    pub fn decrement(&self) {
        let previous = self.counter.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(
            (previous & !NOT_WAITING) > 0,
            "TaskCounterGate: decrement without matching increment"
        );
        if previous == 1 {
            self.wakeup();
        }
    }

    /// Returns true if [`wait`](Self::wait) has armed the gate.
    fn is_armed(&self) -> bool {
        self.counter.load(Ordering::Relaxed) & NOT_WAITING == 0
    }

    /// Blocks the calling thread until the task count reaches zero.
    ///
    /// May be called at most once per gate; a second call is a
    /// precondition violation.
    pub fn wait(&self) {
        debug!("TaskCounterGate::wait: waiting for tasks to drain");
        let mut guard = self.zeroed_mutex.lock().expect("gate mutex poisoned");
        assert!(!self.is_armed(), "TaskCounterGate::wait called twice");
        self.counter.fetch_and(!NOT_WAITING, Ordering::AcqRel);
        while self.counter.load(Ordering::Acquire) != 0 {
            guard = self.zeroed.wait(guard).expect("gate mutex poisoned");
        }
        drop(guard);
        debug!("TaskCounterGate::wait: all tasks drained");
    }

    fn wakeup(&self) {
        debug!("TaskCounterGate: waking up waiter");
        // Taking the mutex orders this notify after the waiter's zero test,
        // so the final decrement cannot slip between the test and the wait.
        drop(self.zeroed_mutex.lock().expect("gate mutex poisoned"));
        self.zeroed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn wait_returns_after_last_decrement() {
        init_test("wait_returns_after_last_decrement");
        let gate = Arc::new(TaskCounterGate::new());
        for _ in 0..3 {
            gate.increment();
        }
        let worker = {
            let gate = gate.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(5));
                    gate.decrement();
                }
            })
        };
        gate.wait();
        worker.join().expect("worker panicked");
        crate::test_complete!("wait_returns_after_last_decrement");
    }

    #[test]
    fn completed_cycle_before_wait_does_not_trip_gate() {
        init_test("completed_cycle_before_wait_does_not_trip_gate");
        let gate = TaskCounterGate::new();
        gate.increment();
        gate.decrement();
        // The gate is not armed, so the cycle above must not have notified
        // anything. Arming now with a zero count returns immediately.
        gate.wait();
        crate::test_complete!("completed_cycle_before_wait_does_not_trip_gate");
    }

    #[test]
    fn wait_with_live_task_blocks_until_done() {
        init_test("wait_with_live_task_blocks_until_done");
        let gate = Arc::new(TaskCounterGate::new());
        gate.increment();
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.wait())
        };
        thread::sleep(Duration::from_millis(10));
        assert!(!waiter.is_finished());
        gate.decrement();
        waiter.join().expect("waiter panicked");
        crate::test_complete!("wait_with_live_task_blocks_until_done");
    }
}
