//! The task control block.
//!
//! A [`Task`] is a cooperative state machine with a user-supplied step
//! function, dispatched one step at a time by an [`Engine`]. The control
//! block tracks three engine references forming a priority chain:
//!
//! - `target_engine`: the user's explicit "next engine" preference, set by
//!   `target` and the yield operations;
//! - `current_engine`: where the task is queued now, reconciled after every
//!   step; the engine that finds a task whose `current_engine` moved away
//!   drops it from its queue;
//! - `default_engine`: fixed at `run`, possibly absent.
//!
//! After every step the canonical engine for the next tick is the first
//! present of target, current, default; a still-active task with none of
//! the three is routed to the process-wide auxiliary engine. That rule is
//! centralised in `reconcile`, so every transition goes through it.
//!
//! `run`, `signal`, `abort` and `kill` may be called from any thread. The
//! activity bits are atomic; the engine references and the wait condition
//! live behind the task's internal lock, and no engine lock is ever held
//! while a task method runs.

mod step;

pub use step::{Stepper, TaskCx};

use crate::engine::{auxiliary_engine, Engine};
use crate::tracing_compat::{debug, trace};
use crate::types::activity::{AbortOutcome, ActivityCell};
use crate::types::{RunReason, TaskId};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Completion callback passed to [`Task::run_with`], invoked once when the
/// task reaches a terminal state (not when killed).
pub type FinishCallback = Box<dyn FnOnce(&Arc<Task>) + Send>;

/// A pending timed yield.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Sleep {
    /// Skip dispatches until the engine reaches this mainloop invocation.
    Frames { until_frame: u64 },
    /// Skip dispatches until this point in time.
    Until(Instant),
}

/// State behind the task's internal lock.
struct TaskInner {
    target_engine: Option<Engine>,
    current_engine: Option<Engine>,
    default_engine: Option<Engine>,
    wait_condition: Option<Box<dyn Fn() -> bool + Send>>,
    sleep: Option<Sleep>,
    /// Overrides the dispatch reason of the next step (initial run, wake
    /// from signal).
    wake_reason: Option<RunReason>,
    on_finish: Option<FinishCallback>,
}

/// A cooperative stateful task.
///
/// Construct with [`Task::new`], start with one of the `run` methods. The
/// returned handle is reference counted; every engine queue that holds the
/// task keeps it alive.
pub struct Task {
    id: TaskId,
    activity: ActivityCell,
    stepper: Mutex<Box<dyn Stepper>>,
    inner: Mutex<TaskInner>,
}

impl Task {
    /// Creates a task around the given step function.
    ///
    /// The task does nothing until [`run`](Self::run) is called.
    #[must_use]
    pub fn new(stepper: impl Stepper + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::next(),
            activity: ActivityCell::new(),
            stepper: Mutex::new(Box::new(stepper)),
            inner: Mutex::new(TaskInner {
                target_engine: None,
                current_engine: None,
                default_engine: None,
                wait_condition: None,
                sleep: None,
                wake_reason: None,
                on_finish: None,
            }),
        })
    }

    /// The unique id of this task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Starts the task with no default engine.
    ///
    /// The first step runs inline on the calling thread; a task that is
    /// still active afterwards continues on its target engine, or on the
    /// auxiliary engine if it has none.
    pub fn run(self: &Arc<Self>) {
        self.run_with(None, None);
    }

    /// Starts the task on `engine`, which becomes its default engine.
    pub fn run_on(self: &Arc<Self>, engine: &Engine) {
        self.run_with(Some(engine), None);
    }

    /// Starts the task with an optional default engine and an optional
    /// completion callback.
    ///
    /// Starting a task twice is a precondition violation.
    pub fn run_with(
        self: &Arc<Self>,
        default_engine: Option<&Engine>,
        on_finish: Option<FinishCallback>,
    ) {
        assert!(
            self.activity.try_activate(),
            "Task::run: task {} was already started",
            self.id
        );
        debug!(
            task = %self.id,
            engine = default_engine.map_or("<inline>", Engine::name),
            "task run"
        );
        let enqueue = {
            let mut inner = self.inner.lock().expect("task state poisoned");
            inner.default_engine = default_engine.cloned();
            inner.on_finish = on_finish;
            inner.wake_reason = Some(RunReason::Initial);
            match default_engine {
                Some(engine) => {
                    inner.current_engine = Some(engine.clone());
                    Some(engine.clone())
                }
                None => None,
            }
        };
        match enqueue {
            Some(engine) => engine.add(self.clone()),
            None => self.multiplex(RunReason::Initial, None),
        }
    }

    /// Sets (or clears) the target engine preference.
    ///
    /// Takes effect at the task's next reconciliation, at most one tick
    /// later.
    pub fn target(&self, engine: Option<&Engine>) {
        let mut inner = self.inner.lock().expect("task state poisoned");
        inner.target_engine = engine.cloned();
    }

    /// Notifies a task that what it was waiting for may have happened.
    ///
    /// Safe against a concurrent step. If the task is waiting and its wait
    /// condition holds (or it had none), it becomes active again and is
    /// queued on its canonical engine. If the task is active, one pending
    /// wake is recorded instead and the next `wait` in the current step is
    /// a no-op. Signals to terminal tasks are ignored.
    pub fn signal(self: &Arc<Self>) {
        let enqueue = {
            let mut inner = self.inner.lock().expect("task state poisoned");
            let a = self.activity.load();
            if a.is_terminal() {
                return;
            }
            if a.is_waiting() {
                if let Some(condition) = inner.wait_condition.as_ref() {
                    if !condition() {
                        trace!(task = %self.id, "signal: wait condition still false");
                        return;
                    }
                }
                if self.activity.try_wake() {
                    inner.wait_condition = None;
                    inner.wake_reason = Some(RunReason::Signaled);
                    let canonical = inner
                        .target_engine
                        .clone()
                        .or_else(|| inner.default_engine.clone())
                        .unwrap_or_else(auxiliary_engine);
                    inner.current_engine = Some(canonical.clone());
                    Some(canonical)
                } else {
                    None
                }
            } else {
                if self.activity.note_signal() {
                    trace!(task = %self.id, "signal recorded as pending wake");
                }
                None
            }
        };
        if let Some(engine) = enqueue {
            trace!(task = %self.id, engine = %engine.name(), "signal wakes task");
            engine.add(self.clone());
        }
    }

    /// Requests an abort.
    ///
    /// Level-triggered and idempotent: the next step observes the bit,
    /// runs `on_abort` and terminates the task. A waiting task is woken so
    /// the abort is observed promptly.
    pub fn abort(self: &Arc<Self>) {
        let enqueue = {
            let mut inner = self.inner.lock().expect("task state poisoned");
            match self.activity.request_abort() {
                AbortOutcome::Ignored => None,
                AbortOutcome::Noted => {
                    debug!(task = %self.id, "abort requested");
                    None
                }
                AbortOutcome::Wake => {
                    debug!(task = %self.id, "abort wakes waiting task");
                    inner.wait_condition = None;
                    inner.wake_reason = Some(RunReason::Signaled);
                    let canonical = inner
                        .target_engine
                        .clone()
                        .or_else(|| inner.default_engine.clone())
                        .unwrap_or_else(auxiliary_engine);
                    inner.current_engine = Some(canonical.clone());
                    Some(canonical)
                }
            }
        };
        if let Some(engine) = enqueue {
            engine.add(self.clone());
        }
    }

    /// Terminates the task successfully.
    ///
    /// Usually called from within a step via [`TaskCx::finish`]; calling
    /// it from outside a step terminates the task before its next
    /// dispatch. Idempotent once terminal.
    pub fn finish(self: &Arc<Self>) {
        let prior = self.activity.set_finished();
        if prior.is_terminal() {
            return;
        }
        debug!(task = %self.id, "task finishing");
        if !prior.is_running() {
            self.finalize();
        }
    }

    /// Kills the task: terminal, no callbacks.
    ///
    /// Used by [`Engine::flush`] at shutdown. Idempotent once terminal.
    pub fn kill(self: &Arc<Self>) {
        let prior = self.activity.set_killed();
        if prior.is_terminal() {
            return;
        }
        debug!(task = %self.id, "task killed");
        if !prior.is_running() {
            self.finalize();
        }
    }

    /// Returns true if the task is live and schedulable.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.activity.load().is_active()
    }

    /// Returns true if the task is waiting for a signal.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.activity.load().is_waiting()
    }

    /// Returns true if an abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.activity.load().is_aborted()
    }

    /// Returns true if the task finished (including via abort).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.activity.load().is_finished()
    }

    /// Returns true if the task was killed.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.activity.load().is_killed()
    }

    /// The engine the task is currently queued on, if any.
    #[must_use]
    pub fn current_engine(&self) -> Option<Engine> {
        self.inner
            .lock()
            .expect("task state poisoned")
            .current_engine
            .clone()
    }

    // ── Engine-facing internals ─────────────────────────────────────────

    /// One dispatched step: runs the user callback (or the abort path) and
    /// reconciles the engine references afterwards.
    ///
    /// `ran_on` is the engine dispatching the step, or `None` for an
    /// inline run.
    pub(crate) fn multiplex(self: &Arc<Self>, reason: RunReason, ran_on: Option<&Engine>) {
        let before = self.activity.begin_step();
        if before.is_terminal() {
            // Flushed or finished while queued; nothing left to run.
            self.activity.finish_step();
            return;
        }
        let reason = {
            let mut inner = self.inner.lock().expect("task state poisoned");
            inner.wake_reason.take().unwrap_or(reason)
        };
        trace!(task = %self.id, reason = reason.name(), "multiplex");
        if before.is_aborted() {
            {
                let mut stepper = self.stepper.lock().expect("task stepper poisoned");
                stepper.on_abort(&TaskCx::new(self));
            }
            self.activity.set_finished();
        } else {
            let mut stepper = self.stepper.lock().expect("task stepper poisoned");
            stepper.multiplex_impl(&TaskCx::new(self), reason);
        }
        self.activity.finish_step();
        self.reconcile(ran_on);
    }

    /// Picks where the task runs next. The canonical engine is the first
    /// present of target, current, default, else the auxiliary engine. A
    /// task that moved enqueues itself on the new engine; the old engine
    /// notices the changed `current_engine` and drops it.
    fn reconcile(self: &Arc<Self>, ran_on: Option<&Engine>) {
        enum Followup {
            Nothing,
            Finalize,
            Enqueue(Engine),
        }

        let followup = {
            let mut inner = self.inner.lock().expect("task state poisoned");
            let a = self.activity.load();
            if a.is_terminal() {
                Followup::Finalize
            } else if !a.is_active() {
                inner.current_engine = None;
                trace!(task = %self.id, "task idle, waiting for signal");
                Followup::Nothing
            } else {
                let canonical = inner
                    .target_engine
                    .clone()
                    .or_else(|| inner.current_engine.clone())
                    .or_else(|| inner.default_engine.clone())
                    .unwrap_or_else(auxiliary_engine);
                let moved = ran_on.map_or(true, |engine| !engine.same(&canonical));
                inner.current_engine = Some(canonical.clone());
                if moved {
                    Followup::Enqueue(canonical)
                } else {
                    Followup::Nothing
                }
            }
        };
        match followup {
            Followup::Nothing => {}
            Followup::Finalize => self.finalize(),
            Followup::Enqueue(engine) => {
                trace!(task = %self.id, engine = %engine.name(), "task moves engine");
                engine.add(self.clone());
            }
        }
    }

    /// Once-only terminal cleanup: releases the engine references and runs
    /// the finish hooks (skipped for killed tasks).
    fn finalize(self: &Arc<Self>) {
        if !self.activity.try_finalize() {
            return;
        }
        let a = self.activity.load();
        let on_finish = {
            let mut inner = self.inner.lock().expect("task state poisoned");
            inner.target_engine = None;
            inner.current_engine = None;
            inner.default_engine = None;
            inner.wait_condition = None;
            inner.sleep = None;
            inner.on_finish.take()
        };
        if !a.is_killed() {
            {
                let mut stepper = self.stepper.lock().expect("task stepper poisoned");
                stepper.on_finish(&TaskCx::new(self));
            }
            if let Some(callback) = on_finish {
                callback(self);
            }
        }
        debug!(task = %self.id, killed = a.is_killed(), "task terminated");
    }

    /// Lock-free activity probe for the dispatch loop.
    pub(crate) fn activity_is_active(&self) -> bool {
        self.activity.load().is_active()
    }

    /// Returns true if `engine` is still the task's current engine.
    pub(crate) fn queued_on(&self, engine: &Engine) -> bool {
        self.inner
            .lock()
            .expect("task state poisoned")
            .current_engine
            .as_ref()
            .is_some_and(|current| current.same(engine))
    }

    /// Checks and advances a pending timed yield. Returns true if the
    /// dispatch loop should skip the task this tick.
    pub(crate) fn sleep_defers(&self, frame: u64) -> bool {
        let mut inner = self.inner.lock().expect("task state poisoned");
        match inner.sleep {
            Some(Sleep::Frames { until_frame }) => {
                if frame >= until_frame {
                    inner.sleep = None;
                    false
                } else {
                    true
                }
            }
            Some(Sleep::Until(at)) => {
                if Instant::now() >= at {
                    inner.sleep = None;
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// The engine the task would run on next, per the priority chain.
    pub(crate) fn canonical_engine(&self) -> Engine {
        let inner = self.inner.lock().expect("task state poisoned");
        inner
            .target_engine
            .clone()
            .or_else(|| inner.current_engine.clone())
            .or_else(|| inner.default_engine.clone())
            .unwrap_or_else(auxiliary_engine)
    }

    /// Records a pending timed yield.
    pub(crate) fn set_sleep(&self, sleep: Option<Sleep>) {
        let mut inner = self.inner.lock().expect("task state poisoned");
        inner.sleep = sleep;
    }

    /// Goes idle until `signal` finds `condition` true. Consumes a pending
    /// wake instead of waiting; see [`TaskCx::wait`].
    pub(crate) fn wait(&self, condition: impl Fn() -> bool + Send + 'static) {
        let mut inner = self.inner.lock().expect("task state poisoned");
        if condition() {
            return;
        }
        if !self.activity.enter_wait() {
            trace!(task = %self.id, "wait skipped, wake already pending");
            return;
        }
        inner.wait_condition = Some(Box::new(condition));
        trace!(task = %self.id, "task waits for signal");
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("activity", &self.activity.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn run_on_engine_enqueues_without_running() {
        init_test("run_on_engine_enqueues_without_running");
        let engine = Engine::new("queueing");
        let steps = Arc::new(AtomicUsize::new(0));
        let task = {
            let steps = steps.clone();
            Task::new(move |_cx: &TaskCx<'_>, _r: RunReason| {
                steps.fetch_add(1, Ordering::SeqCst);
            })
        };
        task.run_on(&engine);
        crate::assert_with_log!(
            steps.load(Ordering::SeqCst) == 0,
            "no inline step with a default engine",
            0usize,
            steps.load(Ordering::SeqCst)
        );
        crate::assert_with_log!(
            engine.has_queued(task.id()),
            "task queued on default engine",
            true,
            engine.has_queued(task.id())
        );
        crate::test_complete!("run_on_engine_enqueues_without_running");
    }

    #[test]
    fn wait_then_signal_requeues_on_default_engine() {
        init_test("wait_then_signal_requeues_on_default_engine");
        let engine = Engine::new("wake-target");
        let flag = Arc::new(AtomicBool::new(false));
        let task = {
            let flag = flag.clone();
            Task::new(move |cx: &TaskCx<'_>, _r: RunReason| {
                let flag = flag.clone();
                cx.wait(move || flag.load(Ordering::SeqCst));
            })
        };
        task.run_on(&engine);
        task.multiplex(RunReason::Normal, Some(&engine));
        crate::assert_with_log!(task.is_waiting(), "task idle", true, task.is_waiting());
        crate::assert_with_log!(
            task.current_engine().is_none(),
            "idle task left its engine",
            true,
            task.current_engine().is_none()
        );

        crate::test_section!("signal with false condition");
        task.signal();
        crate::assert_with_log!(
            task.is_waiting(),
            "condition false keeps task idle",
            true,
            task.is_waiting()
        );

        crate::test_section!("signal with true condition");
        flag.store(true, Ordering::SeqCst);
        task.signal();
        crate::assert_with_log!(task.is_active(), "task active again", true, task.is_active());
        crate::assert_with_log!(
            engine.has_queued(task.id()),
            "task requeued on default engine",
            true,
            engine.has_queued(task.id())
        );
        crate::test_complete!("wait_then_signal_requeues_on_default_engine");
    }

    #[test]
    fn pending_signal_preempts_wait() {
        init_test("pending_signal_preempts_wait");
        let engine = Engine::new("pending");
        let task = Task::new(move |cx: &TaskCx<'_>, _r: RunReason| {
            // A signal that lands during the step must not be lost when the
            // step then decides to wait.
            cx.task().signal();
            cx.wait(|| false);
        });
        task.run_on(&engine);
        task.multiplex(RunReason::Normal, Some(&engine));
        crate::assert_with_log!(
            task.is_active(),
            "pending wake kept the task active",
            true,
            task.is_active()
        );
        crate::test_complete!("pending_signal_preempts_wait");
    }

    #[test]
    fn abort_terminates_on_next_dispatch() {
        init_test("abort_terminates_on_next_dispatch");
        let engine = Engine::new("abort");
        let aborted = Arc::new(AtomicBool::new(false));

        struct Aborting {
            aborted: Arc<AtomicBool>,
        }
        impl Stepper for Aborting {
            fn multiplex_impl(&mut self, _cx: &TaskCx<'_>, _reason: RunReason) {}
            fn on_abort(&mut self, _cx: &TaskCx<'_>) {
                self.aborted.store(true, Ordering::SeqCst);
            }
        }

        let task = Task::new(Aborting {
            aborted: aborted.clone(),
        });
        task.run_on(&engine);
        task.abort();
        task.abort(); // idempotent
        task.multiplex(RunReason::Normal, Some(&engine));
        crate::assert_with_log!(task.is_finished(), "task finished", true, task.is_finished());
        crate::assert_with_log!(
            aborted.load(Ordering::SeqCst),
            "on_abort hook ran",
            true,
            aborted.load(Ordering::SeqCst)
        );
        crate::test_complete!("abort_terminates_on_next_dispatch");
    }

    #[test]
    fn finish_callback_runs_once() {
        init_test("finish_callback_runs_once");
        let engine = Engine::new("callbacks");
        let calls = Arc::new(AtomicUsize::new(0));
        let task = Task::new(|cx: &TaskCx<'_>, _r: RunReason| cx.finish());
        let callback_calls = calls.clone();
        task.run_with(
            Some(&engine),
            Some(Box::new(move |_task| {
                callback_calls.fetch_add(1, Ordering::SeqCst);
            })),
        );
        task.multiplex(RunReason::Normal, Some(&engine));
        task.finish(); // idempotent after terminal
        crate::assert_with_log!(
            calls.load(Ordering::SeqCst) == 1,
            "on_finish ran exactly once",
            1usize,
            calls.load(Ordering::SeqCst)
        );
        crate::assert_with_log!(
            task.current_engine().is_none(),
            "engine references released",
            true,
            task.current_engine().is_none()
        );
        crate::test_complete!("finish_callback_runs_once");
    }

    #[test]
    fn target_beats_default_in_reconciliation() {
        init_test("target_beats_default_in_reconciliation");
        let e1 = Engine::new("default");
        let e2 = Engine::new("target");
        let task = {
            let e2 = e2.clone();
            Task::new(move |cx: &TaskCx<'_>, _r: RunReason| {
                cx.yield_to(&e2);
            })
        };
        task.run_on(&e1);
        task.multiplex(RunReason::Normal, Some(&e1));
        crate::assert_with_log!(
            task.queued_on(&e2),
            "current engine is the target",
            true,
            task.queued_on(&e2)
        );
        crate::assert_with_log!(
            e2.has_queued(task.id()),
            "task queued on target engine",
            true,
            e2.has_queued(task.id())
        );
        crate::test_complete!("target_beats_default_in_reconciliation");
    }
}
