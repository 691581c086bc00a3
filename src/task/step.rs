//! The step interface between a task and its user-supplied state machine.
//!
//! User code implements [`Stepper`] and drives the control block through the
//! [`TaskCx`] handed to every step. There is no inheritance chain: the task
//! record is concrete and the user logic is injected as a capability.

use super::{Sleep, Task};
use crate::engine::Engine;
use crate::types::{RunReason, TaskId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The incremental state machine of a task.
///
/// `multiplex_impl` is one cooperative step: it must return promptly, after
/// recording through `cx` whether the task yields, waits, moves engines or
/// finishes. Returning without calling anything on `cx` means "run me again
/// next tick".
///
/// Closures of the shape `FnMut(&TaskCx<'_>, RunReason)` implement this
/// trait directly.
pub trait Stepper: Send {
    /// Executes one dispatched step of the task.
    fn multiplex_impl(&mut self, cx: &TaskCx<'_>, reason: RunReason);

    /// Called once when an abort is observed, before the task finishes.
    fn on_abort(&mut self, cx: &TaskCx<'_>) {
        let _ = cx;
    }

    /// Called once when the task reaches its terminal state (not for
    /// killed tasks).
    fn on_finish(&mut self, cx: &TaskCx<'_>) {
        let _ = cx;
    }
}

impl<F> Stepper for F
where
    F: FnMut(&TaskCx<'_>, RunReason) + Send,
{
    fn multiplex_impl(&mut self, cx: &TaskCx<'_>, reason: RunReason) {
        self(cx, reason)
    }
}

/// The control surface a step uses to drive its own task.
///
/// All operations take effect when the step returns: the engine inspects
/// the updated control block and reconciles where the task runs next.
pub struct TaskCx<'a> {
    task: &'a Arc<Task>,
}

impl<'a> TaskCx<'a> {
    pub(crate) fn new(task: &'a Arc<Task>) -> Self {
        Self { task }
    }

    /// The task being stepped.
    #[must_use]
    pub fn task(&self) -> &Arc<Task> {
        self.task
    }

    /// The id of the task being stepped.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Sets (or clears) the target engine preference for the next tick.
    pub fn target(&self, engine: Option<&Engine>) {
        self.task.target(engine);
    }

    /// Continues on the canonical engine next tick.
    ///
    /// A step that returns without finishing or waiting continues anyway;
    /// this makes the intent explicit. A task with no engine at all is
    /// routed to the auxiliary engine.
    pub fn yield_now(&self) {}

    /// Continues on `engine` next tick.
    pub fn yield_to(&self, engine: &Engine) {
        self.task.target(Some(engine));
    }

    /// Skips the next `frames` mainloop invocations of the engine the task
    /// runs on.
    ///
    /// Only engines with a duration budget run at frame cadence; calling
    /// this when the canonical engine has no `max_duration` is a
    /// precondition violation.
    pub fn yield_frames(&self, frames: u64) {
        let engine = self.task.canonical_engine();
        assert!(
            engine.has_max_duration(),
            "yield_frames: engine `{}` has no duration budget to sleep on",
            engine.name()
        );
        let until_frame = engine.current_frame() + frames;
        self.task.set_sleep(Some(Sleep::Frames { until_frame }));
    }

    /// Skips dispatches until `ms` milliseconds have passed.
    ///
    /// Same precondition as [`yield_frames`](Self::yield_frames): the
    /// canonical engine must have a duration budget.
    pub fn yield_ms(&self, ms: u64) {
        let engine = self.task.canonical_engine();
        assert!(
            engine.has_max_duration(),
            "yield_ms: engine `{}` has no duration budget to sleep on",
            engine.name()
        );
        let until = Instant::now() + Duration::from_millis(ms);
        self.task.set_sleep(Some(Sleep::Until(until)));
    }

    /// Goes idle until [`Task::signal`] finds `condition` true.
    ///
    /// If `condition` already holds, or a signal was delivered during this
    /// step, the task stays active and runs again next tick.
    pub fn wait(&self, condition: impl Fn() -> bool + Send + 'static) {
        self.task.wait(condition);
    }

    /// Terminates the task successfully.
    pub fn finish(&self) {
        self.task.finish();
    }

    /// Requests an abort of the task.
    ///
    /// The abort is observed by the next dispatch, which runs `on_abort`
    /// and terminates the task.
    pub fn abort(&self) {
        self.task.abort();
    }
}
