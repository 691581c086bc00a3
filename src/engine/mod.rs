//! Task queue and dispatcher.
//!
//! An [`Engine`] is a FIFO queue of tasks plus a dispatch loop, normally
//! bound to one host thread: the thread calls [`Engine::mainloop`] from its
//! own outer loop, and the engine runs one step of each queued task per
//! tick. Any thread may feed work into an engine through [`Engine::add`]
//! (usually indirectly, via [`Task::run`](crate::Task::run) or
//! [`Task::signal`](crate::Task::signal)) and release a parked mainloop.
//!
//! Engines with a duration budget keep ticking until the budget trips, then
//! hand control back to the host so it can render a frame or poll I/O.
//! Engines without a budget run until quiescent and then park on their
//! condition variable.

mod auxiliary;
mod queue;

pub use auxiliary::{auxiliary_engine, install_auxiliary_engine};
pub(crate) use queue::RunQueue;

use crate::config::RuntimeConfig;
use crate::task::Task;
use crate::tracing_compat::{debug, trace};
use crate::types::{RunReason, TaskId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// State guarded by the engine's mutex.
struct EngineState {
    queue: RunQueue,
    /// Set while the host thread is parked on the condition variable.
    waiting: bool,
    /// Set by `wake_up` to distinguish an explicit wake from new work.
    notified: bool,
}

struct EngineShared {
    name: String,
    /// Budget per `mainloop` call, in milliseconds. 0 means no budget.
    max_duration_ms: AtomicU64,
    /// Counts `mainloop` invocations. Frame-sleeping tasks wake relative
    /// to this.
    frame: AtomicU64,
    /// Re-entrancy guard for `mainloop`.
    in_mainloop: AtomicBool,
    state: Mutex<EngineState>,
    condvar: Condvar,
}

/// A task queue and dispatcher, bound to one host thread.
///
/// `Engine` is a cheap clonable handle; clones share the same queue.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineShared>,
}

impl Engine {
    /// Constructs an engine with no duration budget.
    ///
    /// Without a budget, `mainloop` runs until every queued task finished,
    /// went idle or moved to another engine, and then parks.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_duration(name, 0)
    }

    /// Constructs an engine with a duration budget in milliseconds.
    ///
    /// `max_duration_ms == 0` means no budget. See
    /// [`set_max_duration`](Self::set_max_duration).
    #[must_use]
    pub fn with_max_duration(name: impl Into<String>, max_duration_ms: u64) -> Self {
        Self {
            inner: Arc::new(EngineShared {
                name: name.into(),
                max_duration_ms: AtomicU64::new(max_duration_ms),
                frame: AtomicU64::new(0),
                in_mainloop: AtomicBool::new(false),
                state: Mutex::new(EngineState {
                    queue: RunQueue::new(),
                    waiting: false,
                    notified: false,
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Constructs an engine using the configured default duration budget.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &RuntimeConfig) -> Self {
        Self::with_max_duration(name, config.default_max_duration_ms)
    }

    /// The human-readable name this engine was constructed with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Sets the duration budget in milliseconds. 0 clears the budget.
    ///
    /// The budget bounds how long `mainloop` keeps admitting work. A task
    /// step that is already in flight is never interrupted, so a slow step
    /// can overshoot the budget arbitrarily; keep steps short on budgeted
    /// engines.
    pub fn set_max_duration(&self, max_duration_ms: u64) {
        self.inner
            .max_duration_ms
            .store(max_duration_ms, Ordering::Relaxed);
    }

    /// Returns true if a duration budget is set.
    ///
    /// Only engines with a budget can be used to sleep on via
    /// [`TaskCx::yield_frames`](crate::task::TaskCx::yield_frames) or
    /// [`TaskCx::yield_ms`](crate::task::TaskCx::yield_ms).
    #[must_use]
    pub fn has_max_duration(&self) -> bool {
        self.inner.max_duration_ms.load(Ordering::Relaxed) != 0
    }

    fn max_duration(&self) -> Option<Duration> {
        match self.inner.max_duration_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Returns true if both handles refer to the same engine.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The current mainloop invocation count. Frame sleeps are relative to
    /// this.
    pub(crate) fn current_frame(&self) -> u64 {
        self.inner.frame.load(Ordering::Relaxed)
    }

    /// Adds a task to this engine's queue.
    ///
    /// Idempotent: a task that is already queued here stays where it is. If
    /// the host thread is parked in `mainloop`, it is woken. Normally this
    /// is not called directly; `run`, `signal` and the yield operations
    /// route tasks to the right engine.
    pub fn add(&self, task: Arc<Task>) {
        let mut state = self.inner.state.lock().expect("engine state poisoned");
        let id = task.id();
        if state.queue.push(task) {
            trace!(engine = %self.inner.name, task = %id, "task queued");
            if state.waiting {
                self.inner.condvar.notify_one();
            }
        }
    }

    /// Unblocks a `mainloop` currently parked on the condition variable.
    ///
    /// A no-op if the engine is not parked. Never blocks.
    pub fn wake_up(&self) {
        let mut state = self.inner.state.lock().expect("engine state poisoned");
        if state.waiting {
            state.notified = true;
            self.inner.condvar.notify_one();
        }
    }

    /// The dispatch loop of the engine.
    ///
    /// Runs one step of each queued task per tick, in FIFO order. A task
    /// added during a tick is observed no earlier than the next tick. After
    /// each step the task's updated state decides whether it stays queued,
    /// migrated to another engine, went idle or terminated.
    ///
    /// Returns when the duration budget is exceeded, when only sleeping
    /// tasks remain (the host loop provides the frame cadence), or when the
    /// queue drained and a subsequent [`wake_up`](Self::wake_up) arrived
    /// while parked. May not be called concurrently with itself on the same
    /// engine; that is a precondition violation.
    pub fn mainloop(&self) {
        let shared = &self.inner;
        assert!(
            !shared.in_mainloop.swap(true, Ordering::Acquire),
            "Engine::mainloop is not re-entrant (engine `{}`)",
            shared.name
        );
        let _reset = MainloopGuard {
            flag: &shared.in_mainloop,
        };

        let frame = shared.frame.fetch_add(1, Ordering::Relaxed) + 1;
        let budget = self.max_duration();
        let started = Instant::now();

        loop {
            // One tick: at most the number of tasks queued right now, so
            // work added mid-tick waits for the snapshot boundary.
            let tick_len = {
                let state = shared.state.lock().expect("engine state poisoned");
                state.queue.len()
            };
            let mut ran_any = false;
            for _ in 0..tick_len {
                let popped = {
                    let mut state = shared.state.lock().expect("engine state poisoned");
                    state.queue.pop()
                };
                let Some(task) = popped else { break };
                if !task.activity_is_active() {
                    // Went idle or terminal while queued; release the
                    // reference.
                    trace!(engine = %shared.name, task = %task.id(), "dropping inactive task");
                    continue;
                }
                if task.sleep_defers(frame) {
                    let mut state = shared.state.lock().expect("engine state poisoned");
                    state.queue.push(task);
                    continue;
                }

                // The user callback runs with no engine lock held.
                task.multiplex(RunReason::Normal, Some(self));
                ran_any = true;

                if task.activity_is_active() && task.queued_on(self) {
                    let mut state = shared.state.lock().expect("engine state poisoned");
                    state.queue.push(task);
                }
                if budget.is_some_and(|d| started.elapsed() >= d) {
                    trace!(engine = %shared.name, "mainloop budget exceeded");
                    return;
                }
            }

            let mut state = shared.state.lock().expect("engine state poisoned");
            if !state.queue.is_empty() {
                if !ran_any {
                    // Only sleeping tasks this tick. Hand control back so
                    // the host loop advances the frame.
                    return;
                }
                drop(state);
                continue;
            }

            // Queue drained: park until new work or an explicit wake.
            state.waiting = true;
            while state.queue.is_empty() && !state.notified {
                state = shared
                    .condvar
                    .wait(state)
                    .expect("engine state poisoned");
            }
            state.waiting = false;
            let woken_empty = state.queue.is_empty();
            state.notified = false;
            if woken_empty {
                return;
            }
        }
    }

    /// Flushes all tasks from this engine.
    ///
    /// Every queued task is removed and marked killed, and the queue's
    /// references are released. Meant for shutdown, just before the host
    /// destroys the remaining objects; `add` still works afterwards but the
    /// host thread is assumed to have left its outer loop.
    pub fn flush(&self) {
        let drained = {
            let mut state = self.inner.state.lock().expect("engine state poisoned");
            state.queue.drain()
        };
        debug!(engine = %self.inner.name, count = drained.len(), "engine flushed");
        for task in drained {
            task.kill();
        }
    }

    /// The number of tasks currently queued.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.queue.len())
            .unwrap_or(0)
    }

    /// Returns true if the task with `id` is queued on this engine.
    #[must_use]
    pub fn has_queued(&self, id: TaskId) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.queue.contains(id))
            .unwrap_or(false)
    }

    /// Returns true if the host thread is parked in `mainloop`.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.waiting)
            .unwrap_or(false)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (len, waiting) = self
            .inner
            .state
            .lock()
            .map(|state| (state.queue.len(), state.waiting))
            .unwrap_or((0, false));
        f.debug_struct("Engine")
            .field("name", &self.inner.name)
            .field("queued", &len)
            .field("waiting", &waiting)
            .field("has_max_duration", &self.has_max_duration())
            .finish()
    }
}

struct MainloopGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for MainloopGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
