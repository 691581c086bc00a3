//! Statemux: a cooperative stateful-task scheduling runtime.
//!
//! # Overview
//!
//! Statemux multiplexes many long-lived tasks onto a small set of worker
//! threads. A [`Task`] is a cooperative state machine with a user-supplied
//! step function; an [`Engine`] is a FIFO queue plus a dispatch loop, bound
//! to one host thread that calls [`Engine::mainloop`] from its own outer
//! loop. Tasks decide at every step whether they stay on their engine, move
//! to another, go idle until a [`Task::signal`], or finish.
//!
//! # Core pieces
//!
//! - [`Engine`]: FIFO queue, bounded-time dispatch loop, condvar sleep and
//!   wake, shutdown flush.
//! - [`Task`]: control block with three engine references (target, current,
//!   default) and atomic activity bits; after every step the first present
//!   engine of that chain is where the task runs next, with the
//!   process-wide [`auxiliary_engine`] as the fallback.
//! - [`TimerQueue`]: per-interval queue of running [`Timer`]s with stable
//!   sequence ids, O(1) mid-queue cancellation and amortised sweeping.
//! - [`TaskCounterGate`]: shutdown latch that waits for live tasks to
//!   drain.
//!
//! # Example
//!
//! ```
//! use statemux::{Engine, RunReason, Task, TaskCx};
//!
//! let engine = Engine::new("main");
//! let task = Task::new(|cx: &TaskCx<'_>, _reason: RunReason| {
//!     // One cooperative step; finish on the first dispatch.
//!     cx.finish();
//! });
//! task.run_on(&engine);
//! # let t = { let engine = engine.clone(); std::thread::spawn(move || engine.mainloop()) };
//! # while !engine.is_waiting() { std::thread::yield_now(); }
//! # engine.wake_up();
//! # t.join().unwrap();
//! assert!(task.is_finished());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod task;
pub mod test_utils;
pub mod timer;
pub mod tracing_compat;
pub mod types;

pub use config::RuntimeConfig;
pub use engine::{auxiliary_engine, install_auxiliary_engine, Engine};
pub use error::{BuildError, Error, ErrorKind, Result};
pub use gate::TaskCounterGate;
pub use task::{FinishCallback, Stepper, Task, TaskCx};
pub use timer::{Timer, TimerQueue};
pub use types::{RunReason, TaskId};
