//! Logging facade for structured events.
//!
//! With the `tracing-integration` feature (the default) this re-exports the
//! event macros from the `tracing` crate. Without it, the macros compile to
//! nothing so the dispatch path carries no logging overhead.
//!
//! # Usage
//!
//! ```rust,ignore
//! use statemux::tracing_compat::{debug, trace};
//!
//! trace!(task = %id, "task queued");
//! debug!(engine = %name, "engine flushed");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op implementations when tracing is disabled.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_macros_compile() {
        trace!("trace message");
        debug!(count = 42, "debug with field");
        info!("info message");
        warn!("warn message");
        error!("error message");
    }
}
