//! Error types for statemux.
//!
//! The runtime surfaces very little to callers: misuse of the core types
//! (popping an empty timer queue, re-entrant `mainloop`, double-cancel) is a
//! programmer error and panics loudly instead of returning an error value.
//! What remains is configuration and setup, covered here.

use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An auxiliary engine was already installed.
    AuxiliaryAlreadyInstalled,
    /// Configuration could not be built or parsed.
    Config,
}

/// The main error type for statemux operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Error produced while building a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    message: String,
}

impl BuildError {
    /// Creates a build error with a custom message.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for BuildError {}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Self::new(ErrorKind::Config).with_context(e.message)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }
}

/// A specialized Result type for statemux operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::Config);
        assert_eq!(err.to_string(), "Config");
    }

    #[test]
    fn display_with_context() {
        let err = Error::new(ErrorKind::AuxiliaryAlreadyInstalled).with_context("second install");
        assert_eq!(err.to_string(), "AuxiliaryAlreadyInstalled: second install");
    }

    #[test]
    fn from_build_error() {
        let err: Error = BuildError::custom("bad value").into();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "Config: bad value");
    }

    #[test]
    fn result_ext_adds_context() {
        let res: core::result::Result<(), BuildError> = Err(BuildError::custom("inner"));
        let err = res.context("outer").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "Config: outer");
    }
}
