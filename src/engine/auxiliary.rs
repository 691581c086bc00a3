//! The process-wide auxiliary engine.
//!
//! Tasks that have no target, current or default engine but still need to
//! run somewhere land here. The auxiliary engine is an ordinary [`Engine`]
//! with no duration budget; it is merely the fallback of the engine
//! selection rule.
//!
//! Hosts (and tests that want to stay hermetic) may install their own
//! instance at startup with [`install_auxiliary_engine`]; otherwise the
//! first use creates one from the environment-derived [`RuntimeConfig`].

use super::Engine;
use crate::config::{apply_env_overrides, RuntimeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::tracing_compat::{debug, warn};
use std::sync::OnceLock;

static AUXILIARY_ENGINE: OnceLock<Engine> = OnceLock::new();

/// Installs `engine` as the process-wide auxiliary engine.
///
/// Must be called before the first task is routed to the fallback; once the
/// auxiliary engine exists it never changes.
///
/// # Errors
///
/// Returns [`ErrorKind::AuxiliaryAlreadyInstalled`] if an auxiliary engine
/// was already installed or lazily created.
pub fn install_auxiliary_engine(engine: Engine) -> Result<()> {
    let name = engine.name().to_owned();
    AUXILIARY_ENGINE.set(engine).map_err(|_| {
        Error::new(ErrorKind::AuxiliaryAlreadyInstalled)
            .with_context(format!("while installing engine `{name}`"))
    })?;
    debug!(engine = %name, "auxiliary engine installed");
    Ok(())
}

/// Returns the process-wide auxiliary engine, creating it at first use.
#[must_use]
pub fn auxiliary_engine() -> Engine {
    AUXILIARY_ENGINE
        .get_or_init(|| {
            let mut config = RuntimeConfig::default();
            if let Err(e) = apply_env_overrides(&mut config) {
                warn!(error = %e, "ignoring invalid environment overrides for the auxiliary engine");
            }
            config.normalize();
            debug!(engine = %config.auxiliary_engine_name, "creating auxiliary engine");
            Engine::new(config.auxiliary_engine_name)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auxiliary_engine_is_stable_and_unbudgeted() {
        let first = auxiliary_engine();
        let second = auxiliary_engine();
        assert!(first.same(&second));
        assert!(!first.has_max_duration());
    }

    #[test]
    fn install_after_first_use_fails() {
        let _ = auxiliary_engine();
        let err = install_auxiliary_engine(Engine::new("late"))
            .expect_err("install after first use must fail");
        assert_eq!(err.kind(), ErrorKind::AuxiliaryAlreadyInstalled);
    }
}
