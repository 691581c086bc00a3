//! Runtime configuration.
//!
//! # Configuration precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — fields set directly on [`RuntimeConfig`]
//! 2. **Environment variables** — `STATEMUX_*` values
//! 3. **Config file** — a TOML file (requires the `config-file` feature)
//! 4. **Defaults** — [`RuntimeConfig::default()`]
//!
//! # Supported environment variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `STATEMUX_AUXILIARY_ENGINE_NAME` | `String` | `auxiliary_engine_name` |
//! | `STATEMUX_DEFAULT_MAX_DURATION_MS` | `u64` | `default_max_duration_ms` |

use crate::error::BuildError;

/// Environment variable for the auxiliary engine's name.
pub const ENV_AUXILIARY_ENGINE_NAME: &str = "STATEMUX_AUXILIARY_ENGINE_NAME";
/// Environment variable for the default engine duration budget.
pub const ENV_DEFAULT_MAX_DURATION_MS: &str = "STATEMUX_DEFAULT_MAX_DURATION_MS";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Name given to the lazily created auxiliary engine.
    pub auxiliary_engine_name: String,
    /// Duration budget, in milliseconds, applied by
    /// [`Engine::from_config`](crate::Engine::from_config). 0 means no
    /// budget.
    pub default_max_duration_ms: u64,
}

impl RuntimeConfig {
    /// Builds a configuration from defaults plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if a set variable contains an unparseable
    /// value.
    pub fn from_env() -> Result<Self, BuildError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        config.normalize();
        Ok(config)
    }

    /// Normalizes configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.auxiliary_engine_name.is_empty() {
            self.auxiliary_engine_name = "auxiliary".to_string();
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auxiliary_engine_name: "auxiliary".to_string(),
            default_max_duration_ms: 0,
        }
    }
}

/// Applies environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
///
/// # Errors
///
/// Returns a [`BuildError`] if a variable is set but contains an
/// unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), BuildError> {
    if let Some(val) = read_env(ENV_AUXILIARY_ENGINE_NAME) {
        config.auxiliary_engine_name = val;
    }
    if let Some(val) = read_env(ENV_DEFAULT_MAX_DURATION_MS) {
        config.default_max_duration_ms = parse_u64(ENV_DEFAULT_MAX_DURATION_MS, &val)?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64, BuildError> {
    val.trim().parse::<u64>().map_err(|e| {
        BuildError::custom(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable runtime configuration.
///
/// ```toml
/// [engine]
/// auxiliary_engine_name = "aux"
/// default_max_duration_ms = 16
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct RuntimeTomlConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineToml,
}

/// Engine section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EngineToml {
    /// Name of the auxiliary engine.
    pub auxiliary_engine_name: Option<String>,
    /// Default duration budget in milliseconds.
    pub default_max_duration_ms: Option<u64>,
}

/// Loads a [`RuntimeConfig`] from a TOML file, applying defaults for
/// missing fields.
///
/// # Errors
///
/// Returns a [`BuildError`] if the file cannot be read or parsed.
#[cfg(feature = "config-file")]
pub fn load_config_file(path: &std::path::Path) -> Result<RuntimeConfig, BuildError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| BuildError::custom(format!("cannot read {}: {e}", path.display())))?;
    let parsed: RuntimeTomlConfig = toml::from_str(&text)
        .map_err(|e| BuildError::custom(format!("cannot parse {}: {e}", path.display())))?;
    let mut config = RuntimeConfig::default();
    if let Some(name) = parsed.engine.auxiliary_engine_name {
        config.auxiliary_engine_name = name;
    }
    if let Some(ms) = parsed.engine.default_max_duration_ms {
        config.default_max_duration_ms = ms;
    }
    config.normalize();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_normalized() {
        let mut config = RuntimeConfig {
            auxiliary_engine_name: String::new(),
            default_max_duration_ms: 0,
        };
        config.normalize();
        assert_eq!(config.auxiliary_engine_name, "auxiliary");
    }

    #[test]
    fn parse_u64_rejects_garbage() {
        let err = parse_u64("STATEMUX_TEST", "not-a-number").expect_err("must fail");
        assert!(err.to_string().contains("STATEMUX_TEST"));
    }

    #[test]
    fn parse_u64_trims_whitespace() {
        assert_eq!(parse_u64("STATEMUX_TEST", " 16 ").expect("parses"), 16);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_round_trip() {
        let parsed: RuntimeTomlConfig = toml::from_str(
            "[engine]\nauxiliary_engine_name = \"aux\"\ndefault_max_duration_ms = 16\n",
        )
        .expect("parses");
        assert_eq!(parsed.engine.auxiliary_engine_name.as_deref(), Some("aux"));
        assert_eq!(parsed.engine.default_max_duration_ms, Some(16));
    }
}
