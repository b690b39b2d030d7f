//! Configuration System
//!
//! Layered configuration for the context store: built-in defaults, an optional
//! TOML file, then `AMBIENT_`-prefixed environment variables
//! (`AMBIENT_SCOPE__DEPTH_WARNING=128`).

use crate::error::ContextError;
use crate::logging::LoggingConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// What a scope guard does when it detects an unbalanced exit while dropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// Log the violation and panic (unless the thread is already unwinding).
    #[default]
    Panic,
    /// Log the violation and carry on.
    Log,
}

/// Scope stack settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub on_violation: ViolationPolicy,

    /// Nesting depth above which entering a scope logs a warning.
    #[serde(default = "default_depth_warning")]
    pub depth_warning: usize,
}

fn default_depth_warning() -> usize {
    64
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            on_violation: ViolationPolicy::default(),
            depth_warning: default_depth_warning(),
        }
    }
}

impl ScopeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.depth_warning == 0 {
            return Err("depth_warning must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbientConfig {
    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Scope(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Scope(msg) => write!(f, "Scope: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AmbientConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.scope.validate() {
            errors.push(ValidationError::Scope(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into a single `ConfigError`.
    pub fn ensure_valid(&self) -> Result<(), ContextError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ContextError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })
    }
}

/// Loads [`AmbientConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then `path` (if given, it must exist), then the environment.
    pub fn load(path: Option<&Path>) -> Result<AmbientConfig, ContextError> {
        let mut builder = builder_with_defaults()?;
        if let Some(path) = path {
            debug!(config_path = %path.display(), "Loading ambient configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: AmbientConfig = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Defaults and `path` only, ignoring the environment.
    pub fn load_from_file(path: &Path) -> Result<AmbientConfig, ContextError> {
        let config: AmbientConfig = builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ContextError> {
    Ok(Config::builder()
        .set_default("scope.on_violation", "panic")?
        .set_default("scope.depth_warning", default_depth_warning() as i64)?)
}

fn environment() -> Environment {
    Environment::with_prefix("AMBIENT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
