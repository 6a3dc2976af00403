// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Saltbus configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! [dispatch]
//! default_subscribed_version = "latest"
//! allow_unregistered_schemas = false
//! reject_duplicate_request_handlers = false
//!
//! [registry]
//! backend = "sqlite"
//! path = "/var/lib/saltbus/schemas.db"
//! max_pending = 1024
//!
//! [executor]
//! workers = 4
//! ledger_capacity = 65536
//! ```

use std::path::Path;

use saltbus_schema_registry::{Backend, RegistryConfig, SubscribedVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaltbusConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl SaltbusConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let SubscribedVersion::Exact(v) = &self.dispatch.default_subscribed_version {
            if v.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "default_subscribed_version must not be empty".into(),
                ));
            }
        }

        if self.registry.max_pending == 0 {
            return Err(ConfigError::Invalid("registry.max_pending must be at least 1".into()));
        }

        if self.registry.backend != Backend::Memory && self.registry.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "registry backend {:?} needs a path",
                self.registry.backend
            )));
        }

        if self.executor.workers == 0 {
            return Err(ConfigError::Invalid("executor.workers must be at least 1".into()));
        }

        if self.executor.ledger_capacity == 0 {
            return Err(ConfigError::Invalid(
                "executor.ledger_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}

/// Dispatcher behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Version given to handlers registered without one.
    #[serde(default)]
    pub default_subscribed_version: SubscribedVersion,

    /// Hand payloads through unvalidated when no schema is registered.
    #[serde(default)]
    pub allow_unregistered_schemas: bool,

    /// Refuse a second request/response handler on the same pattern
    /// instead of letting the first eligible one answer.
    #[serde(default)]
    pub reject_duplicate_request_handlers: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_subscribed_version: SubscribedVersion::Latest,
            allow_unregistered_schemas: false,
            reject_duplicate_request_handlers: false,
        }
    }
}

impl DispatchConfig {
    pub fn default_subscribed_version(mut self, version: impl Into<SubscribedVersion>) -> Self {
        self.default_subscribed_version = version.into();
        self
    }

    pub fn allow_unregistered_schemas(mut self, allow: bool) -> Self {
        self.allow_unregistered_schemas = allow;
        self
    }

    pub fn reject_duplicate_request_handlers(mut self, reject: bool) -> Self {
        self.reject_duplicate_request_handlers = reject;
        self
    }
}

/// Broadcast worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker threads running broadcast handlers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Dedup keys remembered before the oldest are forgotten.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_ledger_capacity() -> usize {
    65_536
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            ledger_capacity: default_ledger_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = SaltbusConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.dispatch.default_subscribed_version.is_latest());
        assert!(!config.dispatch.allow_unregistered_schemas);
        assert_eq!(config.registry.backend, Backend::Memory);
    }

    #[test]
    fn parse_full_file() {
        let config = SaltbusConfig::from_toml(
            r#"
            [dispatch]
            default_subscribed_version = "v1"
            allow_unregistered_schemas = true
            reject_duplicate_request_handlers = true

            [registry]
            backend = "file"
            path = "/tmp/saltbus-schemas"
            max_pending = 16

            [executor]
            workers = 2
            ledger_capacity = 128
            "#,
        )
        .unwrap();

        assert_eq!(
            config.dispatch.default_subscribed_version,
            SubscribedVersion::from("v1")
        );
        assert!(config.dispatch.reject_duplicate_request_handlers);
        assert_eq!(config.registry.backend, Backend::File);
        assert_eq!(config.registry.max_pending, 16);
        assert_eq!(config.executor.workers, 2);
        assert_eq!(config.executor.ledger_capacity, 128);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = SaltbusConfig::from_toml("").unwrap();
        assert_eq!(config, SaltbusConfig::default());
    }

    #[test]
    fn validation_errors() {
        let err = SaltbusConfig::from_toml("[registry]\nmax_pending = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SaltbusConfig::from_toml("[registry]\nbackend = \"sqlite\"\npath = \"\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SaltbusConfig::from_toml("[executor]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SaltbusConfig::from_toml("[registry]\nbackend = \"redis\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\nallow_unregistered_schemas = true").unwrap();
        let config = SaltbusConfig::from_file(file.path()).unwrap();
        assert!(config.dispatch.allow_unregistered_schemas);
    }

    #[test]
    fn config_serialization() {
        let config = SaltbusConfig::default().dispatch(DispatchConfig::default().default_subscribed_version("v2"));
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("default_subscribed_version = \"v2\""));
        assert!(toml_str.contains("backend = \"memory\""));
    }
}
