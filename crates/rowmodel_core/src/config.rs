//! Runtime configuration.

use crate::error::{ModelError, ModelResult};
use crate::events::DEFAULT_EVENT_PREFIX;
use serde::Deserialize;
use std::path::Path;

/// Connection name used when a model does not route elsewhere.
pub const DEFAULT_CONNECTION: &str = "db";

/// Configuration for an [`Orm`](crate::Orm).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    /// Connection used by models that keep the default route.
    pub default_connection: String,

    /// Prefix of published lifecycle event names.
    pub event_prefix: String,

    /// Prepended to derived source names. Explicit routes are used as given.
    pub table_prefix: String,

    /// Number of published events kept for inspection (0 = none).
    pub event_history: usize,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            default_connection: DEFAULT_CONNECTION.to_string(),
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            table_prefix: String::new(),
            event_history: 1024,
        }
    }
}

impl OrmConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default connection name.
    #[must_use]
    pub fn default_connection(mut self, name: impl Into<String>) -> Self {
        self.default_connection = name.into();
        self
    }

    /// Sets the event name prefix.
    #[must_use]
    pub fn event_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_prefix = prefix.into();
        self
    }

    /// Sets the derived source name prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the event history size.
    #[must_use]
    pub const fn event_history(mut self, size: usize) -> Self {
        self.event_history = size;
        self
    }

    /// Parses a JSON document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] for malformed JSON or an empty
    /// default connection name.
    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ModelError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> ModelResult<()> {
        if self.default_connection.trim().is_empty() {
            return Err(ModelError::config("default_connection must not be empty"));
        }
        Ok(())
    }
}
