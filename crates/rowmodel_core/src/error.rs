//! Error types for rowmodel core.

use crate::connection::ConnectionError;
use crate::events::Stage;
use std::fmt;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Which half of a shard route failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// The logical connection name.
    Connection,
    /// The physical table or collection name.
    Source,
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Connection => write!(f, "connection"),
            RouteTarget::Source => write!(f, "source"),
        }
    }
}

/// Errors that can occur in model operations.
///
/// Everything except [`ModelError::Storage`] is raised locally and
/// deterministically before any statement reaches a connection.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Required data is missing.
    #[error("`{model}` validation failed: {message}")]
    ValidationFailed {
        /// The model name.
        model: &'static str,
        /// What was missing.
        message: String,
    },

    /// Connection or source resolution returned no route.
    #[error("`{model}` {target} sharding for {operation} failed")]
    ShardingFailed {
        /// The model name.
        model: &'static str,
        /// Which name could not be resolved.
        target: RouteTarget,
        /// The operation that needed the route.
        operation: &'static str,
    },

    /// A hook or event subscriber vetoed the operation.
    #[error("`{model}` operation cancelled at {stage}")]
    LifecycleCancelled {
        /// The model name.
        model: &'static str,
        /// The stage that cancelled.
        stage: Stage,
    },

    /// The model's schema does not support the operation.
    #[error("`{model}` schema error: {message}")]
    SchemaError {
        /// The model name.
        model: &'static str,
        /// Description of the unmet requirement.
        message: String,
    },

    /// An argument has the wrong shape.
    #[error("`{model}` invalid argument: {message}")]
    InvalidArgument {
        /// The model name.
        model: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// A field that is neither an attribute nor a transient field.
    #[error("`{model}` has no field `{field}`")]
    UnknownField {
        /// The model name.
        model: &'static str,
        /// The offending field name.
        field: String,
    },

    /// A route named a connection that is not registered.
    #[error("connection `{name}` is not registered")]
    UnknownConnection {
        /// The logical connection name.
        name: String,
    },

    /// The connection failed.
    #[error("`{model}` storage failure: {source}")]
    Storage {
        /// The model name.
        model: &'static str,
        /// The underlying connection error.
        #[source]
        source: ConnectionError,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl ModelError {
    /// Creates a validation error.
    pub fn validation(model: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            model,
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(model: &'static str, message: impl Into<String>) -> Self {
        Self::SchemaError {
            model,
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(model: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            model,
            message: message.into(),
        }
    }

    /// Wraps a connection error with the model it happened on.
    pub fn storage(model: &'static str, source: ConnectionError) -> Self {
        Self::Storage { model, source }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true for failures reported by the connection.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Returns true for errors raised by this layer without touching storage.
    ///
    /// Retrying a local error without changing the input gives the same result.
    pub fn is_local(&self) -> bool {
        !self.is_storage()
    }

    /// Returns the stage for a cancelled operation.
    pub fn cancelled_stage(&self) -> Option<Stage> {
        match self {
            Self::LifecycleCancelled { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
