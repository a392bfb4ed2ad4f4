//! Connection contract and registry.
//!
//! A [`Connection`] is the narrow, blocking interface this crate drives.
//! It owns transport, dialect and transactions; rowmodel only hands it
//! physical source names, field-value sets, predicates and query specs.

use crate::error::{ModelError, ModelResult};
use crate::query::{Predicate, QuerySpec};
use crate::value::{Row, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for connection calls.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors reported by a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Driver or transport failure.
    #[error("driver error: {0}")]
    Driver(String),

    /// The store rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The connection cannot execute this request.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Any other error from the underlying driver.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ConnectionError {
    /// Creates a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    /// Creates an unsupported request error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

/// A blocking connection to a backing store.
///
/// # Invariants
///
/// - Values only ever travel as binds, never inside predicate text
/// - `insert` returns the store's last inserted identity, or `Value::Null`
/// - `update` and `delete` return the number of affected rows
/// - Implementations must be `Send + Sync`; the core issues one call at a time
///   per entity operation and never retries
pub trait Connection: Send + Sync {
    /// Inserts one row into `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the row.
    fn insert(&self, source: &str, values: &Row) -> ConnectionResult<Value>;

    /// Updates every row of `source` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn update(&self, source: &str, values: &Row, predicate: &Predicate) -> ConnectionResult<u64>;

    /// Deletes every row of `source` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn delete(&self, source: &str, predicate: &Predicate) -> ConnectionResult<u64>;

    /// Runs a read and returns fully materialized rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, spec: &QuerySpec) -> ConnectionResult<Vec<Row>>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn insert(&self, source: &str, values: &Row) -> ConnectionResult<Value> {
        (**self).insert(source, values)
    }

    fn update(&self, source: &str, values: &Row, predicate: &Predicate) -> ConnectionResult<u64> {
        (**self).update(source, values, predicate)
    }

    fn delete(&self, source: &str, predicate: &Predicate) -> ConnectionResult<u64> {
        (**self).delete(source, predicate)
    }

    fn query(&self, spec: &QuerySpec) -> ConnectionResult<Vec<Row>> {
        (**self).query(spec)
    }
}

/// Logical connection names mapped to live connections.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Arc<dyn Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, connection: Arc<dyn Connection>) {
        self.connections.insert(name.into(), connection);
    }

    /// Looks up a connection by logical name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownConnection`] if nothing is registered.
    pub fn get(&self, name: &str) -> ModelResult<Arc<dyn Connection>> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownConnection {
                name: name.to_string(),
            })
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullConnection;

    impl Connection for NullConnection {
        fn insert(&self, _source: &str, _values: &Row) -> ConnectionResult<Value> {
            Ok(Value::Null)
        }

        fn update(&self, _: &str, _: &Row, _: &Predicate) -> ConnectionResult<u64> {
            Ok(0)
        }

        fn delete(&self, _: &str, _: &Predicate) -> ConnectionResult<u64> {
            Ok(0)
        }

        fn query(&self, _: &QuerySpec) -> ConnectionResult<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn registry_lookup() {
        let mut registry = ConnectionRegistry::new();
        registry.register("db", Arc::new(NullConnection));
        registry.register("archive", Arc::new(NullConnection));

        assert!(registry.contains("db"));
        assert_eq!(registry.names(), vec!["archive", "db"]);
        assert!(registry.get("db").is_ok());
    }

    #[test]
    fn unknown_connection() {
        let registry = ConnectionRegistry::new();
        let err = registry.get("missing").err().unwrap();
        assert!(matches!(err, ModelError::UnknownConnection { ref name } if name == "missing"));
    }
}
