//! A connection that records every call.
//!
//! [`SpyConnection`] forwards to a [`MemoryConnection`] and keeps a log of
//! what it was asked to do, so tests can assert that an operation issued
//! exactly the statements it should (or none at all). Query results can be
//! replaced with canned rows to simulate stores that answer differently
//! from the memory connection, e.g. with aggregates as text.

use parking_lot::Mutex;
use rowmodel_core::query::{Predicate, QuerySpec};
use rowmodel_core::{Connection, ConnectionError, ConnectionResult, Row, Value};
use rowmodel_memory::MemoryConnection;
use std::collections::VecDeque;
use tracing::trace;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// An insert.
    Insert {
        /// Physical source.
        source: String,
        /// Inserted values.
        values: Row,
    },
    /// A bulk update.
    Update {
        /// Physical source.
        source: String,
        /// Written values.
        values: Row,
        /// Row filter.
        predicate: Predicate,
    },
    /// A bulk delete.
    Delete {
        /// Physical source.
        source: String,
        /// Row filter.
        predicate: Predicate,
    },
    /// A read.
    Query(QuerySpec),
}

impl Call {
    /// The physical source the call addressed.
    pub fn source(&self) -> &str {
        match self {
            Call::Insert { source, .. } | Call::Update { source, .. } | Call::Delete { source, .. } => {
                source
            }
            Call::Query(spec) => &spec.source,
        }
    }
}

/// Call-recording wrapper around a [`MemoryConnection`].
#[derive(Debug, Default)]
pub struct SpyConnection {
    inner: MemoryConnection,
    calls: Mutex<Vec<Call>>,
    canned: Mutex<VecDeque<Vec<Row>>>,
    failure: Mutex<Option<String>>,
}

impl SpyConnection {
    /// Wraps a memory connection.
    pub fn new(inner: MemoryConnection) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The wrapped memory connection.
    pub fn memory(&self) -> &MemoryConnection {
        &self.inner
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    /// Total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of inserts.
    pub fn inserts(&self) -> usize {
        self.count(|c| matches!(c, Call::Insert { .. }))
    }

    /// Number of bulk updates.
    pub fn updates(&self) -> usize {
        self.count(|c| matches!(c, Call::Update { .. }))
    }

    /// Number of bulk deletes.
    pub fn deletes(&self) -> usize {
        self.count(|c| matches!(c, Call::Delete { .. }))
    }

    /// Number of reads.
    pub fn queries(&self) -> usize {
        self.count(|c| matches!(c, Call::Query(_)))
    }

    /// The most recent call.
    pub fn last_call(&self) -> Option<Call> {
        self.calls.lock().last().cloned()
    }

    /// Answers the next read with `rows` instead of asking the memory connection.
    pub fn push_query_result(&self, rows: Vec<Row>) {
        self.canned.lock().push_back(rows);
    }

    /// Makes every following call fail with a driver error until cleared.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Stops failing.
    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) -> ConnectionResult<()> {
        trace!(source = call.source(), "spy call");
        self.calls.lock().push(call);
        match self.failure.lock().as_ref() {
            Some(message) => Err(ConnectionError::driver(message.clone())),
            None => Ok(()),
        }
    }
}

impl Connection for SpyConnection {
    fn insert(&self, source: &str, values: &Row) -> ConnectionResult<Value> {
        self.record(Call::Insert {
            source: source.to_string(),
            values: values.clone(),
        })?;
        self.inner.insert(source, values)
    }

    fn update(&self, source: &str, values: &Row, predicate: &Predicate) -> ConnectionResult<u64> {
        self.record(Call::Update {
            source: source.to_string(),
            values: values.clone(),
            predicate: predicate.clone(),
        })?;
        self.inner.update(source, values, predicate)
    }

    fn delete(&self, source: &str, predicate: &Predicate) -> ConnectionResult<u64> {
        self.record(Call::Delete {
            source: source.to_string(),
            predicate: predicate.clone(),
        })?;
        self.inner.delete(source, predicate)
    }

    fn query(&self, spec: &QuerySpec) -> ConnectionResult<Vec<Row>> {
        self.record(Call::Query(spec.clone()))?;
        if let Some(rows) = self.canned.lock().pop_front() {
            return Ok(rows);
        }
        self.inner.query(spec)
    }
}
