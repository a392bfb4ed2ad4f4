//! Per-operation connection and source routing.
//!
//! A model picks its logical connection and physical source for every
//! operation from a [`RouteContext`]: the entity itself for single-row
//! writes, or the bind set for bulk writes and reads. Models that keep
//! the default route use the configured default connection and a source
//! name derived from the class name.

use crate::config::OrmConfig;
use crate::error::{ModelError, ModelResult, RouteTarget};
use crate::model::Model;
use crate::value::{Row, Value};
use tracing::warn;

/// Outcome of a routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Route {
    /// Use the configured default.
    #[default]
    Default,
    /// Use this name.
    To(String),
    /// No shard serves this context.
    NoRoute,
}

impl Route {
    /// Routes to `name`.
    pub fn to(name: impl Into<String>) -> Self {
        Route::To(name.into())
    }
}

impl From<Option<String>> for Route {
    fn from(name: Option<String>) -> Self {
        name.map_or(Route::NoRoute, Route::To)
    }
}

/// What a routing decision may look at.
#[derive(Debug, Clone, Copy)]
pub enum RouteContext<'a> {
    /// No information (e.g. a raw filter expression).
    None,
    /// The field values of the entity being written.
    Entity(&'a Row),
    /// The bind values of a bulk operation or read.
    Binds(&'a Row),
}

impl<'a> RouteContext<'a> {
    /// Reads a candidate value, whatever the context kind.
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        match self {
            RouteContext::None => None,
            RouteContext::Entity(row) | RouteContext::Binds(row) => {
                row.get(field).filter(|v| v.is_set())
            }
        }
    }

    /// Returns the underlying values, if any.
    pub fn values(&self) -> Option<&'a Row> {
        match self {
            RouteContext::None => None,
            RouteContext::Entity(row) | RouteContext::Binds(row) => Some(row),
        }
    }
}

/// A resolved connection and source pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// Logical connection name.
    pub connection: String,
    /// Physical table or collection name.
    pub source: String,
}

/// Converts a class name to `snake_case`.
///
/// Path segments are dropped, so `"app::models::OrderItem"` becomes
/// `"order_item"`. Acronyms stay together: `"HTTPLog"` becomes `"http_log"`.
pub fn snake_case(name: &str) -> String {
    let simple = name.rsplit("::").next().unwrap_or(name);
    let chars: Vec<char> = simple.chars().collect();
    let mut out = String::with_capacity(simple.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolves the logical connection for `M`.
///
/// # Errors
///
/// Returns [`ModelError::ShardingFailed`] when the model answers
/// [`Route::NoRoute`].
pub fn resolve_connection<M: Model>(
    config: &OrmConfig,
    context: &RouteContext<'_>,
    operation: &'static str,
) -> ModelResult<String> {
    match M::connection(context) {
        Route::Default => Ok(config.default_connection.clone()),
        Route::To(name) => Ok(name),
        Route::NoRoute => Err(no_route::<M>(RouteTarget::Connection, operation)),
    }
}

/// Resolves the physical source for `M`.
///
/// # Errors
///
/// Returns [`ModelError::ShardingFailed`] when the model answers
/// [`Route::NoRoute`].
pub fn resolve_source<M: Model>(
    config: &OrmConfig,
    context: &RouteContext<'_>,
    operation: &'static str,
) -> ModelResult<String> {
    match M::source(context) {
        Route::Default => Ok(format!("{}{}", config.table_prefix, snake_case(M::NAME))),
        Route::To(name) => Ok(name),
        Route::NoRoute => Err(no_route::<M>(RouteTarget::Source, operation)),
    }
}

/// Resolves both halves of the route, connection first.
///
/// # Errors
///
/// Returns [`ModelError::ShardingFailed`] for whichever half has no route.
pub fn resolve<M: Model>(
    config: &OrmConfig,
    context: &RouteContext<'_>,
    operation: &'static str,
) -> ModelResult<Shard> {
    Ok(Shard {
        connection: resolve_connection::<M>(config, context, operation)?,
        source: resolve_source::<M>(config, context, operation)?,
    })
}

fn no_route<M: Model>(target: RouteTarget, operation: &'static str) -> ModelError {
    warn!(model = M::NAME, %target, operation, "no shard route");
    ModelError::ShardingFailed {
        model: M::NAME,
        target,
        operation,
    }
}
