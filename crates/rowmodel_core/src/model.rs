//! The per-class capability interface.
//!
//! A model class is a zero-sized type implementing [`Model`]. Everything
//! the persistence layer needs to know about a class that is not schema
//! (which the [`MetadataProvider`](crate::MetadataProvider) supplies) lives
//! here: its name, its shard routing and its lifecycle hooks. Every method
//! has a default, so the smallest model is two lines.
//!
//! # Example
//!
//! ```
//! use rowmodel_core::{Entity, Flow, Model, Route, RouteContext, Value};
//!
//! struct Order;
//!
//! impl Model for Order {
//!     const NAME: &'static str = "Order";
//!
//!     fn source(context: &RouteContext<'_>) -> Route {
//!         match context.get("tenant").and_then(Value::as_integer) {
//!             Some(tenant) => Route::to(format!("orders_{tenant}")),
//!             None => Route::NoRoute,
//!         }
//!     }
//!
//!     fn before_create(entity: &mut Entity<Self>) -> Flow {
//!         if entity.get("total").is_null() {
//!             Flow::Cancel
//!         } else {
//!             Flow::Continue
//!         }
//!     }
//! }
//! ```

use crate::entity::Entity;
use crate::events::Flow;
use crate::sharding::{Route, RouteContext};

/// A model class.
///
/// Hooks run synchronously on the calling thread, before the event bus is
/// notified for the same stage. The `before_*` hooks may veto the operation
/// by returning [`Flow::Cancel`]; the `after_*` hooks cannot.
pub trait Model: Sized + Send + Sync + 'static {
    /// Class simple name, e.g. `"OrderItem"`. Also the metadata key.
    const NAME: &'static str;

    /// Picks the logical connection for an operation.
    fn connection(_context: &RouteContext<'_>) -> Route {
        Route::Default
    }

    /// Picks the physical source for an operation.
    fn source(_context: &RouteContext<'_>) -> Route {
        Route::Default
    }

    /// Declared fields that are never persisted.
    fn transient_fields() -> &'static [&'static str] {
        &[]
    }

    /// Runs before every create and update.
    fn before_save(_entity: &mut Entity<Self>) -> Flow {
        Flow::Continue
    }

    /// Runs before an insert, after [`Model::before_save`].
    fn before_create(_entity: &mut Entity<Self>) -> Flow {
        Flow::Continue
    }

    /// Runs before an update, after [`Model::before_save`].
    fn before_update(_entity: &mut Entity<Self>) -> Flow {
        Flow::Continue
    }

    /// Runs before a delete.
    fn before_delete(_entity: &mut Entity<Self>) -> Flow {
        Flow::Continue
    }

    /// Runs after a successful insert.
    fn after_create(_entity: &mut Entity<Self>) {}

    /// Runs after a successful update.
    fn after_update(_entity: &mut Entity<Self>) {}

    /// Runs after a successful create or update.
    fn after_save(_entity: &mut Entity<Self>) {}

    /// Runs after a successful delete.
    fn after_delete(_entity: &mut Entity<Self>) {}

    /// Runs once per entity hydrated from a storage row.
    fn after_fetch(_entity: &mut Entity<Self>) {}
}
