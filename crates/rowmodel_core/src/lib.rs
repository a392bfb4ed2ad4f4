//! # rowmodel core
//!
//! Active-record persistence layer.
//!
//! This crate provides:
//! - [`Entity`]: one row with change tracking against its last persisted
//!   snapshot, and create/update/save/delete with a cancellable lifecycle
//! - [`Repository`]: class-level finders, aggregates and bulk writes
//! - Per-operation shard routing through the [`Model`] trait
//! - A connection-agnostic query specification ([`query`])
//! - The [`Connection`] and [`MetadataProvider`] contracts consumed by the core
//!
//! Everything is synchronous. A [`Connection`] is the only place where
//! I/O happens.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod entity;
mod error;
mod events;
mod metadata;
mod model;
mod orm;
mod repository;
mod sharding;
mod value;

pub mod query;
pub mod snapshot;

pub use config::{OrmConfig, DEFAULT_CONNECTION};
pub use connection::{Connection, ConnectionError, ConnectionRegistry, ConnectionResult};
pub use entity::Entity;
pub use error::{ModelError, ModelResult, RouteTarget};
pub use events::{EventBus, EventRecord, Flow, ModelEvent, Stage, SubscriptionId, DEFAULT_EVENT_PREFIX};
pub use metadata::{MetadataProvider, MetadataRegistry, ModelMetadata};
pub use model::Model;
pub use orm::{Orm, OrmBuilder};
pub use repository::Repository;
pub use sharding::{resolve, resolve_connection, resolve_source, snake_case, Route, RouteContext, Shard};
pub use value::{Row, Value};
