//! The runtime context shared by entities and repositories.

use crate::config::OrmConfig;
use crate::connection::{Connection, ConnectionRegistry};
use crate::entity::Entity;
use crate::error::{ModelError, ModelResult};
use crate::events::EventBus;
use crate::metadata::{MetadataProvider, ModelMetadata};
use crate::model::Model;
use crate::repository::Repository;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Configuration, connections, schema facts and the event bus.
///
/// `Orm` is the explicit registry every entity and repository carries.
/// Cloning is cheap: all state sits behind one `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use rowmodel_core::{MetadataRegistry, ModelMetadata, Orm};
/// use std::sync::Arc;
///
/// let metadata = MetadataRegistry::new();
/// metadata.register_model::<Robot>(
///     ModelMetadata::new(["id", "name"]).primary_key(["id"]).auto_increment("id"),
/// )?;
///
/// let orm = Orm::builder()
///     .connection("db", Arc::new(connection))
///     .metadata(Arc::new(metadata))
///     .build()?;
///
/// let mut robot = orm.entity::<Robot>();
/// robot.set("name", "R2-D2")?;
/// robot.create()?;
/// ```
#[derive(Clone)]
pub struct Orm {
    inner: Arc<OrmInner>,
}

struct OrmInner {
    config: OrmConfig,
    connections: ConnectionRegistry,
    metadata: Arc<dyn MetadataProvider>,
    events: Arc<EventBus>,
}

impl Orm {
    /// Starts building a context.
    pub fn builder() -> OrmBuilder {
        OrmBuilder::default()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// Returns the event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Returns the metadata provider.
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.inner.metadata
    }

    /// Returns the registered connections.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.inner.connections
    }

    /// Looks up a connection by logical name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownConnection`] if it is not registered.
    pub fn connection(&self, name: &str) -> ModelResult<Arc<dyn Connection>> {
        self.inner.connections.get(name)
    }

    /// Schema facts of `M`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaError`] if `M` has no metadata.
    pub fn metadata_of<M: Model>(&self) -> ModelResult<Arc<ModelMetadata>> {
        self.inner.metadata.metadata(M::NAME)
    }

    /// The class-level facade of `M`.
    pub fn repository<M: Model>(&self) -> Repository<M> {
        Repository::new(self.clone())
    }

    /// A new, never persisted entity of `M`.
    pub fn entity<M: Model>(&self) -> Entity<M> {
        Entity::new(self)
    }
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orm")
            .field("config", &self.inner.config)
            .field("connections", &self.inner.connections.names())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Orm`].
#[derive(Default)]
pub struct OrmBuilder {
    config: OrmConfig,
    connections: ConnectionRegistry,
    metadata: Option<Arc<dyn MetadataProvider>>,
    events: Option<Arc<EventBus>>,
}

impl OrmBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a connection under a logical name.
    #[must_use]
    pub fn connection(mut self, name: impl Into<String>, connection: Arc<dyn Connection>) -> Self {
        self.connections.register(name, connection);
        self
    }

    /// Sets the metadata provider.
    #[must_use]
    pub fn metadata(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    /// Shares an existing event bus instead of creating one from the configuration.
    #[must_use]
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if no metadata provider was set.
    pub fn build(self) -> ModelResult<Orm> {
        let metadata = self
            .metadata
            .ok_or_else(|| ModelError::config("a metadata provider is required"))?;
        let events = self.events.unwrap_or_else(|| {
            Arc::new(EventBus::with_options(
                self.config.event_prefix.clone(),
                self.config.event_history,
            ))
        });
        debug!(
            default_connection = %self.config.default_connection,
            connections = ?self.connections.names(),
            "orm built"
        );
        Ok(Orm {
            inner: Arc::new(OrmInner {
                config: self.config,
                connections: self.connections,
                metadata,
                events,
            }),
        })
    }
}
