//! Schema facts about model classes.

use crate::error::{ModelError, ModelResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute list, primary key and identity column of one model class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Persistable attributes in storage order.
    pub attributes: Vec<String>,
    /// Primary-key attributes, possibly empty.
    pub primary_key: Vec<String>,
    /// Column filled by the store on insert.
    pub auto_increment: Option<String>,
}

impl ModelMetadata {
    /// Creates metadata from an attribute list.
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            primary_key: Vec::new(),
            auto_increment: None,
        }
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the auto-increment column.
    #[must_use]
    pub fn auto_increment(mut self, field: impl Into<String>) -> Self {
        self.auto_increment = Some(field.into());
        self
    }

    /// Attributes that are not part of the primary key.
    pub fn non_primary_key(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| !self.primary_key.contains(*a))
            .cloned()
            .collect()
    }

    /// Returns true if `field` is a persistable attribute.
    pub fn has_attribute(&self, field: &str) -> bool {
        self.attributes.iter().any(|a| a == field)
    }

    /// Checks that keys and identity column are attributes.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError::SchemaError`] naming the stray field.
    pub fn validate(&self, model: &'static str) -> ModelResult<()> {
        for field in self.primary_key.iter().chain(self.auto_increment.iter()) {
            if !self.has_attribute(field) {
                return Err(ModelError::schema(
                    model,
                    format!("`{field}` is not an attribute"),
                ));
            }
        }
        Ok(())
    }
}

/// Supplies schema facts for model classes.
pub trait MetadataProvider: Send + Sync {
    /// Returns the metadata of `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaError`] if the model is unknown.
    fn metadata(&self, model: &'static str) -> ModelResult<Arc<ModelMetadata>>;

    /// Persistable attributes of `model`, in order.
    ///
    /// # Errors
    ///
    /// See [`MetadataProvider::metadata`].
    fn attributes_of(&self, model: &'static str) -> ModelResult<Vec<String>> {
        Ok(self.metadata(model)?.attributes.clone())
    }

    /// Primary-key attributes of `model`.
    ///
    /// # Errors
    ///
    /// See [`MetadataProvider::metadata`].
    fn primary_key_of(&self, model: &'static str) -> ModelResult<Vec<String>> {
        Ok(self.metadata(model)?.primary_key.clone())
    }

    /// Auto-increment column of `model`, if any.
    ///
    /// # Errors
    ///
    /// See [`MetadataProvider::metadata`].
    fn auto_increment_of(&self, model: &'static str) -> ModelResult<Option<String>> {
        Ok(self.metadata(model)?.auto_increment.clone())
    }
}

/// Metadata provider backed by explicit registration.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    models: RwLock<HashMap<&'static str, Arc<ModelMetadata>>>,
}

impl MetadataRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers metadata for a model name, replacing earlier entries.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the metadata is inconsistent.
    pub fn register(&self, model: &'static str, metadata: ModelMetadata) -> ModelResult<()> {
        metadata.validate(model)?;
        self.models.write().insert(model, Arc::new(metadata));
        Ok(())
    }

    /// Registers metadata for the model type `M`.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the metadata is inconsistent.
    pub fn register_model<M: crate::Model>(&self, metadata: ModelMetadata) -> ModelResult<()> {
        self.register(M::NAME, metadata)
    }

    /// Returns true if `model` is registered.
    pub fn contains(&self, model: &str) -> bool {
        self.models.read().contains_key(model)
    }

    /// Returns the number of registered models.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn metadata(&self, model: &'static str) -> ModelResult<Arc<ModelMetadata>> {
        self.models
            .read()
            .get(model)
            .cloned()
            .ok_or_else(|| ModelError::schema(model, "no metadata registered"))
    }
}
