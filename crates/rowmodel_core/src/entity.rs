//! The active record.
//!
//! An [`Entity`] owns the current field values of one row and the snapshot
//! of its last known persisted state. Writes go through the lifecycle
//! protocol:
//!
//! ```text
//! create:  beforeSave -> beforeCreate -> insert -> afterCreate -> afterSave
//! update:  beforeSave -> beforeUpdate -> update -> afterUpdate -> afterSave
//! delete:  beforeDelete -> delete -> afterDelete
//! ```
//!
//! Each stage first runs the model's hook, then publishes to the
//! [`EventBus`](crate::EventBus). A `before*` stage vetoed by either aborts
//! the operation with [`ModelError::LifecycleCancelled`] and nothing is
//! written.

use crate::error::{ModelError, ModelResult};
use crate::events::{Flow, ModelEvent, Stage};
use crate::metadata::ModelMetadata;
use crate::model::Model;
use crate::orm::Orm;
use crate::query::{Conditions, Params};
use crate::repository::whitelisted;
use crate::sharding::{self, RouteContext, Shard};
use crate::snapshot;
use crate::value::{Row, Value};
use serde::ser::{Error as _, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

static NULL: Value = Value::Null;

/// One row of model `M`.
pub struct Entity<M: Model> {
    orm: Orm,
    fields: Row,
    snapshot: Option<Row>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Entity<M> {
    /// Creates an empty entity that has never been persisted.
    pub fn new(orm: &Orm) -> Self {
        Self {
            orm: orm.clone(),
            fields: Row::new(),
            snapshot: None,
            _model: PhantomData,
        }
    }

    /// Creates an entity from a storage row and runs [`Model::after_fetch`].
    ///
    /// The row becomes both the current state and the snapshot.
    pub fn hydrate(orm: &Orm, row: Row) -> Self {
        let mut entity = Self {
            orm: orm.clone(),
            snapshot: Some(row.clone()),
            fields: row,
            _model: PhantomData,
        };
        M::after_fetch(&mut entity);
        entity
    }

    /// Returns the runtime context.
    pub fn orm(&self) -> &Orm {
        &self.orm
    }

    /// Current values of the fields that have been set or loaded.
    pub fn fields(&self) -> &Row {
        &self.fields
    }

    /// Current value of `field`, [`Value::Null`] if absent.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Sets a declared field.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] if `field` is neither an
    /// attribute nor a transient field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<()> {
        let meta = self.metadata()?;
        if !is_declared::<M>(&meta, field) {
            return Err(ModelError::UnknownField {
                model: M::NAME,
                field: field.to_string(),
            });
        }
        self.fields.insert(field.to_string(), value.into());
        Ok(())
    }

    /// Builder form of [`Entity::set`].
    ///
    /// # Errors
    ///
    /// See [`Entity::set`].
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> ModelResult<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Attributes followed by transient fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaError`] if `M` has no metadata.
    pub fn declared_fields(&self) -> ModelResult<Vec<String>> {
        let meta = self.metadata()?;
        let mut declared = meta.attributes.clone();
        declared.extend(
            M::transient_fields()
                .iter()
                .filter(|f| !meta.has_attribute(f))
                .map(|f| (*f).to_string()),
        );
        Ok(declared)
    }

    /// Copies values from `data` onto declared fields.
    ///
    /// Null values are skipped, and so are fields outside `whitelist` when
    /// one is given. Returns the keys of `data` that are not declared
    /// fields; those are never assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaError`] if `M` has no metadata.
    pub fn assign(&mut self, data: &Row, whitelist: Option<&[&str]>) -> ModelResult<Vec<String>> {
        let declared = self.declared_fields()?;
        let accepted = whitelisted(declared.iter().map(String::as_str), data, whitelist);
        let rejected = data
            .keys()
            .filter(|key| !declared.contains(*key))
            .cloned()
            .collect();
        self.fields.extend(accepted);
        Ok(rejected)
    }

    /// Every declared field's current value, [`Value::Null`] when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaError`] if `M` has no metadata.
    pub fn to_array(&self) -> ModelResult<Row> {
        Ok(self.view(self.declared_fields()?.iter()))
    }

    /// The entity as a JSON object.
    ///
    /// # Errors
    ///
    /// See [`Entity::to_array`].
    pub fn to_json(&self) -> ModelResult<serde_json::Value> {
        let array = self.to_array()?;
        serde_json::to_value(array)
            .map_err(|e| ModelError::invalid_argument(M::NAME, format!("cannot serialize: {e}")))
    }

    /// Last known persisted state, `None` for a new entity.
    pub fn snapshot(&self) -> Option<&Row> {
        self.snapshot.as_ref()
    }

    /// Attributes whose value differs from the snapshot, in attribute order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaError`] if `M` has no metadata.
    pub fn changed_fields(&self) -> ModelResult<Vec<String>> {
        let meta = self.metadata()?;
        Ok(snapshot::diff(&meta.attributes, &self.fields, self.snapshot()))
    }

    /// Returns true if `field` differs from the snapshot.
    pub fn has_changed(&self, field: &str) -> bool {
        snapshot::field_changed(field, &self.fields, self.snapshot())
    }

    /// Returns true if any of `fields` differs from the snapshot.
    pub fn has_any_changed<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        snapshot::any_changed(fields, &self.fields, self.snapshot())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Returns true if this entity's row exists in storage.
    ///
    /// Models without a primary key never exist, nor does an entity with an
    /// unset key field. When every key field still equals its snapshot value
    /// the answer is true without a query.
    ///
    /// # Errors
    ///
    /// Fails on routing or storage failure.
    pub fn exists(&self) -> ModelResult<bool> {
        let meta = self.metadata()?;
        if meta.primary_key.is_empty() {
            return Ok(false);
        }
        let Some(conditions) = self.key_conditions(&meta) else {
            return Ok(false);
        };
        if snapshot::keys_match(&meta.primary_key, &self.fields, self.snapshot()) {
            return Ok(true);
        }
        self.orm
            .repository::<M>()
            .exists_in(&RouteContext::Entity(&self.fields), &Params::from(conditions))
    }

    /// Updates the row if it exists, otherwise inserts it.
    ///
    /// # Errors
    ///
    /// See [`Entity::create`] and [`Entity::update`].
    pub fn save(&mut self) -> ModelResult<()> {
        if self.exists()? {
            self.update()
        } else {
            self.create()
        }
    }

    /// Inserts the set attributes as a new row.
    ///
    /// If the model has an auto-increment column, it receives the identity
    /// returned by the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ValidationFailed`] when no attribute is set,
    /// [`ModelError::ShardingFailed`], [`ModelError::LifecycleCancelled`],
    /// or a storage failure.
    pub fn create(&mut self) -> ModelResult<()> {
        let meta = self.metadata()?;
        if self.insert_values(&meta).is_empty() {
            return Err(ModelError::validation(M::NAME, "unable to insert without data"));
        }
        let shard = self.resolve("create")?;

        self.fire_event_cancel(Stage::BeforeSave, M::before_save)?;
        self.fire_event_cancel(Stage::BeforeCreate, M::before_create)?;

        let values = self.insert_values(&meta);
        if values.is_empty() {
            return Err(ModelError::validation(M::NAME, "unable to insert without data"));
        }
        let connection = self.orm.connection(&shard.connection)?;
        let id = connection
            .insert(&shard.source, &values)
            .map_err(|e| ModelError::storage(M::NAME, e))?;
        debug!(
            model = M::NAME,
            connection = %shard.connection,
            source = %shard.source,
            id = %id,
            "row inserted"
        );

        if let Some(field) = &meta.auto_increment {
            if id.is_set() {
                self.fields.insert(field.clone(), id);
            }
        }
        self.refresh_snapshot(&meta);

        self.fire_event(Stage::AfterCreate, M::after_create);
        self.fire_event(Stage::AfterSave, M::after_save);
        Ok(())
    }

    /// Writes changed, set, non-key attributes to the existing row.
    ///
    /// Does nothing, and fires no events, when nothing changed. When the
    /// `before*` hooks revert every change, nothing is written and the
    /// `after*` stages do not run.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ValidationFailed`] when the model has no
    /// primary key or a key field is unset, [`ModelError::ShardingFailed`],
    /// [`ModelError::LifecycleCancelled`], or a storage failure.
    pub fn update(&mut self) -> ModelResult<()> {
        let meta = self.metadata()?;
        if meta.primary_key.is_empty() {
            return Err(ModelError::validation(
                M::NAME,
                "a primary key is required to update",
            ));
        }
        let Some(conditions) = self.key_conditions(&meta) else {
            return Err(ModelError::validation(
                M::NAME,
                "cannot update because some primary key value is not provided",
            ));
        };
        if self.update_delta(&meta).is_empty() {
            debug!(model = M::NAME, "nothing changed, update skipped");
            return Ok(());
        }
        let shard = self.resolve("update")?;

        self.fire_event_cancel(Stage::BeforeSave, M::before_save)?;
        self.fire_event_cancel(Stage::BeforeUpdate, M::before_update)?;

        let delta = self.update_delta(&meta);
        if delta.is_empty() {
            debug!(model = M::NAME, "hooks reverted every change, update skipped");
            return Ok(());
        }
        self.orm
            .repository::<M>()
            .update_on(&shard, &delta, &conditions)?;
        self.refresh_snapshot(&meta);

        self.fire_event(Stage::AfterUpdate, M::after_update);
        self.fire_event(Stage::AfterSave, M::after_save);
        Ok(())
    }

    /// Deletes the row addressed by the primary key.
    ///
    /// Returns the number of affected rows as reported by the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ValidationFailed`] when the model has no
    /// primary key or a key field is unset, [`ModelError::ShardingFailed`],
    /// [`ModelError::LifecycleCancelled`], or a storage failure.
    pub fn delete(&mut self) -> ModelResult<u64> {
        let meta = self.metadata()?;
        if meta.primary_key.is_empty() {
            return Err(ModelError::validation(
                M::NAME,
                "a primary key is required to delete",
            ));
        }
        let Some(conditions) = self.key_conditions(&meta) else {
            return Err(ModelError::validation(
                M::NAME,
                "cannot delete because some primary key value is not set",
            ));
        };
        let shard = self.resolve("delete")?;

        self.fire_event_cancel(Stage::BeforeDelete, M::before_delete)?;

        let affected = self.orm.repository::<M>().delete_on(&shard, &conditions)?;

        self.fire_event(Stage::AfterDelete, M::after_delete);
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn metadata(&self) -> ModelResult<Arc<ModelMetadata>> {
        self.orm.metadata_of::<M>()
    }

    fn resolve(&self, operation: &'static str) -> ModelResult<Shard> {
        sharding::resolve::<M>(self.orm.config(), &RouteContext::Entity(&self.fields), operation)
    }

    fn view<'a, I>(&self, names: I) -> Row
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .map(|name| (name.clone(), self.get(name).clone()))
            .collect()
    }

    fn insert_values(&self, meta: &ModelMetadata) -> Row {
        meta.attributes
            .iter()
            .filter_map(|field| {
                self.fields
                    .get(field)
                    .filter(|v| v.is_set())
                    .map(|v| (field.clone(), v.clone()))
            })
            .collect()
    }

    fn update_delta(&self, meta: &ModelMetadata) -> Row {
        snapshot::update_delta(
            &meta.attributes,
            &meta.primary_key,
            &self.fields,
            self.snapshot(),
        )
    }

    /// Equality conditions on every key field, `None` if one is unset.
    fn key_conditions(&self, meta: &ModelMetadata) -> Option<Conditions> {
        let mut conditions = Conditions::new();
        for field in &meta.primary_key {
            let value = self.fields.get(field).filter(|v| v.is_set())?;
            conditions = conditions.eq(field.clone(), value.clone());
        }
        Some(conditions)
    }

    fn refresh_snapshot(&mut self, meta: &ModelMetadata) {
        self.snapshot = Some(self.view(meta.attributes.iter()));
    }

    fn publish(&self, stage: Stage) -> Option<Flow> {
        self.orm.events().publish(&ModelEvent {
            model: M::NAME,
            stage,
            fields: &self.fields,
        })
    }

    fn fire_event(&mut self, stage: Stage, hook: fn(&mut Self)) {
        hook(self);
        self.publish(stage);
    }

    fn fire_event_cancel(&mut self, stage: Stage, hook: fn(&mut Self) -> Flow) -> ModelResult<()> {
        let cancelled = hook(self).is_cancel()
            || self.publish(stage).is_some_and(Flow::is_cancel);
        if cancelled {
            debug!(model = M::NAME, %stage, "operation cancelled");
            return Err(ModelError::LifecycleCancelled {
                model: M::NAME,
                stage,
            });
        }
        Ok(())
    }
}

fn is_declared<M: Model>(meta: &ModelMetadata, field: &str) -> bool {
    meta.has_attribute(field) || M::transient_fields().iter().any(|f| *f == field)
}

impl<M: Model> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Self {
            orm: self.orm.clone(),
            fields: self.fields.clone(),
            snapshot: self.snapshot.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &M::NAME)
            .field("fields", &self.fields)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl<M: Model> Serialize for Entity<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}
