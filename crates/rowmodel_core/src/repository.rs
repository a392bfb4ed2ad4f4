//! Class-level finders, aggregates and bulk writes.
//!
//! A [`Repository`] is the static side of a model class: it reads rows into
//! hydrated [`Entity`] values, computes one-row aggregates, and runs bulk
//! updates and deletes addressed by [`Conditions`]. Reads route through the
//! shard resolver with the equality binds of the parameters as context;
//! bulk writes route with the field values and condition binds.

use crate::connection::{Connection, ConnectionError};
use crate::entity::Entity;
use crate::error::{ModelError, ModelResult};
use crate::metadata::ModelMetadata;
use crate::model::Model;
use crate::orm::Orm;
use crate::query::{Aggregate, AggregateFn, Conditions, Criteria, Lookup, Params, QuerySpec};
use crate::sharding::{self, RouteContext, Shard};
use crate::value::{Row, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};

/// Class-level operations of model `M`.
///
/// Obtained from [`Orm::repository`].
pub struct Repository<M: Model> {
    orm: Orm,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self::new(self.orm.clone())
    }
}

impl<M: Model> fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository").field("model", &M::NAME).finish()
    }
}

impl<M: Model> Repository<M> {
    pub(crate) fn new(orm: Orm) -> Self {
        Self {
            orm,
            _model: PhantomData,
        }
    }

    /// Returns the runtime context.
    pub fn orm(&self) -> &Orm {
        &self.orm
    }

    /// Resolves the shard for a bind set without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShardingFailed`] if either half has no route.
    pub fn shard_for(&self, binds: &Row, operation: &'static str) -> ModelResult<Shard> {
        sharding::resolve::<M>(self.orm.config(), &RouteContext::Binds(binds), operation)
    }

    // ------------------------------------------------------------------
    // Finders
    // ------------------------------------------------------------------

    /// Reads every matching row as a hydrated entity.
    ///
    /// Selects all attributes unless the parameters name columns.
    ///
    /// # Errors
    ///
    /// Fails on missing metadata, routing failure or storage failure.
    pub fn find(&self, params: impl Into<Params>) -> ModelResult<Vec<Entity<M>>> {
        self.select(&params.into(), "find")
    }

    /// Alias of [`Repository::find`].
    ///
    /// # Errors
    ///
    /// See [`Repository::find`].
    pub fn find_all(&self, params: impl Into<Params>) -> ModelResult<Vec<Entity<M>>> {
        self.find(params)
    }

    /// Reads the first matching row.
    ///
    /// A [`Lookup::Key`] is a primary-key lookup, see [`Repository::find_by_id`].
    /// Returns `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// See [`Repository::find`].
    pub fn find_first(&self, lookup: impl Into<Lookup>) -> ModelResult<Option<Entity<M>>> {
        match lookup.into() {
            Lookup::Key(id) => self.find_by_id(id, None),
            Lookup::Params(params) => {
                let params = params.limit(1);
                Ok(self.select(&params, "findFirst")?.into_iter().next())
            }
        }
    }

    /// Reads the row whose sole primary key equals `id`.
    ///
    /// `fields` restricts the selected columns.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] if `id` is not a scalar and
    /// [`ModelError::SchemaError`] unless the model has exactly one
    /// primary-key field.
    pub fn find_by_id(
        &self,
        id: impl Into<Value>,
        fields: Option<&[&str]>,
    ) -> ModelResult<Option<Entity<M>>> {
        let id = scalar_id::<M>(id.into())?;
        let meta = self.metadata()?;
        let key = sole_primary_key::<M>(&meta)?;

        let mut params = Params::new().where_eq(key, id).limit(1);
        if let Some(fields) = fields {
            params = params.columns(fields.iter().copied());
        }
        Ok(self.select(&params, "findById")?.into_iter().next())
    }

    /// Returns true if any row matches.
    ///
    /// # Errors
    ///
    /// A [`Lookup::Key`] fails with [`ModelError::SchemaError`] unless the
    /// model has exactly one primary-key field, and with
    /// [`ModelError::InvalidArgument`] if the key is not a scalar.
    pub fn exists(&self, lookup: impl Into<Lookup>) -> ModelResult<bool> {
        let params = match lookup.into() {
            Lookup::Key(id) => {
                let meta = self.metadata()?;
                let key = sole_primary_key::<M>(&meta)?;
                Params::new().where_eq(key, scalar_id::<M>(id)?)
            }
            Lookup::Params(params) => params,
        };
        let binds = params.route_binds();
        self.exists_in(&RouteContext::Binds(&binds), &params)
    }

    pub(crate) fn exists_in(&self, context: &RouteContext<'_>, params: &Params) -> ModelResult<bool> {
        let meta = self.metadata()?;
        let (shard, connection) = self.route(context, "exists")?;
        let columns = if meta.primary_key.is_empty() {
            &meta.attributes
        } else {
            &meta.primary_key
        };
        let spec = self
            .restrict(params, &meta, Criteria::new(shard.source))?
            .select(columns.iter().cloned())
            .limit(1)
            .build();
        Ok(!self.run(connection.as_ref(), &spec)?.is_empty())
    }

    fn select(&self, params: &Params, operation: &'static str) -> ModelResult<Vec<Entity<M>>> {
        let meta = self.metadata()?;
        let binds = params.route_binds();
        let (shard, connection) = self.route(&RouteContext::Binds(&binds), operation)?;

        let columns = params
            .requested_columns()
            .map_or_else(|| meta.attributes.clone(), <[String]>::to_vec);
        let criteria = self
            .restrict(params, &meta, Criteria::new(shard.source))?
            .select(columns);

        let rows = self.run(connection.as_ref(), &criteria.build())?;
        Ok(rows
            .into_iter()
            .map(|row| Entity::hydrate(&self.orm, row))
            .collect())
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Counts matching rows, or the non-null values of `field`.
    ///
    /// # Errors
    ///
    /// Fails on routing or storage failure, or if the store answers with a
    /// non-numeric count.
    pub fn count(&self, params: impl Into<Params>, field: Option<&str>) -> ModelResult<i64> {
        let value = self.aggregate(AggregateFn::Count, field.unwrap_or("*"), params.into())?;
        if value.is_null() {
            return Ok(0);
        }
        value.to_i64().ok_or_else(|| non_numeric::<M>("COUNT", &value))
    }

    /// Sum of `field` over matching rows, [`Value::Null`] for no rows.
    ///
    /// # Errors
    ///
    /// Fails on routing or storage failure.
    pub fn sum(&self, field: &str, params: impl Into<Params>) -> ModelResult<Value> {
        self.aggregate(AggregateFn::Sum, field, params.into())
    }

    /// Largest value of `field` over matching rows.
    ///
    /// # Errors
    ///
    /// Fails on routing or storage failure.
    pub fn max(&self, field: &str, params: impl Into<Params>) -> ModelResult<Value> {
        self.aggregate(AggregateFn::Max, field, params.into())
    }

    /// Smallest value of `field` over matching rows.
    ///
    /// # Errors
    ///
    /// Fails on routing or storage failure.
    pub fn min(&self, field: &str, params: impl Into<Params>) -> ModelResult<Value> {
        self.aggregate(AggregateFn::Min, field, params.into())
    }

    /// Mean of `field` over matching rows, `None` for no rows.
    ///
    /// # Errors
    ///
    /// Fails on routing or storage failure, or if the store answers with a
    /// non-numeric average.
    pub fn avg(&self, field: &str, params: impl Into<Params>) -> ModelResult<Option<f64>> {
        let value = self.aggregate(AggregateFn::Avg, field, params.into())?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .to_f64()
            .map(Some)
            .ok_or_else(|| non_numeric::<M>("AVG", &value))
    }

    fn aggregate(&self, function: AggregateFn, field: &str, params: Params) -> ModelResult<Value> {
        let meta = self.metadata()?;
        let binds = params.route_binds();
        let (shard, connection) = self.route(&RouteContext::Binds(&binds), function.as_str())?;
        let aggregate = Aggregate::new(function, field, alias(function));
        let alias = aggregate.alias.clone();
        let spec = self
            .restrict(&params, &meta, Criteria::new(shard.source))?
            .aggregate(aggregate)
            .build();

        let rows = self.run(connection.as_ref(), &spec)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(&alias))
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Bulk writes
    // ------------------------------------------------------------------

    /// Writes `values` into every row matching `conditions`.
    ///
    /// Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ValidationFailed`] for empty `values`,
    /// [`ModelError::InvalidArgument`] for empty `conditions`, and routing
    /// or storage failures.
    pub fn update_all(&self, values: &Row, conditions: &Conditions) -> ModelResult<u64> {
        check_bulk::<M>(Some(values), conditions)?;
        let context = bulk_context(values, conditions);
        let shard = sharding::resolve::<M>(
            self.orm.config(),
            &RouteContext::Binds(&context),
            "updateAll",
        )?;
        self.update_on(&shard, values, conditions)
    }

    /// Deletes every row matching `conditions`.
    ///
    /// Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] for empty `conditions`, and
    /// routing or storage failures.
    pub fn delete_all(&self, conditions: &Conditions) -> ModelResult<u64> {
        check_bulk::<M>(None, conditions)?;
        let context = bulk_context(&Row::new(), conditions);
        let shard = sharding::resolve::<M>(
            self.orm.config(),
            &RouteContext::Binds(&context),
            "deleteAll",
        )?;
        self.delete_on(&shard, conditions)
    }

    /// Updates the row whose sole primary key equals `id`.
    ///
    /// Only set attributes of `data` that pass `whitelist` are written.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] for a non-scalar id, plus
    /// everything [`Repository::update_all`] returns.
    pub fn update_by_id(
        &self,
        id: impl Into<Value>,
        data: &Row,
        whitelist: Option<&[&str]>,
    ) -> ModelResult<u64> {
        let id = scalar_id::<M>(id.into())?;
        let meta = self.metadata()?;
        let key = sole_primary_key::<M>(&meta)?;
        let values = whitelisted(meta.attributes.iter().map(String::as_str), data, whitelist);
        self.update_all(&values, &Conditions::new().eq(key, id))
    }

    /// Deletes the row whose sole primary key equals `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] for a non-scalar id, plus
    /// everything [`Repository::delete_all`] returns.
    pub fn delete_by_id(&self, id: impl Into<Value>) -> ModelResult<u64> {
        let id = scalar_id::<M>(id.into())?;
        let meta = self.metadata()?;
        let key = sole_primary_key::<M>(&meta)?;
        self.delete_all(&Conditions::new().eq(key, id))
    }

    pub(crate) fn update_on(&self, shard: &Shard, values: &Row, conditions: &Conditions) -> ModelResult<u64> {
        check_bulk::<M>(Some(values), conditions)?;
        let connection = self.orm.connection(&shard.connection)?;
        let predicate = conditions.to_predicate();
        trace!(model = M::NAME, predicate = %predicate.to_sql(), "update");

        let affected = connection
            .update(&shard.source, values, &predicate)
            .map_err(|e| ModelError::storage(M::NAME, e))?;
        debug!(
            model = M::NAME,
            connection = %shard.connection,
            source = %shard.source,
            affected,
            "rows updated"
        );
        Ok(affected)
    }

    pub(crate) fn delete_on(&self, shard: &Shard, conditions: &Conditions) -> ModelResult<u64> {
        check_bulk::<M>(None, conditions)?;
        let connection = self.orm.connection(&shard.connection)?;
        let predicate = conditions.to_predicate();
        trace!(model = M::NAME, predicate = %predicate.to_sql(), "delete");

        let affected = connection
            .delete(&shard.source, &predicate)
            .map_err(|e| ModelError::storage(M::NAME, e))?;
        debug!(
            model = M::NAME,
            connection = %shard.connection,
            source = %shard.source,
            affected,
            "rows deleted"
        );
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn metadata(&self) -> ModelResult<Arc<ModelMetadata>> {
        self.orm.metadata_of::<M>()
    }

    /// Applies `params` to `criteria`, including the primary-key IN list.
    fn restrict(
        &self,
        params: &Params,
        meta: &ModelMetadata,
        criteria: Criteria,
    ) -> ModelResult<Criteria> {
        let criteria = params.apply(criteria);
        match params.requested_keys() {
            Some(keys) => {
                let key = sole_primary_key::<M>(meta)?;
                Ok(criteria.in_where(key, keys.to_vec()))
            }
            None => Ok(criteria),
        }
    }

    fn route(
        &self,
        context: &RouteContext<'_>,
        operation: &'static str,
    ) -> ModelResult<(Shard, Arc<dyn Connection>)> {
        let shard = sharding::resolve::<M>(self.orm.config(), context, operation)?;
        let connection = self.orm.connection(&shard.connection)?;
        Ok((shard, connection))
    }

    fn run(&self, connection: &dyn Connection, spec: &QuerySpec) -> ModelResult<Vec<Row>> {
        let rows = connection
            .query(spec)
            .map_err(|e| ModelError::storage(M::NAME, e))?;
        trace!(model = M::NAME, source = %spec.source, rows = rows.len(), "query");
        Ok(rows)
    }
}

/// Column alias of each aggregate's single result.
fn alias(function: AggregateFn) -> &'static str {
    match function {
        AggregateFn::Count => "row_count",
        AggregateFn::Sum => "summary",
        AggregateFn::Max => "maximum",
        AggregateFn::Min => "minimum",
        AggregateFn::Avg => "average",
    }
}

/// Copies the set values of `data` for `declared` fields that pass `whitelist`.
pub(crate) fn whitelisted<'a, I>(declared: I, data: &Row, whitelist: Option<&[&str]>) -> Row
where
    I: IntoIterator<Item = &'a str>,
{
    declared
        .into_iter()
        .filter(|field| whitelist.map_or(true, |list| list.iter().any(|w| w == field)))
        .filter_map(|field| {
            data.get(field)
                .filter(|v| v.is_set())
                .map(|v| (field.to_string(), v.clone()))
        })
        .collect()
}

/// Field values overlaid with the condition values, keyed by column.
fn bulk_context(values: &Row, conditions: &Conditions) -> Row {
    let mut context = values.clone();
    for condition in conditions {
        context.insert(condition.field.clone(), condition.value.clone());
    }
    context
}

fn check_bulk<M: Model>(values: Option<&Row>, conditions: &Conditions) -> ModelResult<()> {
    if values.is_some_and(Row::is_empty) {
        return Err(ModelError::validation(M::NAME, "no field values to update"));
    }
    if conditions.is_empty() {
        return Err(ModelError::invalid_argument(
            M::NAME,
            "bulk operations require at least one condition",
        ));
    }
    Ok(())
}

fn scalar_id<M: Model>(id: Value) -> ModelResult<Value> {
    if id.is_scalar() {
        Ok(id)
    } else {
        Err(ModelError::invalid_argument(
            M::NAME,
            format!("primary key must be a scalar value, got {}", id.kind()),
        ))
    }
}

fn sole_primary_key<M: Model>(meta: &ModelMetadata) -> ModelResult<&str> {
    match meta.primary_key.as_slice() {
        [key] => Ok(key.as_str()),
        [] => Err(ModelError::schema(M::NAME, "model has no primary key")),
        _ => Err(ModelError::schema(
            M::NAME,
            "primary key has more than one column",
        )),
    }
}

fn non_numeric<M: Model>(function: &str, value: &Value) -> ModelError {
    ModelError::storage(
        M::NAME,
        ConnectionError::driver(format!("non-numeric {function} result `{value}`")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    struct Probe;

    impl Model for Probe {
        const NAME: &'static str = "Probe";
    }

    #[test]
    fn whitelist_filters_and_skips_nulls() {
        let declared = ["id", "name", "email"];
        let data = row! { "id" => 1, "name" => "n", "email" => (), "extra" => true };

        assert_eq!(
            whitelisted(declared, &data, None),
            row! { "id" => 1, "name" => "n" }
        );
        assert_eq!(
            whitelisted(declared, &data, Some(&["name"][..])),
            row! { "name" => "n" }
        );
    }

    #[test]
    fn bulk_context_prefers_conditions() {
        let values = row! { "tenant" => 1, "name" => "x" };
        let conditions = Conditions::new().eq("tenant", 7).gt("age", 3);
        let context = bulk_context(&values, &conditions);
        assert_eq!(context.get("tenant"), Some(&Value::Integer(7)));
        assert_eq!(context.get("age"), Some(&Value::Integer(3)));
        assert_eq!(context.get("name"), Some(&Value::from("x")));
    }

    #[test]
    fn bulk_checks() {
        let conditions = Conditions::new().eq("id", 1);
        assert!(check_bulk::<Probe>(Some(&row! { "a" => 1 }), &conditions).is_ok());
        assert!(matches!(
            check_bulk::<Probe>(Some(&Row::new()), &conditions),
            Err(ModelError::ValidationFailed { .. })
        ));
        assert!(matches!(
            check_bulk::<Probe>(None, &Conditions::new()),
            Err(ModelError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn key_shape_checks() {
        assert!(scalar_id::<Probe>(Value::from("abc")).is_ok());
        assert!(matches!(
            scalar_id::<Probe>(Value::Array(vec![])),
            Err(ModelError::InvalidArgument { .. })
        ));
        assert!(matches!(
            scalar_id::<Probe>(Value::Null),
            Err(ModelError::InvalidArgument { .. })
        ));

        let composite = ModelMetadata::new(["a", "b"]).primary_key(["a", "b"]);
        assert!(matches!(
            sole_primary_key::<Probe>(&composite),
            Err(ModelError::SchemaError { .. })
        ));
        let single = ModelMetadata::new(["id"]).primary_key(["id"]);
        assert_eq!(sole_primary_key::<Probe>(&single).unwrap(), "id");
    }

    #[test]
    fn aggregate_aliases() {
        assert_eq!(alias(AggregateFn::Count), "row_count");
        assert_eq!(alias(AggregateFn::Avg), "average");
    }
}
