//! # rowmodel memory
//!
//! In-memory connection for rowmodel.
//!
//! [`MemoryConnection`] keeps one list of rows per physical source and
//! evaluates structured query specifications directly: comparison and
//! `IN` filters, ordering, limit/offset, column projection and the five
//! aggregate functions. Raw filter expressions and grouping are not
//! interpreted and fail with [`ConnectionError::Unsupported`].
//!
//! It is meant for tests and demos, not as a production driver.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use parking_lot::RwLock;
use rowmodel_core::query::{
    Aggregate, AggregateArg, AggregateFn, Condition, Direction, Filter, Operator, OrderBy,
    Predicate, QuerySpec,
};
use rowmodel_core::{Connection, ConnectionError, ConnectionResult, Row, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    identity: Option<String>,
    next_id: i64,
}

impl Table {
    /// Fills or records the identity column of a new row.
    fn assign_identity(&mut self, row: &mut Row) -> ConnectionResult<Value> {
        let Some(identity) = self.identity.clone() else {
            return Ok(Value::Null);
        };
        let id = match row.get(&identity).cloned() {
            Some(Value::Integer(id)) => {
                if self.rows.iter().any(|r| r.get(&identity) == Some(&Value::Integer(id))) {
                    return Err(ConnectionError::constraint(format!(
                        "duplicate `{identity}` value {id}"
                    )));
                }
                id
            }
            Some(v) if v.is_set() => {
                return Err(ConnectionError::constraint(format!(
                    "`{identity}` must be an integer, got {}",
                    v.kind()
                )))
            }
            _ => {
                let id = self.next_id + 1;
                row.insert(identity, Value::Integer(id));
                id
            }
        };
        self.next_id = self.next_id.max(id);
        Ok(Value::Integer(id))
    }
}

/// An in-memory [`Connection`].
///
/// # Thread Safety
///
/// Tables sit behind a single lock; the connection can be shared across
/// threads.
///
/// # Example
///
/// ```rust
/// use rowmodel_core::{row, Connection, Value};
/// use rowmodel_memory::MemoryConnection;
///
/// let connection = MemoryConnection::new().with_auto_increment("robot", "id");
/// let id = connection.insert("robot", &row! { "name" => "R2-D2" }).unwrap();
/// assert_eq!(id, Value::Integer(1));
/// assert_eq!(connection.len("robot"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryConnection {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryConnection {
    /// Creates a connection with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an integer identity column filled on insert.
    #[must_use]
    pub fn with_auto_increment(self, source: impl Into<String>, field: impl Into<String>) -> Self {
        self.tables.write().entry(source.into()).or_default().identity = Some(field.into());
        self
    }

    /// Adds rows as they are, bypassing identity assignment.
    ///
    /// Integer identity values advance the identity counter.
    pub fn seed<I>(&self, source: &str, rows: I)
    where
        I: IntoIterator<Item = Row>,
    {
        let mut tables = self.tables.write();
        let table = tables.entry(source.to_string()).or_default();
        for row in rows {
            if let Some(Value::Integer(id)) = table.identity.as_ref().and_then(|f| row.get(f)) {
                table.next_id = table.next_id.max(*id);
            }
            table.rows.push(row);
        }
    }

    /// Returns a copy of the rows of `source`, in insertion order.
    #[must_use]
    pub fn rows(&self, source: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(source)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Returns the number of rows in `source`.
    #[must_use]
    pub fn len(&self, source: &str) -> usize {
        self.tables.read().get(source).map_or(0, |t| t.rows.len())
    }

    /// Returns true if `source` holds no rows.
    #[must_use]
    pub fn is_empty(&self, source: &str) -> bool {
        self.len(source) == 0
    }

    /// Names of every source that was written or declared, sorted.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Drops all rows. Identity declarations are kept.
    pub fn clear(&self) {
        for table in self.tables.write().values_mut() {
            table.rows.clear();
            table.next_id = 0;
        }
    }
}

impl Connection for MemoryConnection {
    fn insert(&self, source: &str, values: &Row) -> ConnectionResult<Value> {
        let mut tables = self.tables.write();
        let table = tables.entry(source.to_string()).or_default();
        let mut row = values.clone();
        let id = table.assign_identity(&mut row)?;
        table.rows.push(row);
        trace!(source, id = %id, "memory insert");
        Ok(id)
    }

    fn update(&self, source: &str, values: &Row, predicate: &Predicate) -> ConnectionResult<u64> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(source) else {
            return Ok(0);
        };
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|row| predicate.matches(row)) {
            row.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            affected += 1;
        }
        trace!(source, affected, "memory update");
        Ok(affected)
    }

    fn delete(&self, source: &str, predicate: &Predicate) -> ConnectionResult<u64> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(source) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| !predicate.matches(row));
        let affected = (before - table.rows.len()) as u64;
        trace!(source, affected, "memory delete");
        Ok(affected)
    }

    fn query(&self, spec: &QuerySpec) -> ConnectionResult<Vec<Row>> {
        if !spec.group.is_empty() || spec.having.is_some() {
            return Err(ConnectionError::unsupported(
                "grouping is not supported by the memory connection",
            ));
        }

        let mut rows = Vec::new();
        if let Some(table) = self.tables.read().get(&spec.source) {
            for row in &table.rows {
                if passes(row, &spec.filters)? {
                    rows.push(row.clone());
                }
            }
        }

        let mut result = if spec.is_aggregate() {
            let mut out = Row::new();
            for aggregate in &spec.aggregates {
                out.insert(aggregate.alias.clone(), evaluate(aggregate, &rows)?);
            }
            vec![out]
        } else {
            sort(&mut rows, &spec.order);
            if spec.columns.is_empty() {
                rows
            } else {
                rows.iter().map(|row| project(row, &spec.columns)).collect()
            }
        };

        let offset = usize::try_from(spec.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        result.drain(..offset.min(result.len()));
        if let Some(limit) = spec.limit {
            result.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        trace!(source = %spec.source, rows = result.len(), "memory query");
        Ok(result)
    }
}

fn field<'a>(row: &'a Row, name: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    row.get(name).unwrap_or(&NULL)
}

fn passes(row: &Row, filters: &[Filter]) -> ConnectionResult<bool> {
    for filter in filters {
        let ok = match filter {
            Filter::Compare(condition) => condition.matches(field(row, &condition.field)),
            Filter::In { field: name, values } => {
                let candidate = field(row, name);
                values
                    .iter()
                    .any(|v| Condition::new(name.as_str(), Operator::Eq, v.clone()).matches(candidate))
            }
            Filter::Raw { expression, .. } => {
                return Err(ConnectionError::unsupported(format!(
                    "raw filter `{expression}` is not supported by the memory connection"
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sort(rows: &mut [Row], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for term in order {
            let ord = field(a, &term.field)
                .compare(field(b, &term.field))
                .unwrap_or(Ordering::Equal);
            let ord = match term.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn project(row: &Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|c| (c.clone(), field(row, c).clone()))
        .collect()
}

fn evaluate(aggregate: &Aggregate, rows: &[Row]) -> ConnectionResult<Value> {
    let column = match &aggregate.argument {
        AggregateArg::All if aggregate.function == AggregateFn::Count => {
            return Ok(Value::Integer(rows.len() as i64));
        }
        AggregateArg::Column(column) => column,
        other => {
            return Err(ConnectionError::unsupported(format!(
                "aggregate argument `{other}` is not supported by the memory connection"
            )))
        }
    };
    let values: Vec<&Value> = rows
        .iter()
        .map(|row| field(row, column))
        .filter(|v| v.is_set())
        .collect();

    match aggregate.function {
        AggregateFn::Count => Ok(Value::Integer(values.len() as i64)),
        AggregateFn::Sum => sum(&values, column),
        AggregateFn::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let total = numbers(&values, column)?.iter().sum::<f64>();
            #[allow(clippy::cast_precision_loss)]
            Ok(Value::Float(total / values.len() as f64))
        }
        AggregateFn::Max => Ok(extreme(&values, Ordering::Greater)),
        AggregateFn::Min => Ok(extreme(&values, Ordering::Less)),
    }
}

fn sum(values: &[&Value], column: &str) -> ConnectionResult<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        let mut total: i64 = 0;
        for v in values {
            let n = v.as_integer().unwrap_or_default();
            total = total
                .checked_add(n)
                .ok_or_else(|| ConnectionError::driver(format!("SUM of `{column}` overflows")))?;
        }
        return Ok(Value::Integer(total));
    }
    Ok(Value::Float(numbers(values, column)?.iter().sum()))
}

fn numbers(values: &[&Value], column: &str) -> ConnectionResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.to_f64().ok_or_else(|| {
                ConnectionError::driver(format!("`{column}` holds non-numeric {}", v.kind()))
            })
        })
        .collect()
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for &v in values {
        best = match best {
            Some(b) if v.compare(b) != Some(wanted) => Some(b),
            _ => Some(v),
        };
    }
    best.cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmodel_core::query::{Conditions, Criteria};
    use rowmodel_core::row;

    fn robots() -> MemoryConnection {
        let connection = MemoryConnection::new().with_auto_increment("robot", "id");
        for (name, kind, year) in [
            ("Astro Boy", "mechanical", 1952),
            ("Bender", "mechanical", 1999),
            ("Robotina", "virtual", 1972),
        ] {
            connection
                .insert("robot", &row! { "name" => name, "type" => kind, "year" => year })
                .unwrap();
        }
        connection
    }

    #[test]
    fn insert_assigns_identity() {
        let connection = robots();
        assert_eq!(connection.len("robot"), 3);
        assert_eq!(connection.rows("robot")[2].get("id"), Some(&Value::Integer(3)));

        let explicit = connection.insert("robot", &row! { "id" => 10, "name" => "X" }).unwrap();
        assert_eq!(explicit, Value::Integer(10));
        let next = connection.insert("robot", &row! { "name" => "Y" }).unwrap();
        assert_eq!(next, Value::Integer(11));
    }

    #[test]
    fn duplicate_identity_is_a_constraint_error() {
        let connection = robots();
        let err = connection.insert("robot", &row! { "id" => 1 }).unwrap_err();
        assert!(matches!(err, ConnectionError::Constraint(_)));
    }

    #[test]
    fn no_identity_returns_null() {
        let connection = MemoryConnection::new();
        assert_eq!(connection.insert("log", &row! { "msg" => "hi" }).unwrap(), Value::Null);
    }

    #[test]
    fn update_and_delete_by_predicate() {
        let connection = robots();
        let predicate = Conditions::new().eq("type", "mechanical").to_predicate();
        let affected = connection
            .update("robot", &row! { "year" => 2000 }, &predicate)
            .unwrap();
        assert_eq!(affected, 2);

        let predicate = Conditions::new().gte("year", 2000).to_predicate();
        assert_eq!(connection.delete("robot", &predicate).unwrap(), 2);
        assert_eq!(connection.len("robot"), 1);
        assert_eq!(connection.delete("missing", &predicate).unwrap(), 0);
    }

    #[test]
    fn filter_order_page_project() {
        let connection = robots();
        let spec = Criteria::new("robot")
            .select(["name"])
            .where_condition(Condition::new("year", Operator::Gt, 1960))
            .order_by("year DESC")
            .build();
        let rows = connection.query(&spec).unwrap();
        assert_eq!(rows, vec![row! { "name" => "Bender" }, row! { "name" => "Robotina" }]);

        let spec = Criteria::new("robot")
            .in_where("id", vec![Value::Integer(1), Value::Integer(3)])
            .order_by("id")
            .offset(1)
            .limit(5)
            .build();
        let rows = connection.query(&spec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Robotina")));
    }

    #[test]
    fn aggregates() {
        let connection = robots();
        let run = |function, field: &str| {
            let spec = Criteria::new("robot")
                .aggregate(Aggregate::new(function, field, "v"))
                .build();
            connection.query(&spec).unwrap()[0]["v"].clone()
        };

        assert_eq!(run(AggregateFn::Count, "*"), Value::Integer(3));
        assert_eq!(run(AggregateFn::Sum, "year"), Value::Integer(5923));
        assert_eq!(run(AggregateFn::Max, "year"), Value::Integer(1999));
        assert_eq!(run(AggregateFn::Min, "name"), Value::from("Astro Boy"));
        assert_eq!(run(AggregateFn::Avg, "id"), Value::Float(2.0));
        assert_eq!(run(AggregateFn::Sum, "missing"), Value::Null);
    }

    #[test]
    fn unsupported_features() {
        let connection = robots();
        let raw = Criteria::new("robot").where_raw("year > 1", Row::new()).build();
        assert!(matches!(connection.query(&raw), Err(ConnectionError::Unsupported(_))));

        let grouped = Criteria::new("robot").group_by("type").build();
        assert!(matches!(connection.query(&grouped), Err(ConnectionError::Unsupported(_))));
    }

    #[test]
    fn seed_advances_identity() {
        let connection = MemoryConnection::new().with_auto_increment("t", "id");
        connection.seed("t", [row! { "id" => 41 }]);
        assert_eq!(connection.insert("t", &row! { "x" => 1 }).unwrap(), Value::Integer(42));
        assert_eq!(connection.sources(), vec!["t".to_string()]);

        connection.clear();
        assert!(connection.is_empty("t"));
    }
}
