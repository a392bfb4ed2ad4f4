//! Parameters accepted by the finder and aggregate operations.

use crate::query::condition::{Condition, Conditions, Operator};
use crate::query::spec::Criteria;
use crate::value::{Row, Value};

/// Parameters for `find` and friends.
///
/// Filters are AND-combined. `columns` defaults to every declared
/// attribute, `in_keys` filters the sole primary key, and the remaining
/// directives pass through to the query specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    raw: Vec<(String, Row)>,
    conditions: Conditions,
    columns: Option<Vec<String>>,
    in_keys: Option<Vec<Value>>,
    order: Vec<String>,
    group: Vec<String>,
    having: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Params {
    /// Empty parameters: every row, every column.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw filter expression.
    #[must_use]
    pub fn filter(self, expression: impl Into<String>) -> Self {
        self.filter_with(expression, Row::new())
    }

    /// Adds a raw filter expression with values for its `:name` placeholders.
    #[must_use]
    pub fn filter_with(mut self, expression: impl Into<String>, binds: Row) -> Self {
        self.raw.push((expression.into(), binds));
        self
    }

    /// Adds `field <op> value`.
    #[must_use]
    pub fn condition(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::new(field, op, value));
        self
    }

    /// Adds `field = value`.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Eq, value)
    }

    /// Adds every condition from a list.
    #[must_use]
    pub fn conditions(mut self, conditions: &Conditions) -> Self {
        for c in conditions {
            self.conditions.push(c.clone());
        }
        self
    }

    /// Restricts the selected columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the read to the given primary-key values.
    #[must_use]
    pub fn in_keys<I, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Appends an ordering term such as `"name DESC"`.
    #[must_use]
    pub fn order(mut self, term: impl Into<String>) -> Self {
        self.order.push(term.into());
        self
    }

    /// Appends a grouping column.
    #[must_use]
    pub fn group(mut self, field: impl Into<String>) -> Self {
        self.group.push(field.into());
        self
    }

    /// Sets the `HAVING` expression.
    #[must_use]
    pub fn having(mut self, expression: impl Into<String>) -> Self {
        self.having = Some(expression.into());
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the row offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The requested columns, if any.
    pub fn requested_columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// The primary-key IN list, if any.
    pub fn requested_keys(&self) -> Option<&[Value]> {
        self.in_keys.as_deref()
    }

    /// Equality bindings usable as a shard routing context.
    pub fn route_binds(&self) -> Row {
        let mut binds = Row::new();
        for (_, raw_binds) in &self.raw {
            binds.extend(raw_binds.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for c in self.conditions.iter().filter(|c| c.op == Operator::Eq) {
            binds.insert(c.field.clone(), c.value.clone());
        }
        binds
    }

    /// Applies filters and pass-through directives to a builder.
    ///
    /// `columns` and `in_keys` are left to the caller, which knows the schema.
    pub fn apply(&self, mut criteria: Criteria) -> Criteria {
        for (expression, binds) in &self.raw {
            criteria = criteria.where_raw(expression.clone(), binds.clone());
        }
        for condition in &self.conditions {
            criteria = criteria.where_condition(condition.clone());
        }
        for term in &self.order {
            criteria = criteria.order_by(term);
        }
        for field in &self.group {
            criteria = criteria.group_by(field.clone());
        }
        if let Some(having) = &self.having {
            criteria = criteria.having(having.clone());
        }
        if let Some(limit) = self.limit {
            criteria = criteria.limit(limit);
        }
        if let Some(offset) = self.offset {
            criteria = criteria.offset(offset);
        }
        criteria
    }
}

impl From<&str> for Params {
    fn from(expression: &str) -> Self {
        Params::new().filter(expression)
    }
}

impl From<String> for Params {
    fn from(expression: String) -> Self {
        Params::new().filter(expression)
    }
}

impl From<Conditions> for Params {
    fn from(conditions: Conditions) -> Self {
        Params::new().conditions(&conditions)
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::new()
    }
}

/// Argument of `find_first` and `exists`: a primary-key value or a parameter set.
///
/// Text converts to a raw filter, never to a key. Wrap a text key in
/// [`Value`] to look it up by primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Primary-key shortcut.
    Key(Value),
    /// A full parameter set.
    Params(Params),
}

impl From<Value> for Lookup {
    fn from(v: Value) -> Self {
        Lookup::Key(v)
    }
}

impl From<i64> for Lookup {
    fn from(v: i64) -> Self {
        Lookup::Key(Value::Integer(v))
    }
}

impl From<i32> for Lookup {
    fn from(v: i32) -> Self {
        Lookup::Key(Value::from(v))
    }
}

impl From<Params> for Lookup {
    fn from(p: Params) -> Self {
        Lookup::Params(p)
    }
}

impl From<&str> for Lookup {
    fn from(expression: &str) -> Self {
        Lookup::Params(Params::from(expression))
    }
}

impl From<Conditions> for Lookup {
    fn from(conditions: Conditions) -> Self {
        Lookup::Params(Params::from(conditions))
    }
}

impl From<()> for Lookup {
    fn from((): ()) -> Self {
        Lookup::Params(Params::new())
    }
}
