//! Connection-agnostic query specifications and their builder.

use crate::query::condition::{Condition, Operator};
use crate::value::{Row, Value};
use std::fmt;

/// A read filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field <op> value`.
    Compare(Condition),
    /// `field IN (values...)`.
    In {
        /// Column name.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// A raw expression passed through to the connection untouched.
    Raw {
        /// The expression text, using `:name` placeholders.
        expression: String,
        /// Values for the placeholders.
        binds: Row,
    },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column name.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Parses `"name"`, `"name ASC"` or `"name DESC"`.
    pub fn parse(term: &str) -> Self {
        let mut parts = term.split_whitespace();
        let field = parts.next().unwrap_or_default().to_string();
        let direction = match parts.next() {
            Some(d) if d.eq_ignore_ascii_case("desc") => Direction::Desc,
            _ => Direction::Asc,
        };
        Self { field, direction }
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `MAX`
    Max,
    /// `MIN`
    Min,
    /// `AVG`
    Avg,
}

impl AggregateFn {
    /// SQL name of the function.
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Max => "MAX",
            AggregateFn::Min => "MIN",
            AggregateFn::Avg => "AVG",
        }
    }
}

/// The argument of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateArg {
    /// `*`
    All,
    /// A bare column identifier, rendered escaped.
    Column(String),
    /// Anything else, rendered verbatim.
    Raw(String),
}

impl AggregateArg {
    /// Classifies an argument string.
    ///
    /// Only `[A-Za-z_][A-Za-z0-9_]*` counts as a column; `*` is `All`;
    /// anything containing other characters is a raw expression.
    pub fn parse(field: &str) -> Self {
        if field == "*" {
            AggregateArg::All
        } else if is_identifier(field) {
            AggregateArg::Column(field.to_string())
        } else {
            AggregateArg::Raw(field.to_string())
        }
    }
}

impl fmt::Display for AggregateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateArg::All => f.write_str("*"),
            AggregateArg::Column(name) => f.write_str(&escape_identifier(name)),
            AggregateArg::Raw(expr) => f.write_str(expr),
        }
    }
}

/// `FUNCTION(argument) AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    /// The function.
    pub function: AggregateFn,
    /// The argument.
    pub argument: AggregateArg,
    /// The result column name.
    pub alias: String,
}

impl Aggregate {
    /// Creates an aggregate, classifying `field` with [`AggregateArg::parse`].
    pub fn new(function: AggregateFn, field: &str, alias: impl Into<String>) -> Self {
        Self {
            function,
            argument: AggregateArg::parse(field),
            alias: alias.into(),
        }
    }

    /// Renders `FUNCTION(argument)`.
    pub fn expression(&self) -> String {
        format!("{}({})", self.function.as_str(), self.argument)
    }
}

/// Returns true for a bare identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escapes an identifier in the driver-neutral bracket form.
pub fn escape_identifier(name: &str) -> String {
    format!("[{name}]")
}

/// An immutable description of one read.
///
/// Produced by [`Criteria::build`] and handed opaque to
/// [`Connection::query`](crate::Connection::query).
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Physical source name.
    pub source: String,
    /// Selected columns. Empty with no aggregates means all columns.
    pub columns: Vec<String>,
    /// Aggregate projections.
    pub aggregates: Vec<Aggregate>,
    /// Filters, AND-combined.
    pub filters: Vec<Filter>,
    /// Ordering.
    pub order: Vec<OrderBy>,
    /// Grouping columns.
    pub group: Vec<String>,
    /// Raw `HAVING` expression.
    pub having: Option<String>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

impl QuerySpec {
    /// Returns true if this is an aggregate read.
    pub fn is_aggregate(&self) -> bool {
        !self.aggregates.is_empty()
    }
}

/// Incremental builder for a [`QuerySpec`].
///
/// # Example
///
/// ```
/// use rowmodel_core::query::Criteria;
///
/// let spec = Criteria::new("robot")
///     .select(["id", "name"])
///     .where_eq("type", "mechanical")
///     .order_by("name")
///     .limit(10)
///     .build();
/// assert_eq!(spec.limit, Some(10));
/// ```
#[derive(Debug, Clone)]
pub struct Criteria {
    spec: QuerySpec,
}

impl Criteria {
    /// Starts a read against `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            spec: QuerySpec {
                source: source.into(),
                columns: Vec::new(),
                aggregates: Vec::new(),
                filters: Vec::new(),
                order: Vec::new(),
                group: Vec::new(),
                having: None,
                limit: None,
                offset: None,
            },
        }
    }

    /// Replaces the selected columns.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an aggregate projection.
    #[must_use]
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.spec.aggregates.push(aggregate);
        self
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.spec.filters.push(filter);
        self
    }

    /// Adds `field <op> value`.
    #[must_use]
    pub fn where_condition(self, condition: Condition) -> Self {
        self.filter(Filter::Compare(condition))
    }

    /// Adds `field = value`.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_condition(Condition::new(field, Operator::Eq, value))
    }

    /// Adds `field IN (values...)`.
    #[must_use]
    pub fn in_where(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Filter::In {
            field: field.into(),
            values,
        })
    }

    /// Adds a raw filter expression.
    #[must_use]
    pub fn where_raw(self, expression: impl Into<String>, binds: Row) -> Self {
        self.filter(Filter::Raw {
            expression: expression.into(),
            binds,
        })
    }

    /// Appends an ordering term such as `"name DESC"`.
    #[must_use]
    pub fn order_by(mut self, term: &str) -> Self {
        self.spec.order.push(OrderBy::parse(term));
        self
    }

    /// Appends a grouping column.
    #[must_use]
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.spec.group.push(field.into());
        self
    }

    /// Sets the `HAVING` expression.
    #[must_use]
    pub fn having(mut self, expression: impl Into<String>) -> Self {
        self.spec.having = Some(expression.into());
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Sets the row offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> QuerySpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn aggregate_escapes_bare_identifiers() {
        assert_eq!(Aggregate::new(AggregateFn::Sum, "price", "summary").expression(), "SUM([price])");
        assert_eq!(Aggregate::new(AggregateFn::Count, "*", "row_count").expression(), "COUNT(*)");
        assert_eq!(
            Aggregate::new(AggregateFn::Max, "price * qty", "maximum").expression(),
            "MAX(price * qty)"
        );
        assert_eq!(
            Aggregate::new(AggregateFn::Count, "DISTINCT city", "row_count").argument,
            AggregateArg::Raw("DISTINCT city".into())
        );
    }

    #[test]
    fn identifier_classification() {
        assert!(is_identifier("created_at"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn order_terms() {
        assert_eq!(
            OrderBy::parse("name DESC"),
            OrderBy { field: "name".into(), direction: Direction::Desc }
        );
        assert_eq!(OrderBy::parse("id").direction, Direction::Asc);
    }

    #[test]
    fn builder_collects_everything() {
        let spec = Criteria::new("robot")
            .select(["id"])
            .where_eq("type", "virtual")
            .in_where("id", vec![Value::Integer(1), Value::Integer(2)])
            .where_raw("year > :year", row! { "year" => 1950 })
            .order_by("id DESC")
            .group_by("type")
            .having("COUNT(*) > 1")
            .limit(5)
            .offset(10)
            .build();

        assert_eq!(spec.source, "robot");
        assert_eq!(spec.columns, vec!["id".to_string()]);
        assert_eq!(spec.filters.len(), 3);
        assert_eq!(spec.group, vec!["type".to_string()]);
        assert_eq!(spec.having.as_deref(), Some("COUNT(*) > 1"));
        assert_eq!((spec.limit, spec.offset), (Some(5), Some(10)));
        assert!(!spec.is_aggregate());
    }
}
