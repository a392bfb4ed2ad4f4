//! Comparison conditions and bound predicates.

use crate::value::{Row, Value};
use std::fmt;
use std::str::FromStr;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    /// `=`
    #[default]
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
}

impl Operator {
    /// The operator as it appears in a rendered predicate.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::NotEq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            op if op.eq_ignore_ascii_case("like") => Ok(Operator::Like),
            other => Err(format!("unknown operator `{other}`")),
        }
    }
}

/// One `field <op> value` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column name.
    pub field: String,
    /// Comparison operator.
    pub op: Operator,
    /// Bound value.
    pub value: Value,
}

impl Condition {
    /// Creates a condition.
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Parses a legacy `"field<op>"` key such as `"age>"` or `"name LIKE"`.
    ///
    /// A bare field name means equality.
    ///
    /// # Errors
    ///
    /// Returns a message if the key has no leading identifier or the
    /// operator is unknown.
    pub fn parse_token(token: &str, value: impl Into<Value>) -> Result<Self, String> {
        let token = token.trim();
        let split = token
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(token.len());
        let (field, op) = token.split_at(split);
        if field.is_empty() {
            return Err(format!("condition `{token}` has no field name"));
        }
        Ok(Self::new(field, op.parse()?, value))
    }

    /// Returns true if `candidate` satisfies this condition.
    ///
    /// Equality is strict except that integers and floats compare by
    /// numeric value. `LIKE` supports `%` and `_` wildcards on text.
    pub fn matches(&self, candidate: &Value) -> bool {
        use std::cmp::Ordering;

        match self.op {
            Operator::Eq => values_equal(candidate, &self.value),
            Operator::NotEq => !values_equal(candidate, &self.value),
            Operator::Like => match (candidate.as_text(), self.value.as_text()) {
                (Some(text), Some(pattern)) => like(text, pattern),
                _ => false,
            },
            op => {
                if candidate.is_null() || self.value.is_null() {
                    return false;
                }
                match candidate.compare(&self.value) {
                    Some(Ordering::Greater) => matches!(op, Operator::Gt | Operator::Gte),
                    Some(Ordering::Less) => matches!(op, Operator::Lt | Operator::Lte),
                    Some(Ordering::Equal) => matches!(op, Operator::Gte | Operator::Lte),
                    None => false,
                }
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            a.compare(b) == Some(std::cmp::Ordering::Equal)
        }
        _ => a == b,
    }
}

fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    // Last `%` seen and the text position it currently absorbs up to.
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(&'%') => {
                resume = Some((p, t));
                p += 1;
            }
            Some(&'_') => {
                t += 1;
                p += 1;
            }
            Some(c) if c.eq_ignore_ascii_case(&text[t]) => {
                t += 1;
                p += 1;
            }
            _ => match resume {
                Some((star, from)) => {
                    resume = Some((star, from + 1));
                    p = star + 1;
                    t = from + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

/// An ordered AND-list of conditions addressing rows for bulk operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    items: Vec<Condition>,
}

impl Conditions {
    /// Creates an empty list, which matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field <op> value`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.items.push(Condition::new(field, op, value));
        self
    }

    /// Adds `field = value`.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Eq, value)
    }

    /// Adds `field != value`.
    #[must_use]
    pub fn not_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::NotEq, value)
    }

    /// Adds `field > value`.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Gt, value)
    }

    /// Adds `field >= value`.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Gte, value)
    }

    /// Adds `field < value`.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Lt, value)
    }

    /// Adds `field <= value`.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Lte, value)
    }

    /// Adds `field LIKE pattern`.
    #[must_use]
    pub fn like(self, field: impl Into<String>, pattern: impl Into<Value>) -> Self {
        self.with(field, Operator::Like, pattern)
    }

    /// Appends an already built condition.
    pub fn push(&mut self, condition: Condition) {
        self.items.push(condition);
    }

    /// Builds conditions from legacy `"field<op>" => value` pairs.
    ///
    /// # Errors
    ///
    /// Returns the first token that cannot be parsed.
    pub fn parse_tokens<I, K, V>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut conditions = Self::new();
        for (token, value) in pairs {
            conditions.push(Condition::parse_token(token.as_ref(), value)?);
        }
        Ok(conditions)
    }

    /// Returns the conditions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.items.iter()
    }

    /// Returns the number of conditions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no conditions.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if `row` satisfies every condition. Missing fields read as null.
    pub fn matches(&self, row: &Row) -> bool {
        self.items
            .iter()
            .all(|c| c.matches(row.get(&c.field).unwrap_or(&Value::Null)))
    }

    /// Binds the conditions into a predicate.
    pub fn to_predicate(&self) -> Predicate {
        Predicate::from_conditions(self)
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(items: Vec<Condition>) -> Self {
        Self { items }
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// One clause of a bound predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Column name.
    pub column: String,
    /// Comparison operator.
    pub op: Operator,
    /// Name of the bind holding the value.
    pub bind: String,
}

/// An AND-conjunction of column comparisons with bound parameters.
///
/// Bind names are the column names. A column compared twice gets a
/// numbered bind (`age`, `age_1`, ...) so no value is overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
    binds: Row,
}

impl Predicate {
    /// Binds a list of conditions.
    pub fn from_conditions(conditions: &Conditions) -> Self {
        let mut predicate = Self::default();
        for condition in conditions {
            let mut bind = condition.field.clone();
            let mut n = 0usize;
            while predicate.binds.contains_key(&bind) {
                n += 1;
                bind = format!("{}_{n}", condition.field);
            }
            predicate.binds.insert(bind.clone(), condition.value.clone());
            predicate.clauses.push(Clause {
                column: condition.field.clone(),
                op: condition.op,
                bind,
            });
        }
        predicate
    }

    /// Returns the clauses in order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns the bind set keyed by bind name.
    pub fn binds(&self) -> &Row {
        &self.binds
    }

    /// Returns true if the predicate matches every row.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Renders `[column] op :bind` clauses joined by `AND`.
    ///
    /// Identifiers use the bracket form; drivers translate it to their
    /// own quoting.
    pub fn to_sql(&self) -> String {
        self.clauses
            .iter()
            .map(|c| format!("[{}]{}:{}", c.column, c.op, c.bind))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Returns true if `row` satisfies every clause.
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|clause| {
            let value = self.binds.get(&clause.bind).cloned().unwrap_or_default();
            Condition {
                field: clause.column.clone(),
                op: clause.op,
                value,
            }
            .matches(row.get(&clause.column).unwrap_or(&Value::Null))
        })
    }
}
