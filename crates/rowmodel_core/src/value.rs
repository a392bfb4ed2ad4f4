//! Dynamic field value type.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A field-name to value mapping.
///
/// Used for entity fields, snapshots, field-value sets, bind sets and the
/// raw rows returned by a connection.
pub type Row = BTreeMap<String, Value>;

/// A dynamic field value.
///
/// Equality is strict: values of different variants are never equal, so
/// `Integer(1)`, `Float(1.0)` and `Text("1")` are three distinct values.
/// `Null` doubles as the "unset" sentinel for entity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null, or a field that has no value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// List of values, used for IN lists.
    Array(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value holds something, i.e. is not null.
    pub fn is_set(&self) -> bool {
        !self.is_null()
    }

    /// Scalars are booleans, numbers and text.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::Text(_)
        )
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Coerces this value to an integer.
    ///
    /// Accepts integers, floats (truncated), booleans and numeric text.
    /// Stores frequently hand back aggregates as strings. Numbers outside
    /// the `i64` range are rejected, not saturated.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(f) => truncate(*f),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(truncate))
            }
            _ => None,
        }
    }

    /// Coerces this value to a float.
    ///
    /// Accepts integers, floats, booleans and numeric text.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Orders two values for sorting and range comparisons.
    ///
    /// Numbers compare numerically across `Integer` and `Float`, text
    /// compares lexicographically, booleans `false < true`. Null sorts
    /// before everything. Returns `None` for incomparable pairs.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                self.to_f64()?.partial_cmp(&other.to_f64()?)
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
        }
    }
}

/// Truncates `f` toward zero, `None` if it is not finite or out of range.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    (i64::MIN as f64..i64::MAX as f64)
        .contains(&f)
        .then(|| f as i64)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

/// Builds a [`Row`] from `field => value` pairs.
///
/// ```
/// use rowmodel_core::{row, Value};
///
/// let r = row! { "id" => 5, "name" => "Boy" };
/// assert_eq!(r["id"], Value::Integer(5));
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::Row::new() };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $( row.insert(::std::string::String::from($field), $crate::Value::from($value)); )+
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_strict() {
        assert_ne!(Value::Integer(1), Value::Text("1".into()));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::Bool(true), Value::Integer(1));
        assert_eq!(Value::Text("a".into()), Value::from("a"));
    }

    #[test]
    fn scalar_classification() {
        assert!(Value::Integer(3).is_scalar());
        assert!(Value::Text(String::new()).is_scalar());
        assert!(!Value::Null.is_scalar());
        assert!(!Value::Array(vec![]).is_scalar());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::Text("42".into()).to_i64(), Some(42));
        assert_eq!(Value::Text(" 7.9 ".into()).to_i64(), Some(7));
        assert_eq!(Value::Text("abc".into()).to_i64(), None);
        assert_eq!(Value::Text("-9.5".into()).to_i64(), Some(-9));
        assert_eq!(Value::Text("1e30".into()).to_i64(), None);
        assert_eq!(Value::Text("-1e19".into()).to_i64(), None);
        assert_eq!(Value::Float(9.3e18).to_i64(), None);
        assert_eq!(Value::Float(f64::NAN).to_i64(), None);
        assert_eq!(Value::Text(i64::MAX.to_string()).to_i64(), Some(i64::MAX));
        assert_eq!(Value::Integer(3).to_f64(), Some(3.0));
        assert_eq!(Value::Text("2.5".into()).to_f64(), Some(2.5));
        assert_eq!(Value::Null.to_f64(), None);
    }

    #[test]
    fn compare_across_numeric_variants() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Text("b".into()).compare(&Value::Text("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Null.compare(&Value::Integer(0)), Some(Ordering::Less));
        assert_eq!(Value::Text("1".into()).compare(&Value::Integer(1)), None);
    }

    #[test]
    fn option_and_unit_conversions() {
        assert_eq!(Value::from(Some(5i64)), Value::Integer(5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(()), Value::Null);
    }

    #[test]
    fn json_shape_is_untagged() {
        let r = row! { "id" => 1, "name" => "x", "gone" => () };
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"gone":null,"id":1,"name":"x"}"#);

        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
