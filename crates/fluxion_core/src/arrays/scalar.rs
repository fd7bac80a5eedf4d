use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use fluxion_error::{DbError, ErrorKind, Result};

use super::coltype::ColType;
use crate::values::Value;
use crate::values::time::Time;

/// A single value that can be stored in a column.
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Time(Time),
}

impl ScalarValue {
    pub fn col_type(&self) -> ColType {
        match self {
            ScalarValue::Bool(_) => ColType::Bool,
            ScalarValue::Int(_) => ColType::Int,
            ScalarValue::UInt(_) => ColType::UInt,
            ScalarValue::Float(_) => ColType::Float,
            ScalarValue::String(_) => ColType::String,
            ScalarValue::Time(_) => ColType::Time,
        }
    }

    /// Zero value for a column type.
    pub fn zero(typ: ColType) -> Self {
        match typ {
            ColType::Bool => ScalarValue::Bool(false),
            ColType::Int => ScalarValue::Int(0),
            ColType::UInt => ScalarValue::UInt(0),
            ColType::Float => ScalarValue::Float(0.0),
            ColType::String => ScalarValue::String(String::new()),
            ColType::Time => ScalarValue::Time(Time(0)),
        }
    }

    /// Total order within a type. Values of different types order by type.
    ///
    /// Floats use IEEE total ordering so NaN has a stable position.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a.cmp(b),
            (ScalarValue::Int(a), ScalarValue::Int(b)) => a.cmp(b),
            (ScalarValue::UInt(a), ScalarValue::UInt(b)) => a.cmp(b),
            (ScalarValue::Float(a), ScalarValue::Float(b)) => a.total_cmp(b),
            (ScalarValue::String(a), ScalarValue::String(b)) => a.cmp(b),
            (ScalarValue::Time(a), ScalarValue::Time(b)) => a.cmp(b),
            (a, b) => a.col_type().cmp(&b.col_type()),
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.col_type().hash(state);
        match self {
            ScalarValue::Bool(v) => v.hash(state),
            ScalarValue::Int(v) => v.hash(state),
            ScalarValue::UInt(v) => v.hash(state),
            ScalarValue::Float(v) => v.to_bits().hash(state),
            ScalarValue::String(v) => v.hash(state),
            ScalarValue::Time(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::UInt(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::String(v) => write!(f, "{v}"),
            ScalarValue::Time(v) => write!(f, "{v}"),
        }
    }
}

impl TryFrom<Value> for ScalarValue {
    type Error = DbError;

    fn try_from(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Bool(v) => ScalarValue::Bool(v),
            Value::Int(v) => ScalarValue::Int(v),
            Value::UInt(v) => ScalarValue::UInt(v),
            Value::Float(v) => ScalarValue::Float(v),
            Value::String(v) => ScalarValue::String(v),
            Value::Time(v) => ScalarValue::Time(v),
            other => {
                return Err(
                    DbError::new("Value type cannot be stored in a column")
                        .with_kind(ErrorKind::ColumnTypeMismatch)
                        .with_field("type", other.typ()),
                );
            }
        })
    }
}

impl From<ScalarValue> for Value {
    fn from(value: ScalarValue) -> Self {
        match value {
            ScalarValue::Bool(v) => Value::Bool(v),
            ScalarValue::Int(v) => Value::Int(v),
            ScalarValue::UInt(v) => Value::UInt(v),
            ScalarValue::Float(v) => Value::Float(v),
            ScalarValue::String(v) => Value::String(v),
            ScalarValue::Time(v) => Value::Time(v),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        ScalarValue::UInt(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<Time> for ScalarValue {
    fn from(value: Time) -> Self {
        ScalarValue::Time(value)
    }
}
