pub mod binary;
pub mod time;
pub mod types;

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, Result};
use regex::Regex;
use time::{Duration, Time};
use types::{FunctionSignature, Type};

/// A runtime value produced by evaluators.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Time(Time),
    Duration(Duration),
    Regexp(Regexp),
    Array(Array),
    Object(Object),
    Function(Arc<dyn Function>),
}

/// A callable value.
pub trait Function: Debug + Sync + Send {
    fn signature(&self) -> &FunctionSignature;

    /// Call the function with named arguments.
    fn call(&self, args: &Object) -> Result<Value>;
}

impl Value {
    pub fn typ(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::UInt(_) => Type::UInt,
            Value::Float(_) => Type::Float,
            Value::String(_) => Type::String,
            Value::Time(_) => Type::Time,
            Value::Duration(_) => Type::Duration,
            Value::Regexp(_) => Type::Regexp,
            Value::Array(arr) => Type::array(arr.elem.clone()),
            Value::Object(obj) => obj.typ(),
            Value::Function(f) => Type::function(f.signature().clone()),
        }
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(wrong_kind(&Type::Bool, &other.typ())),
        }
    }

    pub fn try_as_int(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(wrong_kind(&Type::Int, &other.typ())),
        }
    }

    pub fn try_as_uint(&self) -> Result<u64> {
        match self {
            Value::UInt(v) => Ok(*v),
            other => Err(wrong_kind(&Type::UInt, &other.typ())),
        }
    }

    pub fn try_as_float(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(wrong_kind(&Type::Float, &other.typ())),
        }
    }

    pub fn try_as_str(&self) -> Result<&str> {
        match self {
            Value::String(v) => Ok(v),
            other => Err(wrong_kind(&Type::String, &other.typ())),
        }
    }

    pub fn try_as_time(&self) -> Result<Time> {
        match self {
            Value::Time(v) => Ok(*v),
            other => Err(wrong_kind(&Type::Time, &other.typ())),
        }
    }

    pub fn try_as_duration(&self) -> Result<Duration> {
        match self {
            Value::Duration(v) => Ok(*v),
            other => Err(wrong_kind(&Type::Duration, &other.typ())),
        }
    }

    pub fn try_as_regexp(&self) -> Result<&Regexp> {
        match self {
            Value::Regexp(v) => Ok(v),
            other => Err(wrong_kind(&Type::Regexp, &other.typ())),
        }
    }

    pub fn try_as_array(&self) -> Result<&Array> {
        match self {
            Value::Array(v) => Ok(v),
            other => Err(wrong_kind(&Type::array(Type::Var(0)), &other.typ())),
        }
    }

    pub fn try_as_object(&self) -> Result<&Object> {
        match self {
            Value::Object(v) => Ok(v),
            other => Err(wrong_kind(&Type::Object(BTreeMap::new()), &other.typ())),
        }
    }

    pub fn try_as_function(&self) -> Result<&Arc<dyn Function>> {
        match self {
            Value::Function(f) => Ok(f),
            other => Err(DbError::new("Value is not a function")
                .with_kind(ErrorKind::WrongKind)
                .with_field("got", other.typ())),
        }
    }
}

pub(crate) fn wrong_kind(want: &Type, got: &Type) -> DbError {
    DbError::new("Unexpected value kind")
        .with_kind(ErrorKind::WrongKind)
        .with_field("want", want)
        .with_field("got", got)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Regexp(a), Value::Regexp(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
            Value::Duration(v) => write!(f, "{v}"),
            Value::Regexp(v) => write!(f, "/{}/", v.as_str()),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (idx, v) in arr.values().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in obj.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "{}", func.signature()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Time> for Value {
    fn from(value: Time) -> Self {
        Value::Time(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Value::Duration(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

/// Compiled regular expression value.
#[derive(Debug, Clone)]
pub struct Regexp(Arc<Regex>);

impl Regexp {
    pub fn new(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern).map_err(|e| {
            DbError::with_source("Invalid regular expression", Box::new(e))
                .with_field("pattern", pattern)
        })?;
        Ok(Regexp(Arc::new(re)))
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Regexp {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Homogeneous array of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    elem: Type,
    values: Arc<Vec<Value>>,
}

impl Array {
    /// Create a new array, checking every value has the element type.
    pub fn try_new(elem: Type, values: Vec<Value>) -> Result<Self> {
        for v in &values {
            let typ = v.typ();
            if typ != elem {
                return Err(DbError::new("Array element has unexpected type")
                    .with_kind(ErrorKind::TypeError)
                    .with_field("want", &elem)
                    .with_field("got", typ));
            }
        }
        Ok(Array {
            elem,
            values: Arc::new(values),
        })
    }

    pub fn elem_type(&self) -> &Type {
        &self.elem
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: i64) -> Result<&Value> {
        usize::try_from(idx)
            .ok()
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| {
                DbError::new("Array index out of bounds")
                    .with_field("index", idx)
                    .with_field("len", self.values.len())
            })
    }
}

/// Record value with named properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    values: BTreeMap<String, Value>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn try_get(&self, name: &str) -> Result<&Value> {
        self.values.get(name).ok_or_else(|| {
            DbError::new("Object has no such property").with_field("property", name)
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn typ(&self) -> Type {
        Type::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.typ()))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Object {
    fn from_iter<T: IntoIterator<Item = (S, Value)>>(iter: T) -> Self {
        Object {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type() {
        let obj: Object = [("a", Value::Int(1)), ("b", Value::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(
            Type::object([("a", Type::Int), ("b", Type::String)]),
            obj.typ()
        );
    }

    #[test]
    fn array_type_check() {
        Array::try_new(Type::Int, vec![Value::Int(1), Value::Float(2.0)]).unwrap_err();
        let arr = Array::try_new(Type::Int, vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(&Value::Int(2), arr.get(1).unwrap());
        arr.get(2).unwrap_err();
        arr.get(-1).unwrap_err();
    }

    #[test]
    fn wrong_kind_access() {
        let err = Value::Int(4).try_as_float().unwrap_err();
        assert_eq!(ErrorKind::WrongKind, err.kind());
    }
}
