use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fluxion_error::{DbError, Result};

use super::coltype::{ColMeta, col_idx};
use super::scalar::ScalarValue;
use crate::values::Value;

/// Ordered set of (label, value) pairs identifying a partition of a
/// stream.
///
/// Cheap to clone. Equality, hashing and ordering all walk the columns in
/// order comparing label, then type, then value.
#[derive(Clone)]
pub struct GroupKey {
    inner: Arc<GroupKeyInner>,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct GroupKeyInner {
    cols: Vec<ColMeta>,
    values: Vec<ScalarValue>,
}

impl GroupKey {
    /// Create a new key, checking labels are unique and values match the
    /// column types.
    pub fn try_new(cols: Vec<ColMeta>, values: Vec<ScalarValue>) -> Result<Self> {
        if cols.len() != values.len() {
            return Err(DbError::new("Group key columns and values differ in length")
                .with_field("columns", cols.len())
                .with_field("values", values.len()));
        }
        for (idx, (col, value)) in cols.iter().zip(&values).enumerate() {
            if cols[..idx].iter().any(|c| c.label == col.label) {
                return Err(
                    DbError::new("Duplicate label in group key").with_field("label", &col.label)
                );
            }
            if col.typ != value.col_type() {
                return Err(super::column::type_mismatch(
                    &col.label,
                    col.typ,
                    value.col_type(),
                ));
            }
        }
        Ok(GroupKey {
            inner: Arc::new(GroupKeyInner { cols, values }),
        })
    }

    pub fn empty() -> Self {
        GroupKey {
            inner: Arc::new(GroupKeyInner {
                cols: Vec::new(),
                values: Vec::new(),
            }),
        }
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.inner.cols
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.inner.values
    }

    pub fn len(&self) -> usize {
        self.inner.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cols.is_empty()
    }

    pub fn has_col(&self, label: &str) -> bool {
        col_idx(label, &self.inner.cols).is_some()
    }

    pub fn label_value(&self, label: &str) -> Option<&ScalarValue> {
        col_idx(label, &self.inner.cols).map(|idx| &self.inner.values[idx])
    }

    pub fn value(&self, idx: usize) -> Option<&ScalarValue> {
        self.inner.values.get(idx)
    }

    pub fn less(&self, other: &GroupKey) -> bool {
        self.cmp(other) == Ordering::Less
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state)
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.inner.cols.iter().zip(&self.inner.values);
        let right = other.inner.cols.iter().zip(&other.inner.values);
        for ((lc, lv), (rc, rv)) in left.zip(right) {
            let ord = lc
                .label
                .cmp(&rc.label)
                .then_with(|| lc.typ.cmp(&rc.typ))
                .then_with(|| lv.cmp(rv));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.len().cmp(&other.len())
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey{self}")
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (c, v)) in self.inner.cols.iter().zip(&self.inner.values).enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", c.label, v)?;
        }
        write!(f, "}}")
    }
}

/// Incrementally builds a group key.
#[derive(Debug, Default)]
pub struct GroupKeyBuilder {
    cols: Vec<ColMeta>,
    values: Vec<ScalarValue>,
}

impl GroupKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the columns of an existing key.
    pub fn from_key(key: &GroupKey) -> Self {
        GroupKeyBuilder {
            cols: key.cols().to_vec(),
            values: key.values().to_vec(),
        }
    }

    /// Add a key value. Errors if the value has no column type.
    pub fn add_key_value(&mut self, label: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let value = ScalarValue::try_from(value.into())?;
        self.cols.push(ColMeta::new(label, value.col_type()));
        self.values.push(value);
        Ok(())
    }

    pub fn build(self) -> Result<GroupKey> {
        GroupKey::try_new(self.cols, self.values)
    }
}
