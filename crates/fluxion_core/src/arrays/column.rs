use std::cmp::Ordering;

use fluxion_error::{DbError, ErrorKind, Result};

use super::coltype::{ColMeta, ColType};
use super::physical::PhysicalType;
use super::scalar::ScalarValue;
use crate::values::time::Time;

/// Homogeneous typed storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    String(Vec<String>),
    Time(Vec<Time>),
}

impl ColumnBuffer {
    pub fn new(typ: ColType) -> Self {
        match typ {
            ColType::Bool => ColumnBuffer::Bool(Vec::new()),
            ColType::Int => ColumnBuffer::Int(Vec::new()),
            ColType::UInt => ColumnBuffer::UInt(Vec::new()),
            ColType::Float => ColumnBuffer::Float(Vec::new()),
            ColType::String => ColumnBuffer::String(Vec::new()),
            ColType::Time => ColumnBuffer::Time(Vec::new()),
        }
    }

    pub fn col_type(&self) -> ColType {
        match self {
            ColumnBuffer::Bool(_) => ColType::Bool,
            ColumnBuffer::Int(_) => ColType::Int,
            ColumnBuffer::UInt(_) => ColType::UInt,
            ColumnBuffer::Float(_) => ColType::Float,
            ColumnBuffer::String(_) => ColType::String,
            ColumnBuffer::Time(_) => ColType::Time,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuffer::Bool(v) => v.len(),
            ColumnBuffer::Int(v) => v.len(),
            ColumnBuffer::UInt(v) => v.len(),
            ColumnBuffer::Float(v) => v.len(),
            ColumnBuffer::String(v) => v.len(),
            ColumnBuffer::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match self {
            ColumnBuffer::Bool(v) => v.capacity(),
            ColumnBuffer::Int(v) => v.capacity(),
            ColumnBuffer::UInt(v) => v.capacity(),
            ColumnBuffer::Float(v) => v.capacity(),
            ColumnBuffer::String(v) => v.capacity(),
            ColumnBuffer::Time(v) => v.capacity(),
        }
    }

    /// Size in bytes of a single inline element.
    pub fn elem_size(&self) -> usize {
        match self {
            ColumnBuffer::Bool(_) => size_of::<bool>(),
            ColumnBuffer::Int(_) => size_of::<i64>(),
            ColumnBuffer::UInt(_) => size_of::<u64>(),
            ColumnBuffer::Float(_) => size_of::<f64>(),
            ColumnBuffer::String(_) => size_of::<String>(),
            ColumnBuffer::Time(_) => size_of::<Time>(),
        }
    }

    /// Bytes needed to hold exactly the current values.
    pub fn data_size(&self) -> usize {
        let heap = match self {
            ColumnBuffer::String(v) => v.iter().map(|s| s.len()).sum(),
            _ => 0,
        };
        self.len() * self.elem_size() + heap
    }

    pub fn value(&self, idx: usize) -> Option<ScalarValue> {
        Some(match self {
            ColumnBuffer::Bool(v) => ScalarValue::Bool(*v.get(idx)?),
            ColumnBuffer::Int(v) => ScalarValue::Int(*v.get(idx)?),
            ColumnBuffer::UInt(v) => ScalarValue::UInt(*v.get(idx)?),
            ColumnBuffer::Float(v) => ScalarValue::Float(*v.get(idx)?),
            ColumnBuffer::String(v) => ScalarValue::String(v.get(idx)?.clone()),
            ColumnBuffer::Time(v) => ScalarValue::Time(*v.get(idx)?),
        })
    }

    /// Reorder values so position `i` holds the value previously at
    /// `indices[i]`.
    pub fn permute(&mut self, indices: &[usize]) {
        fn apply<T: Clone>(v: &mut Vec<T>, indices: &[usize]) {
            let permuted: Vec<T> = indices.iter().map(|&i| v[i].clone()).collect();
            *v = permuted;
        }
        match self {
            ColumnBuffer::Bool(v) => apply(v, indices),
            ColumnBuffer::Int(v) => apply(v, indices),
            ColumnBuffer::UInt(v) => apply(v, indices),
            ColumnBuffer::Float(v) => apply(v, indices),
            ColumnBuffer::String(v) => apply(v, indices),
            ColumnBuffer::Time(v) => apply(v, indices),
        }
    }

    /// Compare the values at two row positions.
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        match self {
            ColumnBuffer::Bool(v) => v[a].cmp(&v[b]),
            ColumnBuffer::Int(v) => v[a].cmp(&v[b]),
            ColumnBuffer::UInt(v) => v[a].cmp(&v[b]),
            ColumnBuffer::Float(v) => v[a].total_cmp(&v[b]),
            ColumnBuffer::String(v) => v[a].cmp(&v[b]),
            ColumnBuffer::Time(v) => v[a].cmp(&v[b]),
        }
    }

    pub fn reserve_exact(&mut self, additional: usize) {
        match self {
            ColumnBuffer::Bool(v) => v.reserve_exact(additional),
            ColumnBuffer::Int(v) => v.reserve_exact(additional),
            ColumnBuffer::UInt(v) => v.reserve_exact(additional),
            ColumnBuffer::Float(v) => v.reserve_exact(additional),
            ColumnBuffer::String(v) => v.reserve_exact(additional),
            ColumnBuffer::Time(v) => v.reserve_exact(additional),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            ColumnBuffer::Bool(v) => v.truncate(len),
            ColumnBuffer::Int(v) => v.truncate(len),
            ColumnBuffer::UInt(v) => v.truncate(len),
            ColumnBuffer::Float(v) => v.truncate(len),
            ColumnBuffer::String(v) => v.truncate(len),
            ColumnBuffer::Time(v) => v.truncate(len),
        }
    }

    /// Get the typed values for this buffer.
    ///
    /// Errors with `ColumnTypeMismatch` if `S` is not the buffer's type.
    pub fn try_as<S: PhysicalType>(&self, label: &str) -> Result<&[S::Native]> {
        S::get(self).ok_or_else(|| type_mismatch(label, S::COL_TYPE, self.col_type()))
    }
}

pub(crate) fn type_mismatch(label: &str, want: ColType, got: ColType) -> DbError {
    DbError::new("Column type mismatch")
        .with_kind(ErrorKind::ColumnTypeMismatch)
        .with_field("column", label)
        .with_field("want", want)
        .with_field("got", got)
}

pub(crate) fn check_col_type(meta: &ColMeta, want: ColType) -> Result<()> {
    if meta.typ != want {
        return Err(type_mismatch(&meta.label, want, meta.typ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::physical::{PhysicalFloat, PhysicalInt};

    #[test]
    fn typed_access() {
        let buf = ColumnBuffer::Int(vec![1, 2, 3]);
        assert_eq!(&[1, 2, 3], buf.try_as::<PhysicalInt>("a").unwrap());

        let err = buf.try_as::<PhysicalFloat>("a").unwrap_err();
        assert_eq!(ErrorKind::ColumnTypeMismatch, err.kind());
        assert_eq!(Some("a"), err.field("column"));
        assert_eq!(Some("float"), err.field("want"));
        assert_eq!(Some("int"), err.field("got"));
    }

    #[test]
    fn permute_values() {
        let mut buf = ColumnBuffer::String(vec!["a".into(), "b".into(), "c".into()]);
        buf.permute(&[2, 0, 1]);
        assert_eq!(
            ColumnBuffer::String(vec!["c".into(), "a".into(), "b".into()]),
            buf
        );
    }

    #[test]
    fn data_size_includes_strings() {
        let buf = ColumnBuffer::String(vec!["abc".into()]);
        assert_eq!(size_of::<String>() + 3, buf.data_size());
    }
}
