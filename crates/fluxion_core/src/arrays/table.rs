use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fluxion_error::{DbError, Result};

use super::allocator::Reservation;
use super::coltype::{ColMeta, col_idx};
use super::column::ColumnBuffer;
use super::group_key::GroupKey;
use super::physical::{
    PhysicalBool, PhysicalFloat, PhysicalInt, PhysicalString, PhysicalTime, PhysicalType,
    PhysicalUInt,
};
use super::scalar::ScalarValue;
use crate::values::time::Time;

/// Finalized, immutable table data.
#[derive(Debug)]
pub(crate) struct TableData {
    pub(crate) key: GroupKey,
    pub(crate) cols: Vec<ColMeta>,
    pub(crate) columns: Vec<ColumnBuffer>,
    pub(crate) num_rows: usize,
    /// Memory for this table, returned to the allocator when the last
    /// handle to the table is dropped.
    pub(crate) _reservation: Reservation,
}

/// A group keyed batch of rows exchanged between operators.
///
/// Cloning is cheap and shares the underlying data. All reads go through
/// `do_columns`. A single-pass table can be read once; callers that need
/// to read more than once must `materialize` first.
#[derive(Debug, Clone)]
pub struct ColumnTable {
    data: Arc<TableData>,
    /// Set for single-pass tables, flipped on first read.
    consumed: Option<Arc<AtomicBool>>,
}

impl ColumnTable {
    pub(crate) fn from_data(data: TableData) -> Self {
        ColumnTable {
            data: Arc::new(data),
            consumed: None,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.data.key
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.data.cols
    }

    pub fn num_rows(&self) -> usize {
        self.data.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.data.num_rows == 0
    }

    pub fn col_idx(&self, label: &str) -> Option<usize> {
        col_idx(label, &self.data.cols)
    }

    /// Mark this table as readable only once.
    pub fn into_single_pass(self) -> Self {
        ColumnTable {
            data: self.data,
            consumed: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn is_single_pass(&self) -> bool {
        self.consumed.is_some()
    }

    /// Read the table's columns.
    ///
    /// Errors if this is a single-pass table that has already been read.
    pub fn do_columns<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ColumnReader<'_>) -> Result<T>,
    {
        if let Some(consumed) = &self.consumed {
            if consumed.swap(true, Ordering::AcqRel) {
                return Err(DbError::new("Single-pass table already consumed")
                    .with_field("key", self.key()));
            }
        }
        f(&ColumnReader { data: &self.data })
    }

    /// Get a reusable handle to this table's data.
    ///
    /// For a single-pass table this counts as its one read.
    pub fn materialize(&self) -> Result<ColumnTable> {
        self.do_columns(|_| Ok(()))?;
        Ok(ColumnTable {
            data: self.data.clone(),
            consumed: None,
        })
    }

    /// Bytes held by this table.
    pub fn size_bytes(&self) -> usize {
        self.data._reservation.bytes()
    }
}

/// Typed read access to a table's columns.
#[derive(Debug, Clone, Copy)]
pub struct ColumnReader<'a> {
    data: &'a TableData,
}

impl<'a> ColumnReader<'a> {
    pub fn key(&self) -> &'a GroupKey {
        &self.data.key
    }

    pub fn cols(&self) -> &'a [ColMeta] {
        &self.data.cols
    }

    pub fn len(&self) -> usize {
        self.data.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.data.num_rows == 0
    }

    pub fn column(&self, j: usize) -> Result<&'a ColumnBuffer> {
        self.data.columns.get(j).ok_or_else(|| {
            DbError::new("Column index out of range")
                .with_field("index", j)
                .with_field("columns", self.data.columns.len())
        })
    }

    /// Typed values for column `j`.
    pub fn values<S: PhysicalType>(&self, j: usize) -> Result<&'a [S::Native]> {
        let col = self.column(j)?;
        col.try_as::<S>(&self.data.cols[j].label)
    }

    pub fn bools(&self, j: usize) -> Result<&'a [bool]> {
        self.values::<PhysicalBool>(j)
    }

    pub fn ints(&self, j: usize) -> Result<&'a [i64]> {
        self.values::<PhysicalInt>(j)
    }

    pub fn uints(&self, j: usize) -> Result<&'a [u64]> {
        self.values::<PhysicalUInt>(j)
    }

    pub fn floats(&self, j: usize) -> Result<&'a [f64]> {
        self.values::<PhysicalFloat>(j)
    }

    pub fn strings(&self, j: usize) -> Result<&'a [String]> {
        self.values::<PhysicalString>(j)
    }

    pub fn times(&self, j: usize) -> Result<&'a [Time]> {
        self.values::<PhysicalTime>(j)
    }

    /// Value at row `i` of column `j`.
    pub fn value(&self, i: usize, j: usize) -> Result<ScalarValue> {
        self.column(j)?.value(i).ok_or_else(|| {
            DbError::new("Row index out of range")
                .with_field("row", i)
                .with_field("rows", self.data.num_rows)
        })
    }
}
