use std::cmp::Ordering;
use std::sync::Arc;

use fluxion_error::{DbError, Result};

use super::allocator::{Allocator, Reservation};
use super::coltype::{ColMeta, ColType, col_idx};
use super::column::{ColumnBuffer, check_col_type};
use super::group_key::GroupKey;
use super::physical::{
    PhysicalBool, PhysicalFloat, PhysicalInt, PhysicalString, PhysicalTime, PhysicalType,
    PhysicalUInt,
};
use super::scalar::ScalarValue;
use super::table::{ColumnTable, TableData};
use crate::values::time::Time;

/// Smallest capacity allocated for a column once it holds any value.
const MIN_CAPACITY: usize = 8;

/// Mutable construction path for column tables.
///
/// Columns are added first, then values are appended per column. Every
/// buffer growth is accounted against the allocator before it happens.
#[derive(Debug)]
pub struct TableBuilder {
    key: GroupKey,
    cols: Vec<ColMeta>,
    columns: Vec<ColumnBuffer>,
    reservation: Reservation,
}

impl TableBuilder {
    pub fn new(key: GroupKey, allocator: &Arc<Allocator>) -> Self {
        TableBuilder {
            key,
            cols: Vec::new(),
            columns: Vec::new(),
            reservation: Reservation::new(allocator),
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    /// Number of rows, the length of the first column.
    ///
    /// Use `check_columns` to verify every column has this length.
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn col_idx(&self, label: &str) -> Option<usize> {
        col_idx(label, &self.cols)
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        self.reservation.allocator()
    }

    /// Bytes currently accounted to this builder.
    pub fn reserved_bytes(&self) -> usize {
        self.reservation.bytes()
    }

    /// Add a column, returning its index.
    pub fn add_col(&mut self, meta: ColMeta) -> Result<usize> {
        if self.col_idx(&meta.label).is_some() {
            return Err(DbError::new("Table builder already has column")
                .with_field("column", &meta.label));
        }
        self.columns.push(ColumnBuffer::new(meta.typ));
        self.cols.push(meta);
        Ok(self.cols.len() - 1)
    }

    fn check_col<S: PhysicalType>(&self, j: usize) -> Result<()> {
        let meta = self.cols.get(j).ok_or_else(|| {
            DbError::new("Column index out of range")
                .with_field("index", j)
                .with_field("columns", self.cols.len())
        })?;
        check_col_type(meta, S::COL_TYPE)
    }

    fn values_mut<S: PhysicalType>(&mut self, j: usize) -> Result<&mut Vec<S::Native>> {
        self.check_col::<S>(j)?;
        let label = &self.cols[j].label;
        let col_type = self.columns[j].col_type();
        S::get_mut(&mut self.columns[j])
            .ok_or_else(|| super::column::type_mismatch(label, S::COL_TYPE, col_type))
    }

    /// Account for room for `additional` more values in column `j` plus
    /// `heap` bytes of out-of-line data.
    fn reserve(&mut self, j: usize, additional: usize, heap: usize) -> Result<()> {
        let col = &mut self.columns[j];
        let len = col.len();
        let cap = col.capacity();
        let needed = len + additional;

        let mut bytes = heap;
        let mut new_cap = cap;
        if needed > cap {
            new_cap = needed.max(cap * 2).max(MIN_CAPACITY);
            bytes += (new_cap - cap) * col.elem_size();
        }
        self.reservation.grow(bytes)?;
        if new_cap > cap {
            self.columns[j].reserve_exact(new_cap - len);
        }
        Ok(())
    }

    pub fn append<S: PhysicalType>(&mut self, j: usize, value: S::Native) -> Result<()> {
        self.check_col::<S>(j)?;
        self.reserve(j, 1, S::heap_size(&value))?;
        self.values_mut::<S>(j)?.push(value);
        Ok(())
    }

    pub fn append_values<S: PhysicalType>(&mut self, j: usize, values: &[S::Native]) -> Result<()> {
        self.check_col::<S>(j)?;
        let heap = values.iter().map(S::heap_size).sum();
        self.reserve(j, values.len(), heap)?;
        self.values_mut::<S>(j)?.extend_from_slice(values);
        Ok(())
    }

    /// Append `n` zero values to column `j`.
    pub fn grow<S: PhysicalType>(&mut self, j: usize, n: usize) -> Result<()> {
        self.check_col::<S>(j)?;
        self.reserve(j, n, 0)?;
        let values = self.values_mut::<S>(j)?;
        values.resize(values.len() + n, S::Native::default());
        Ok(())
    }

    /// Overwrite the value at row `i` of column `j`.
    pub fn set<S: PhysicalType>(&mut self, i: usize, j: usize, value: S::Native) -> Result<()> {
        self.check_col::<S>(j)?;
        let len = self.columns[j].len();
        if i >= len {
            return Err(DbError::new("Row index out of range")
                .with_field("row", i)
                .with_field("rows", len));
        }
        let new_heap = S::heap_size(&value);
        self.reservation.grow(new_heap)?;
        let values = self.values_mut::<S>(j)?;
        let old = std::mem::replace(&mut values[i], value);
        self.reservation.shrink(S::heap_size(&old));
        Ok(())
    }

    pub fn append_bool(&mut self, j: usize, value: bool) -> Result<()> {
        self.append::<PhysicalBool>(j, value)
    }

    pub fn append_int(&mut self, j: usize, value: i64) -> Result<()> {
        self.append::<PhysicalInt>(j, value)
    }

    pub fn append_uint(&mut self, j: usize, value: u64) -> Result<()> {
        self.append::<PhysicalUInt>(j, value)
    }

    pub fn append_float(&mut self, j: usize, value: f64) -> Result<()> {
        self.append::<PhysicalFloat>(j, value)
    }

    pub fn append_string(&mut self, j: usize, value: &str) -> Result<()> {
        self.append::<PhysicalString>(j, value.to_string())
    }

    pub fn append_time(&mut self, j: usize, value: Time) -> Result<()> {
        self.append::<PhysicalTime>(j, value)
    }

    pub fn append_bools(&mut self, j: usize, values: &[bool]) -> Result<()> {
        self.append_values::<PhysicalBool>(j, values)
    }

    pub fn append_ints(&mut self, j: usize, values: &[i64]) -> Result<()> {
        self.append_values::<PhysicalInt>(j, values)
    }

    pub fn append_uints(&mut self, j: usize, values: &[u64]) -> Result<()> {
        self.append_values::<PhysicalUInt>(j, values)
    }

    pub fn append_floats(&mut self, j: usize, values: &[f64]) -> Result<()> {
        self.append_values::<PhysicalFloat>(j, values)
    }

    pub fn append_strings(&mut self, j: usize, values: &[String]) -> Result<()> {
        self.append_values::<PhysicalString>(j, values)
    }

    pub fn append_times(&mut self, j: usize, values: &[Time]) -> Result<()> {
        self.append_values::<PhysicalTime>(j, values)
    }

    pub fn grow_bools(&mut self, j: usize, n: usize) -> Result<()> {
        self.grow::<PhysicalBool>(j, n)
    }

    pub fn grow_ints(&mut self, j: usize, n: usize) -> Result<()> {
        self.grow::<PhysicalInt>(j, n)
    }

    pub fn grow_uints(&mut self, j: usize, n: usize) -> Result<()> {
        self.grow::<PhysicalUInt>(j, n)
    }

    pub fn grow_floats(&mut self, j: usize, n: usize) -> Result<()> {
        self.grow::<PhysicalFloat>(j, n)
    }

    pub fn grow_strings(&mut self, j: usize, n: usize) -> Result<()> {
        self.grow::<PhysicalString>(j, n)
    }

    pub fn grow_times(&mut self, j: usize, n: usize) -> Result<()> {
        self.grow::<PhysicalTime>(j, n)
    }

    pub fn set_bool(&mut self, i: usize, j: usize, value: bool) -> Result<()> {
        self.set::<PhysicalBool>(i, j, value)
    }

    pub fn set_int(&mut self, i: usize, j: usize, value: i64) -> Result<()> {
        self.set::<PhysicalInt>(i, j, value)
    }

    pub fn set_uint(&mut self, i: usize, j: usize, value: u64) -> Result<()> {
        self.set::<PhysicalUInt>(i, j, value)
    }

    pub fn set_float(&mut self, i: usize, j: usize, value: f64) -> Result<()> {
        self.set::<PhysicalFloat>(i, j, value)
    }

    pub fn set_string(&mut self, i: usize, j: usize, value: &str) -> Result<()> {
        self.set::<PhysicalString>(i, j, value.to_string())
    }

    pub fn set_time(&mut self, i: usize, j: usize, value: Time) -> Result<()> {
        self.set::<PhysicalTime>(i, j, value)
    }

    /// Append a dynamically typed value, which must match the column type.
    pub fn append_value(&mut self, j: usize, value: &ScalarValue) -> Result<()> {
        match value {
            ScalarValue::Bool(v) => self.append_bool(j, *v),
            ScalarValue::Int(v) => self.append_int(j, *v),
            ScalarValue::UInt(v) => self.append_uint(j, *v),
            ScalarValue::Float(v) => self.append_float(j, *v),
            ScalarValue::String(v) => self.append_string(j, v),
            ScalarValue::Time(v) => self.append_time(j, *v),
        }
    }

    pub fn set_value(&mut self, i: usize, j: usize, value: &ScalarValue) -> Result<()> {
        match value {
            ScalarValue::Bool(v) => self.set_bool(i, j, *v),
            ScalarValue::Int(v) => self.set_int(i, j, *v),
            ScalarValue::UInt(v) => self.set_uint(i, j, *v),
            ScalarValue::Float(v) => self.set_float(i, j, *v),
            ScalarValue::String(v) => self.set_string(i, j, v),
            ScalarValue::Time(v) => self.set_time(i, j, *v),
        }
    }

    /// Append the same value `n` times.
    pub fn append_repeated(&mut self, j: usize, value: &ScalarValue, n: usize) -> Result<()> {
        match value {
            ScalarValue::Bool(v) => self.append_bools(j, &vec![*v; n]),
            ScalarValue::Int(v) => self.append_ints(j, &vec![*v; n]),
            ScalarValue::UInt(v) => self.append_uints(j, &vec![*v; n]),
            ScalarValue::Float(v) => self.append_floats(j, &vec![*v; n]),
            ScalarValue::String(v) => self.append_strings(j, &vec![v.clone(); n]),
            ScalarValue::Time(v) => self.append_times(j, &vec![*v; n]),
        }
    }

    /// Check that every column has the same length.
    pub fn check_columns(&self) -> Result<()> {
        let num_rows = self.num_rows();
        for (meta, col) in self.cols.iter().zip(&self.columns) {
            if col.len() != num_rows {
                return Err(DbError::new("Table builder columns have uneven lengths")
                    .with_field("column", &meta.label)
                    .with_field("len", col.len())
                    .with_field("expected", num_rows));
            }
        }
        Ok(())
    }

    /// Pad short columns with zero values up to the longest column.
    pub fn level_columns(&mut self) -> Result<()> {
        let max = self.columns.iter().map(|c| c.len()).max().unwrap_or(0);
        for j in 0..self.columns.len() {
            let n = max - self.columns[j].len();
            if n == 0 {
                continue;
            }
            match self.cols[j].typ {
                ColType::Bool => self.grow_bools(j, n)?,
                ColType::Int => self.grow_ints(j, n)?,
                ColType::UInt => self.grow_uints(j, n)?,
                ColType::Float => self.grow_floats(j, n)?,
                ColType::String => self.grow_strings(j, n)?,
                ColType::Time => self.grow_times(j, n)?,
            }
        }
        Ok(())
    }

    /// Stable sort of the rows by the given column labels.
    ///
    /// Labels not present in the table are ignored. All columns are
    /// permuted together.
    pub fn sort(&mut self, labels: &[&str], desc: bool) -> Result<()> {
        self.check_columns()?;
        let sort_cols: Vec<usize> = labels.iter().filter_map(|l| self.col_idx(l)).collect();
        if sort_cols.is_empty() {
            return Ok(());
        }

        let mut perm: Vec<usize> = (0..self.num_rows()).collect();
        perm.sort_by(|&a, &b| {
            for &j in &sort_cols {
                let ord = self.columns[j].compare(a, b);
                if ord != Ordering::Equal {
                    return if desc { ord.reverse() } else { ord };
                }
            }
            Ordering::Equal
        });

        for col in &mut self.columns {
            col.permute(&perm);
        }
        Ok(())
    }

    /// Remove all rows, keeping the columns.
    ///
    /// Buffer capacity is kept (and stays accounted) so the next batch
    /// under the same schema does not reallocate.
    pub fn clear_data(&mut self) {
        let heap: usize = self
            .columns
            .iter()
            .map(|c| match c {
                ColumnBuffer::String(v) => v.iter().map(|s| s.len()).sum(),
                _ => 0,
            })
            .sum();
        self.reservation.shrink(heap);
        for col in &mut self.columns {
            col.truncate(0);
        }
    }

    /// Finalize a snapshot of the current contents.
    ///
    /// The snapshot owns a copy of the data, later builder mutations do not
    /// affect it.
    pub fn table(&self) -> Result<ColumnTable> {
        self.check_columns()?;
        for (key_col, key_val) in self.key.cols().iter().zip(self.key.values()) {
            match self.col_idx(&key_col.label) {
                Some(j) => {
                    check_col_type(&self.cols[j], key_val.col_type())?;
                }
                None => {
                    return Err(DbError::new("Group key column missing from table")
                        .with_field("column", &key_col.label));
                }
            }
        }

        let size: usize = self.columns.iter().map(|c| c.data_size()).sum();
        let mut reservation = Reservation::new(self.reservation.allocator());
        reservation.grow(size)?;

        Ok(ColumnTable::from_data(TableData {
            key: self.key.clone(),
            cols: self.cols.clone(),
            columns: self.columns.clone(),
            num_rows: self.num_rows(),
            _reservation: reservation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::group_key::GroupKeyBuilder;
    use crate::values::Value;

    fn builder(alloc: &Arc<Allocator>) -> TableBuilder {
        TableBuilder::new(GroupKey::empty(), alloc)
    }

    #[test]
    fn num_rows_matches_columns() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let t = b.add_col(ColMeta::new("_time", ColType::Time)).unwrap();
        let v = b.add_col(ColMeta::new("_value", ColType::Float)).unwrap();
        let s = b.add_col(ColMeta::new("host", ColType::String)).unwrap();

        for i in 0..20 {
            b.append_time(t, Time(i)).unwrap();
            b.append_float(v, i as f64).unwrap();
            b.append_string(s, "a").unwrap();
        }
        b.append_times(t, &[Time(100), Time(101)]).unwrap();
        b.append_floats(v, &[1.0, 2.0]).unwrap();
        b.grow_strings(s, 2).unwrap();

        b.check_columns().unwrap();
        assert_eq!(22, b.num_rows());
    }

    #[test]
    fn uneven_columns_detected() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let a = b.add_col(ColMeta::new("a", ColType::Int)).unwrap();
        let c = b.add_col(ColMeta::new("b", ColType::Int)).unwrap();
        b.append_int(a, 1).unwrap();
        b.append_int(a, 2).unwrap();
        b.append_int(c, 1).unwrap();

        b.check_columns().unwrap_err();
        b.table().unwrap_err();

        b.level_columns().unwrap();
        b.check_columns().unwrap();
        let table = b.table().unwrap();
        table
            .do_columns(|cr| {
                assert_eq!(&[1, 0], cr.ints(1)?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn append_wrong_type() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let j = b.add_col(ColMeta::new("x", ColType::Bool)).unwrap();
        let err = b.append_int(j, 1).unwrap_err();
        assert!(err.is_eval_error());
        b.append_int(5, 1).unwrap_err();
    }

    #[test]
    fn duplicate_column() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        b.add_col(ColMeta::new("x", ColType::Bool)).unwrap();
        b.add_col(ColMeta::new("x", ColType::Int)).unwrap_err();
    }

    #[test]
    fn set_values() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let j = b.add_col(ColMeta::new("s", ColType::String)).unwrap();
        b.append_string(j, "abc").unwrap();
        b.set_string(0, j, "z").unwrap();
        b.set_string(1, j, "z").unwrap_err();
        let table = b.table().unwrap();
        table
            .do_columns(|cr| {
                assert_eq!(&["z".to_string()], cr.strings(0)?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn finalized_table_unaffected_by_later_mutation() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let j = b.add_col(ColMeta::new("_value", ColType::Int)).unwrap();
        b.append_ints(j, &[1, 2]).unwrap();

        let first = b.table().unwrap();
        b.set_int(0, j, 10).unwrap();
        b.append_int(j, 3).unwrap();
        let second = b.table().unwrap();

        first
            .do_columns(|cr| {
                assert_eq!(&[1, 2], cr.ints(0)?);
                Ok(())
            })
            .unwrap();
        second
            .do_columns(|cr| {
                assert_eq!(&[10, 2, 3], cr.ints(0)?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn stable_multi_column_sort() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let host = b.add_col(ColMeta::new("host", ColType::String)).unwrap();
        let val = b.add_col(ColMeta::new("_value", ColType::Int)).unwrap();
        let seq = b.add_col(ColMeta::new("seq", ColType::Int)).unwrap();

        let rows = [("b", 1, 0), ("a", 2, 1), ("b", 1, 2), ("a", 1, 3)];
        for (h, v, s) in rows {
            b.append_string(host, h).unwrap();
            b.append_int(val, v).unwrap();
            b.append_int(seq, s).unwrap();
        }

        b.sort(&["host", "_value"], false).unwrap();
        let table = b.table().unwrap();
        table
            .do_columns(|cr| {
                assert_eq!(&["a", "a", "b", "b"], cr.strings(0)?);
                assert_eq!(&[1, 2, 1, 1], cr.ints(1)?);
                // Ties keep append order.
                assert_eq!(&[3, 1, 0, 2], cr.ints(2)?);
                Ok(())
            })
            .unwrap();

        b.sort(&["_value"], true).unwrap();
        let table = b.table().unwrap();
        table
            .do_columns(|cr| {
                assert_eq!(&[2, 1, 1, 1], cr.ints(1)?);
                assert_eq!(&[1, 3, 0, 2], cr.ints(2)?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn clear_data_keeps_schema() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let j = b.add_col(ColMeta::new("s", ColType::String)).unwrap();
        b.append_string(j, "hello").unwrap();
        let before = alloc.allocated();

        b.clear_data();
        assert_eq!(0, b.num_rows());
        assert_eq!(1, b.num_cols());
        assert_eq!(before - 5, alloc.allocated());

        b.append_string(j, "x").unwrap();
        assert_eq!(1, b.num_rows());
    }

    #[test]
    fn allocation_limit_exceeded() {
        let alloc = Arc::new(Allocator::with_limit(64));
        let mut b = builder(&alloc);
        let j = b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
        b.append_ints(j, &[1; 8]).unwrap();
        let err = b.append_ints(j, &[1; 8]).unwrap_err();
        assert_eq!(fluxion_error::ErrorKind::ResourceExhausted, err.kind());
    }

    #[test]
    fn builder_memory_released_on_drop() {
        let alloc = Arc::new(Allocator::new());
        let mut b = builder(&alloc);
        let j = b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
        b.append_ints(j, &[1, 2, 3]).unwrap();
        assert!(alloc.allocated() > 0);
        drop(b);
        assert_eq!(0, alloc.allocated());
    }

    #[test]
    fn missing_key_column() {
        let alloc = Arc::new(Allocator::new());
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("host", Value::from("a")).unwrap();
        let key = kb.build().unwrap();

        let mut b = TableBuilder::new(key, &alloc);
        b.add_col(ColMeta::new("_value", ColType::Float)).unwrap();
        b.table().unwrap_err();
    }
}
