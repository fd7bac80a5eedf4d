//! Helpers for moving data between tables and builders.

use fluxion_error::{DbError, Result};

use super::builder::TableBuilder;
use super::column::ColumnBuffer;
use super::group_key::GroupKey;
use super::scalar::ScalarValue;
use super::table::{ColumnReader, ColumnTable};

/// Add all columns from a table to the builder.
pub fn add_table_cols(table: &ColumnTable, builder: &mut TableBuilder) -> Result<()> {
    for col in table.cols() {
        builder.add_col(col.clone())?;
    }
    Ok(())
}

/// Add columns from the table that the builder does not have yet.
pub fn add_new_table_cols(table: &ColumnTable, builder: &mut TableBuilder) -> Result<()> {
    for col in table.cols() {
        if builder.col_idx(&col.label).is_none() {
            builder.add_col(col.clone())?;
        }
    }
    Ok(())
}

/// Append every row of the table to the builder.
///
/// Builder columns are matched by label, and a builder column missing from
/// the table is an error.
pub fn append_table(table: &ColumnTable, builder: &mut TableBuilder) -> Result<()> {
    table.do_columns(|cr| append_columns(cr, builder))
}

pub fn append_columns(cr: &ColumnReader<'_>, builder: &mut TableBuilder) -> Result<()> {
    let cols = builder.cols().to_vec();
    for (j, col) in cols.iter().enumerate() {
        let idx = super::coltype::col_idx(&col.label, cr.cols())
            .ok_or_else(|| DbError::new("Table missing column").with_field("column", &col.label))?;
        append_buffer(cr.column(idx)?, j, builder, &col.label)?;
    }
    Ok(())
}

fn append_buffer(
    buffer: &ColumnBuffer,
    j: usize,
    builder: &mut TableBuilder,
    label: &str,
) -> Result<()> {
    match buffer {
        ColumnBuffer::Bool(v) => builder.append_bools(j, v),
        ColumnBuffer::Int(v) => builder.append_ints(j, v),
        ColumnBuffer::UInt(v) => builder.append_uints(j, v),
        ColumnBuffer::Float(v) => builder.append_floats(j, v),
        ColumnBuffer::String(v) => builder.append_strings(j, v),
        ColumnBuffer::Time(v) => builder.append_times(j, v),
    }
    .map_err(|e| e.with_field("append_column", label))
}

/// Append a subset of rows from a reader, in the order given.
pub fn append_rows(
    cr: &ColumnReader<'_>,
    rows: &[usize],
    builder: &mut TableBuilder,
) -> Result<()> {
    let cols = builder.cols().to_vec();
    for (j, col) in cols.iter().enumerate() {
        let idx = super::coltype::col_idx(&col.label, cr.cols())
            .ok_or_else(|| DbError::new("Table missing column").with_field("column", &col.label))?;
        let mut buffer = cr.column(idx)?.clone();
        buffer.permute(rows);
        append_buffer(&buffer, j, builder, &col.label)?;
    }
    Ok(())
}

/// Append the group key values for `n` rows to every key column.
pub fn append_key_values(key: &GroupKey, builder: &mut TableBuilder, n: usize) -> Result<()> {
    for (col, value) in key.cols().iter().zip(key.values()) {
        let j = builder
            .col_idx(&col.label)
            .ok_or_else(|| DbError::new("Builder missing key column").with_field("column", &col.label))?;
        builder.append_repeated(j, value, n)?;
    }
    Ok(())
}

/// Value of column `j` at row `i`.
pub fn value_for_row(cr: &ColumnReader<'_>, i: usize, j: usize) -> Result<ScalarValue> {
    cr.value(i, j)
}

/// Copy a table into a new, independent table.
///
/// Reading a single-pass table here consumes it.
pub fn copy_table(table: &ColumnTable, builder: &mut TableBuilder) -> Result<ColumnTable> {
    add_table_cols(table, builder)?;
    append_table(table, builder)?;
    builder.table()
}

/// Check that two tables hold equal keys, columns and values.
///
/// Both tables are read, so neither may be an already consumed single-pass
/// table.
pub fn tables_equal(left: &ColumnTable, right: &ColumnTable) -> Result<bool> {
    if left.key() != right.key() || left.cols() != right.cols() {
        return Ok(false);
    }
    left.do_columns(|l| {
        right.do_columns(|r| {
            if l.len() != r.len() {
                return Ok(false);
            }
            for j in 0..l.cols().len() {
                if l.column(j)? != r.column(j)? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    })
}
