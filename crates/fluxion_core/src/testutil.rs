//! Helpers for tests in this crate and in dependent crates.

use std::sync::Arc;

use fluxion_error::{DbError, Result};
use parking_lot::Mutex;

use crate::arrays::allocator::Allocator;
use crate::arrays::builder::TableBuilder;
use crate::arrays::coltype::{ColMeta, ColType};
use crate::arrays::group_key::{GroupKey, GroupKeyBuilder};
use crate::arrays::scalar::ScalarValue;
use crate::arrays::table::ColumnTable;
use crate::execution::transformation::{DatasetId, Transformation};
use crate::values::Value;
use crate::values::time::Time;

/// Build a table from rows.
///
/// The group key is taken from the first row's values of `key_cols`. An
/// empty `rows` with non-empty `key_cols` panics, use `table_with_key` for
/// empty keyed tables.
pub fn table_from_rows(
    key_cols: &[&str],
    cols: &[(&str, ColType)],
    rows: Vec<Vec<ScalarValue>>,
) -> ColumnTable {
    let mut kb = GroupKeyBuilder::new();
    for label in key_cols {
        let idx = cols
            .iter()
            .position(|(l, _)| l == label)
            .expect("key column in columns");
        let value = rows.first().expect("row for key values")[idx].clone();
        kb.add_key_value(*label, Value::from(value)).unwrap();
    }
    table_with_key(kb.build().unwrap(), cols, rows)
}

/// Build a table with an explicit group key.
pub fn table_with_key(
    key: GroupKey,
    cols: &[(&str, ColType)],
    rows: Vec<Vec<ScalarValue>>,
) -> ColumnTable {
    let alloc = Arc::new(Allocator::new());
    let mut b = TableBuilder::new(key, &alloc);
    for (label, typ) in cols {
        b.add_col(ColMeta::new(*label, *typ)).unwrap();
    }
    for row in rows {
        assert_eq!(cols.len(), row.len(), "row width");
        for (j, v) in row.iter().enumerate() {
            b.append_value(j, v).unwrap();
        }
    }
    b.table().unwrap()
}

/// All values of a table, row by row.
pub fn table_rows(table: &ColumnTable) -> Vec<Vec<ScalarValue>> {
    table
        .do_columns(|cr| {
            let mut rows = Vec::with_capacity(cr.len());
            for i in 0..cr.len() {
                let row = (0..cr.cols().len())
                    .map(|j| cr.value(i, j))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(row);
            }
            Ok(rows)
        })
        .unwrap()
}

/// Compare key, columns and values of two tables.
///
/// Reads the tables once each, so single-pass tables can be compared
/// directly.
pub fn assert_tables_equal(expected: &ColumnTable, got: &ColumnTable) {
    assert_eq!(expected.key(), got.key(), "group keys differ");
    assert_eq!(expected.cols(), got.cols(), "columns differ");
    assert_eq!(table_rows(expected), table_rows(got), "rows differ");
}

/// A call observed by a `RecordingTransformation`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Process {
        key: GroupKey,
        rows: usize,
        data: Vec<Vec<ScalarValue>>,
    },
    Retract(GroupKey),
    Watermark(Time),
    ProcessingTime(Time),
    /// Finish, with the error message if there was one.
    Finish(Option<String>),
}

impl RecordedCall {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordedCall::Process { .. } => "process",
            RecordedCall::Retract(_) => "retract",
            RecordedCall::Watermark(_) => "watermark",
            RecordedCall::ProcessingTime(_) => "processing_time",
            RecordedCall::Finish(_) => "finish",
        }
    }
}

/// Transformation that records every call it receives.
///
/// Clones share the recorded calls.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransformation {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_on_process: Option<String>,
}

impl RecordingTransformation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `process` call with `msg`. Failed calls are not recorded.
    pub fn fail_on_process(mut self, msg: impl Into<String>) -> Self {
        self.fail_on_process = Some(msg.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Tables received so far, as (key, rows) pairs.
    pub fn processed(&self) -> Vec<(GroupKey, Vec<Vec<ScalarValue>>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Process { key, data, .. } => Some((key.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Transformation for RecordingTransformation {
    fn retract_table(&mut self, _id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.calls.lock().push(RecordedCall::Retract(key.clone()));
        Ok(())
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        if let Some(msg) = &self.fail_on_process {
            return Err(DbError::new(msg.clone()));
        }
        let data = table_rows(&table);
        self.calls.lock().push(RecordedCall::Process {
            key: table.key().clone(),
            rows: table.num_rows(),
            data,
        });
        Ok(())
    }

    fn update_watermark(&mut self, _id: &DatasetId, mark: Time) -> Result<()> {
        self.calls.lock().push(RecordedCall::Watermark(mark));
        Ok(())
    }

    fn update_processing_time(&mut self, _id: &DatasetId, time: Time) -> Result<()> {
        self.calls.lock().push(RecordedCall::ProcessingTime(time));
        Ok(())
    }

    fn finish(&mut self, _id: &DatasetId, err: Option<DbError>) {
        self.calls
            .lock()
            .push(RecordedCall::Finish(err.map(|e| e.message().to_string())));
    }
}
