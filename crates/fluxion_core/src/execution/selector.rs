//! Select rows out of every table.
//!
//! Index selectors pick row positions from the value column and copy those
//! rows across all columns. Row selectors keep whole rows as they go and
//! hand back the final set.

use std::fmt::Debug;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

use super::aggregate::DEFAULT_VALUE_COL_LABEL;
use super::dataset::{AccumulationMode, Dataset};
use super::registry::ExecutionContext;
use super::transformation::{DatasetId, Downstream, Transformation};
use crate::arrays::builder::TableBuilder;
use crate::arrays::coltype::ColType;
use crate::arrays::group_key::GroupKey;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::table::{ColumnReader, ColumnTable};
use crate::arrays::util::{add_table_cols, append_rows};
use crate::values::time::Time;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub column: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig {
            column: DEFAULT_VALUE_COL_LABEL.to_string(),
        }
    }
}

pub trait IndexSelector: Debug + Sync + Send {
    fn new_state(&self, typ: ColType) -> Option<Box<dyn IndexSelectorState>>;
}

pub trait IndexSelectorState: Debug + Send {
    /// Positions of the selected rows, read from column `j`.
    fn select(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<Vec<usize>>;
}

pub trait RowSelector: Debug + Sync + Send {
    fn new_state(&self, typ: ColType) -> Option<Box<dyn RowSelectorState>>;
}

pub trait RowSelectorState: Debug + Send {
    /// Consider the rows of `cr`, using column `j` as the value column.
    fn update(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<()>;

    /// The selected rows, in output order.
    fn rows(&self) -> Vec<Row>;
}

/// A row of values in table column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<ScalarValue>,
}

/// Read row `i` across all columns.
pub fn read_row(i: usize, cr: &ColumnReader<'_>) -> Result<Row> {
    let values = (0..cr.cols().len())
        .map(|j| cr.value(i, j))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row { values })
}

fn unsupported(column: &str, typ: ColType) -> DbError {
    DbError::new("Unsupported selector type")
        .with_kind(ErrorKind::UnsupportedSelectorType)
        .with_field("column", column)
        .with_field("type", typ)
}

/// Dataset and key handling shared by both selector flavors.
#[derive(Debug)]
struct SelectorBase {
    dataset: Dataset,
    config: SelectorConfig,
}

impl SelectorBase {
    /// Index and type of the configured value column.
    fn value_column(&self, table: &ColumnTable) -> Result<(usize, ColType)> {
        let value_idx = table.col_idx(&self.config.column).ok_or_else(|| {
            DbError::new("Selector column does not exist")
                .with_kind(ErrorKind::ColumnNotFound)
                .with_field("column", &self.config.column)
        })?;
        Ok((value_idx, table.cols()[value_idx].typ))
    }

    /// Create the builder for the table's key.
    fn new_builder(&mut self, table: &ColumnTable) -> Result<&mut TableBuilder> {
        let key = table.key();
        let (builder, created) = self.dataset.table_builder(key);
        if !created {
            return Err(DbError::new("Selector found duplicate table").with_field("key", key));
        }
        add_table_cols(table, builder)?;
        Ok(builder)
    }
}

#[derive(Debug)]
pub struct IndexSelectorTransformation {
    base: SelectorBase,
    selector: Arc<dyn IndexSelector>,
}

impl IndexSelectorTransformation {
    pub fn new(dataset: Dataset, selector: Arc<dyn IndexSelector>, config: SelectorConfig) -> Self {
        IndexSelectorTransformation {
            base: SelectorBase { dataset, config },
            selector,
        }
    }

    pub fn new_with_dataset(
        id: DatasetId,
        mode: AccumulationMode,
        selector: Arc<dyn IndexSelector>,
        config: SelectorConfig,
        ctx: &ExecutionContext,
    ) -> (Self, Downstream) {
        let dataset = ctx.new_dataset(id, mode);
        let downstream = dataset.downstream().clone();
        (Self::new(dataset, selector, config), downstream)
    }
}

impl Transformation for IndexSelectorTransformation {
    fn retract_table(&mut self, _id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.base.dataset.retract_table(key)
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        let (value_idx, typ) = self.base.value_column(&table)?;
        let mut state = self
            .selector
            .new_state(typ)
            .ok_or_else(|| unsupported(&self.base.config.column, typ))?;
        let builder = self.base.new_builder(&table)?;

        table.do_columns(|cr| {
            let selected = state.select(cr, value_idx)?;
            if selected.is_empty() {
                return Ok(());
            }
            append_rows(cr, &selected, builder)
        })
    }

    fn update_watermark(&mut self, _id: &DatasetId, mark: Time) -> Result<()> {
        self.base.dataset.update_watermark(mark)
    }

    fn update_processing_time(&mut self, _id: &DatasetId, time: Time) -> Result<()> {
        self.base.dataset.update_processing_time(time)
    }

    fn finish(&mut self, _id: &DatasetId, err: Option<DbError>) {
        self.base.dataset.finish(err);
    }
}

#[derive(Debug)]
pub struct RowSelectorTransformation {
    base: SelectorBase,
    selector: Arc<dyn RowSelector>,
}

impl RowSelectorTransformation {
    pub fn new(dataset: Dataset, selector: Arc<dyn RowSelector>, config: SelectorConfig) -> Self {
        RowSelectorTransformation {
            base: SelectorBase { dataset, config },
            selector,
        }
    }

    pub fn new_with_dataset(
        id: DatasetId,
        mode: AccumulationMode,
        selector: Arc<dyn RowSelector>,
        config: SelectorConfig,
        ctx: &ExecutionContext,
    ) -> (Self, Downstream) {
        let dataset = ctx.new_dataset(id, mode);
        let downstream = dataset.downstream().clone();
        (Self::new(dataset, selector, config), downstream)
    }
}

impl Transformation for RowSelectorTransformation {
    fn retract_table(&mut self, _id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.base.dataset.retract_table(key)
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        let (value_idx, typ) = self.base.value_column(&table)?;
        let mut state = self
            .selector
            .new_state(typ)
            .ok_or_else(|| unsupported(&self.base.config.column, typ))?;
        let builder = self.base.new_builder(&table)?;

        table.do_columns(|cr| state.update(cr, value_idx))?;
        for row in state.rows() {
            for (j, value) in row.values.iter().enumerate() {
                builder.append_value(j, value)?;
            }
        }
        Ok(())
    }

    fn update_watermark(&mut self, _id: &DatasetId, mark: Time) -> Result<()> {
        self.base.dataset.update_watermark(mark)
    }

    fn update_processing_time(&mut self, _id: &DatasetId, time: Time) -> Result<()> {
        self.base.dataset.update_processing_time(time)
    }

    fn finish(&mut self, _id: &DatasetId, err: Option<DbError>) {
        self.base.dataset.finish(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::allocator::Allocator;
    use crate::arrays::physical::PhysicalInt;
    use crate::testutil::{RecordingTransformation, table_from_rows};

    /// Selects the rows with even values.
    #[derive(Debug)]
    struct Evens;

    #[derive(Debug)]
    struct EvensState;

    impl IndexSelector for Evens {
        fn new_state(&self, typ: ColType) -> Option<Box<dyn IndexSelectorState>> {
            match typ {
                ColType::Int => Some(Box::new(EvensState)),
                _ => None,
            }
        }
    }

    impl IndexSelectorState for EvensState {
        fn select(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<Vec<usize>> {
            Ok(cr
                .values::<PhysicalInt>(j)?
                .iter()
                .enumerate()
                .filter(|(_, v)| **v % 2 == 0)
                .map(|(i, _)| i)
                .collect())
        }
    }

    /// Keeps the last row seen.
    #[derive(Debug)]
    struct LastRow;

    #[derive(Debug, Default)]
    struct LastRowState(Option<Row>);

    impl RowSelector for LastRow {
        fn new_state(&self, typ: ColType) -> Option<Box<dyn RowSelectorState>> {
            match typ {
                ColType::String => None,
                _ => Some(Box::new(LastRowState::default())),
            }
        }
    }

    impl RowSelectorState for LastRowState {
        fn update(&mut self, cr: &ColumnReader<'_>, _j: usize) -> Result<()> {
            if !cr.is_empty() {
                self.0 = Some(read_row(cr.len() - 1, cr)?);
            }
            Ok(())
        }

        fn rows(&self) -> Vec<Row> {
            self.0.iter().cloned().collect()
        }
    }

    fn table() -> ColumnTable {
        table_from_rows(
            &["host"],
            &[("host", ColType::String), ("_value", ColType::Int)],
            (1..=5).map(|v| vec!["a".into(), ScalarValue::Int(v)]).collect(),
        )
    }

    fn dataset() -> (Dataset, RecordingTransformation) {
        let ds = Dataset::new(
            DatasetId::new("sel"),
            AccumulationMode::Accumulating,
            Arc::new(Allocator::new()),
        );
        let rec = RecordingTransformation::new();
        ds.add_transformation(Box::new(rec.clone()));
        (ds, rec)
    }

    #[test]
    fn index_selector_copies_rows() {
        let (ds, rec) = dataset();
        let mut t = IndexSelectorTransformation::new(ds, Arc::new(Evens), SelectorConfig::default());
        let id = DatasetId::new("src");
        t.process(&id, table()).unwrap();
        t.finish(&id, None);

        let (_, rows) = rec.processed().remove(0);
        assert_eq!(
            vec![
                vec![ScalarValue::from("a"), ScalarValue::Int(2)],
                vec![ScalarValue::from("a"), ScalarValue::Int(4)],
            ],
            rows
        );
    }

    #[test]
    fn row_selector_appends_rows() {
        let (ds, rec) = dataset();
        let mut t = RowSelectorTransformation::new(ds, Arc::new(LastRow), SelectorConfig::default());
        let id = DatasetId::new("src");
        t.process(&id, table()).unwrap();
        t.finish(&id, None);

        let (_, rows) = rec.processed().remove(0);
        assert_eq!(vec![vec![ScalarValue::from("a"), ScalarValue::Int(5)]], rows);
    }

    #[test]
    fn unsupported_type() {
        let (ds, _) = dataset();
        let mut t = RowSelectorTransformation::new(
            ds,
            Arc::new(LastRow),
            SelectorConfig {
                column: "host".to_string(),
            },
        );
        let err = t.process(&DatasetId::new("src"), table()).unwrap_err();
        assert_eq!(ErrorKind::UnsupportedSelectorType, err.kind());
        assert_eq!(Some("host"), err.field("column"));
        assert!(!t.base.dataset.cache().contains(table().key()));
    }

    #[test]
    fn missing_column() {
        let (ds, _) = dataset();
        let mut t = IndexSelectorTransformation::new(
            ds,
            Arc::new(Evens),
            SelectorConfig {
                column: "nope".to_string(),
            },
        );
        let err = t.process(&DatasetId::new("src"), table()).unwrap_err();
        assert_eq!(ErrorKind::ColumnNotFound, err.kind());
    }
}
