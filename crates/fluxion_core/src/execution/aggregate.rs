//! Reduce every table to a single row per group key.

use std::fmt::Debug;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

use super::dataset::{AccumulationMode, Dataset};
use super::registry::ExecutionContext;
use super::transformation::{DatasetId, Downstream, Transformation};
use crate::arrays::coltype::{ColMeta, ColType};
use crate::arrays::group_key::GroupKey;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::table::{ColumnReader, ColumnTable};
use crate::arrays::util::append_key_values;
use crate::values::time::Time;

pub const DEFAULT_VALUE_COL_LABEL: &str = "_value";
pub const DEFAULT_TIME_COL_LABEL: &str = "_time";

/// A reduction over one column.
pub trait Aggregate: Debug + Sync + Send {
    /// Create reduction state for a column of type `typ`, or `None` if the
    /// type is not supported.
    fn new_state(&self, typ: ColType) -> Option<Box<dyn AggregateState>>;
}

pub trait AggregateState: Debug + Send {
    fn output_type(&self) -> ColType;

    /// Fold in the values of column `j`.
    fn update(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<()>;

    /// The reduced value, with the type reported by `output_type`.
    fn value(&self) -> ScalarValue;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Columns to reduce.
    pub columns: Vec<String>,
    /// Group key column providing the output timestamp.
    pub time_src: String,
    /// If set, write the value of `time_src` to this column.
    pub time_dst: Option<String>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            columns: vec![DEFAULT_VALUE_COL_LABEL.to_string()],
            time_src: "_stop".to_string(),
            time_dst: None,
        }
    }
}

#[derive(Debug)]
pub struct AggregateTransformation {
    dataset: Dataset,
    agg: Arc<dyn Aggregate>,
    config: AggregateConfig,
}

impl AggregateTransformation {
    pub fn new(dataset: Dataset, agg: Arc<dyn Aggregate>, config: AggregateConfig) -> Self {
        AggregateTransformation {
            dataset,
            agg,
            config,
        }
    }

    /// Create the transformation with its own dataset.
    pub fn new_with_dataset(
        id: DatasetId,
        mode: AccumulationMode,
        agg: Arc<dyn Aggregate>,
        config: AggregateConfig,
        ctx: &ExecutionContext,
    ) -> (Self, Downstream) {
        let dataset = ctx.new_dataset(id, mode);
        let downstream = dataset.downstream().clone();
        (Self::new(dataset, agg, config), downstream)
    }

    /// Resolve the configured columns against the table, returning the
    /// table index and fresh state for each.
    fn plan_columns(
        &self,
        table: &ColumnTable,
    ) -> Result<Vec<(usize, Box<dyn AggregateState>)>> {
        let mut planned = Vec::with_capacity(self.config.columns.len());
        for label in &self.config.columns {
            let idx = table.col_idx(label).ok_or_else(|| {
                DbError::new("Aggregate column does not exist")
                    .with_kind(ErrorKind::ColumnNotFound)
                    .with_field("column", label)
            })?;
            if table.key().has_col(label) {
                return Err(DbError::new("Cannot aggregate columns that are part of the group key")
                    .with_kind(ErrorKind::KeyColumnConflict)
                    .with_field("column", label));
            }
            let typ = table.cols()[idx].typ;
            let state = self.agg.new_state(typ).ok_or_else(|| {
                DbError::new("Unsupported aggregate column type")
                    .with_field("column", label)
                    .with_field("type", typ)
            })?;
            planned.push((idx, state));
        }
        Ok(planned)
    }

    fn output_time(&self, key: &GroupKey) -> Result<Option<(String, Time)>> {
        let dst = match &self.config.time_dst {
            Some(dst) => dst,
            None => return Ok(None),
        };
        match key.label_value(&self.config.time_src) {
            Some(ScalarValue::Time(t)) => Ok(Some((dst.clone(), *t))),
            Some(other) => Err(DbError::new("Aggregate time source is not a time column")
                .with_kind(ErrorKind::ColumnTypeMismatch)
                .with_field("column", &self.config.time_src)
                .with_field("type", other.col_type())),
            None => Err(DbError::new("Aggregate time source column does not exist")
                .with_kind(ErrorKind::ColumnNotFound)
                .with_field("column", &self.config.time_src)),
        }
    }
}

impl Transformation for AggregateTransformation {
    fn retract_table(&mut self, _id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.dataset.retract_table(key)
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        let key = table.key().clone();
        if self.dataset.cache().contains(&key) {
            return Err(DbError::new("Aggregate found duplicate table").with_field("key", &key));
        }

        let mut states = self.plan_columns(&table)?;
        let time = self.output_time(&key)?;
        table.do_columns(|cr| {
            for (idx, state) in states.iter_mut() {
                state.update(cr, *idx)?;
            }
            Ok(())
        })?;

        let (builder, _) = self.dataset.table_builder(&key);
        for col in key.cols() {
            builder.add_col(col.clone())?;
        }
        if let Some((dst, t)) = &time {
            let j = match builder.col_idx(dst) {
                Some(_) => {
                    return Err(DbError::new("Cannot write aggregate time to a group key column")
                        .with_kind(ErrorKind::KeyColumnConflict)
                        .with_field("column", dst));
                }
                None => builder.add_col(ColMeta::new(dst.clone(), ColType::Time))?,
            };
            builder.append_time(j, *t)?;
        }
        for ((_, state), label) in states.iter().zip(&self.config.columns) {
            let j = builder.add_col(ColMeta::new(label.clone(), state.output_type()))?;
            builder.append_value(j, &state.value())?;
        }
        append_key_values(&key, builder, 1)
    }

    fn update_watermark(&mut self, _id: &DatasetId, mark: Time) -> Result<()> {
        self.dataset.update_watermark(mark)
    }

    fn update_processing_time(&mut self, _id: &DatasetId, time: Time) -> Result<()> {
        self.dataset.update_processing_time(time)
    }

    fn finish(&mut self, _id: &DatasetId, err: Option<DbError>) {
        self.dataset.finish(err);
    }
}
