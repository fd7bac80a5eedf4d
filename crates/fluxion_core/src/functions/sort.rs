//! `sort`: order the rows of every table by a set of columns.

use std::any::Any;

use fluxion_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::arrays::group_key::GroupKey;
use crate::arrays::table::ColumnTable;
use crate::arrays::util::{add_table_cols, append_table};
use crate::execution::aggregate::DEFAULT_VALUE_COL_LABEL;
use crate::execution::dataset::{AccumulationMode, Dataset};
use crate::execution::registry::{ExecutionContext, Registry, downcast_spec};
use crate::execution::transformation::{DatasetId, Downstream, Transformation};
use crate::plan::{ProcedureKind, ProcedureSpec};
use crate::values::time::Time;

pub const SORT_KIND: ProcedureKind = "sort";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortProcedureSpec {
    /// Columns to sort by, most significant first. Unknown columns are
    /// ignored.
    pub columns: Vec<String>,
    pub desc: bool,
}

impl Default for SortProcedureSpec {
    fn default() -> Self {
        SortProcedureSpec {
            columns: vec![DEFAULT_VALUE_COL_LABEL.to_string()],
            desc: false,
        }
    }
}

impl ProcedureSpec for SortProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        SORT_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct SortTransformation {
    dataset: Dataset,
    spec: SortProcedureSpec,
}

impl SortTransformation {
    pub fn new(dataset: Dataset, spec: SortProcedureSpec) -> Self {
        SortTransformation { dataset, spec }
    }

    pub fn new_with_dataset(
        id: DatasetId,
        mode: AccumulationMode,
        spec: SortProcedureSpec,
        ctx: &ExecutionContext,
    ) -> (Self, Downstream) {
        let dataset = ctx.new_dataset(id, mode);
        let downstream = dataset.downstream().clone();
        (Self::new(dataset, spec), downstream)
    }
}

impl Transformation for SortTransformation {
    fn retract_table(&mut self, _id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.dataset.retract_table(key)
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        let (builder, created) = self.dataset.table_builder(table.key());
        if !created {
            return Err(DbError::new("Sort found duplicate table").with_field("key", table.key()));
        }
        add_table_cols(&table, builder)?;
        append_table(&table, builder)?;

        let labels: Vec<&str> = self.spec.columns.iter().map(String::as_str).collect();
        builder.sort(&labels, self.spec.desc)
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

pub(super) fn register(registry: &mut Registry) -> Result<()> {
    registry.register_transformation(SORT_KIND, |id, mode, spec, ctx| {
        let spec = downcast_spec::<SortProcedureSpec>(spec)?;
        let (t, downstream) = SortTransformation::new_with_dataset(id, mode, spec.clone(), ctx);
        Ok((Box::new(t) as Box<dyn Transformation>, downstream))
    })
}
