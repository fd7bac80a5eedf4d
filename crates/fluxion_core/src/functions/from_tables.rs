use std::any::Any;
use std::sync::Arc;

use fluxion_error::Result;
use tokio_util::sync::CancellationToken;

use crate::arrays::allocator::Allocator;
use crate::arrays::builder::TableBuilder;
use crate::arrays::table::ColumnTable;
use crate::arrays::util::copy_table;
use crate::execution::registry::{ExecutionContext, Registry, downcast_spec};
use crate::execution::source::{Source, check_canceled};
use crate::execution::transformation::{DatasetId, Downstream};
use crate::plan::{ProcedureKind, ProcedureSpec};

pub const FROM_TABLES_KIND: ProcedureKind = "from_tables";

/// Source over tables already in memory.
#[derive(Debug, Clone, Default)]
pub struct FromTablesProcedureSpec {
    pub tables: Vec<ColumnTable>,
}

impl ProcedureSpec for FromTablesProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        FROM_TABLES_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Copies each table into the query's allocator and sends it on.
#[derive(Debug)]
pub struct FromTablesSource {
    id: DatasetId,
    tables: Vec<ColumnTable>,
    allocator: Arc<Allocator>,
    downstream: Downstream,
}

impl FromTablesSource {
    pub fn new(id: DatasetId, tables: Vec<ColumnTable>, allocator: Arc<Allocator>) -> Self {
        FromTablesSource {
            id,
            tables,
            allocator,
            downstream: Downstream::new(),
        }
    }
}

impl Source for FromTablesSource {
    fn id(&self) -> &DatasetId {
        &self.id
    }

    fn downstream(&self) -> &Downstream {
        &self.downstream
    }

    fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        for table in &self.tables {
            check_canceled(cancel)?;
            let mut builder = TableBuilder::new(table.key().clone(), &self.allocator);
            let copy = copy_table(table, &mut builder)?;
            drop(builder);
            self.downstream.process(&self.id, copy)?;
        }
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) -> Result<()> {
    registry.register_source(
        FROM_TABLES_KIND,
        |spec: &dyn ProcedureSpec, id: DatasetId, ctx: &ExecutionContext| {
            let spec = downcast_spec::<FromTablesProcedureSpec>(spec)?;
            let source = FromTablesSource::new(id, spec.tables.clone(), ctx.allocator.clone());
            Ok(Box::new(source) as Box<dyn Source>)
        },
    )
}

#[cfg(test)]
mod tests {
    use fluxion_error::ErrorKind;

    use super::*;
    use crate::arrays::coltype::ColType;
    use crate::arrays::scalar::ScalarValue;
    use crate::testutil::{RecordedCall, RecordingTransformation, table_from_rows};

    fn tables() -> Vec<ColumnTable> {
        (0..3)
            .map(|i| {
                table_from_rows(
                    &["t"],
                    &[("t", ColType::Int), ("_value", ColType::Float)],
                    vec![vec![ScalarValue::Int(i), ScalarValue::Float(1.5)]],
                )
            })
            .collect()
    }

    #[test]
    fn sends_every_table() {
        let alloc = Arc::new(Allocator::new());
        let mut src = FromTablesSource::new(DatasetId::new("src"), tables(), alloc.clone());
        let rec = RecordingTransformation::new();
        src.downstream().add_transformation(Box::new(rec.clone()));

        src.run(&CancellationToken::new()).unwrap();
        let calls = rec.calls();
        assert_eq!(3, calls.len());
        assert!(calls.iter().all(|c| matches!(c, RecordedCall::Process { rows: 1, .. })));
    }

    #[test]
    fn copy_accounted_against_query_allocator() {
        let alloc = Arc::new(Allocator::with_limit(8));
        let mut src = FromTablesSource::new(DatasetId::new("src"), tables(), alloc);
        let err = src.run(&CancellationToken::new()).unwrap_err();
        assert_eq!(ErrorKind::ResourceExhausted, err.kind());
    }

    #[test]
    fn stops_when_canceled() {
        let mut src = FromTablesSource::new(
            DatasetId::new("src"),
            tables(),
            Arc::new(Allocator::new()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(src.run(&cancel).unwrap_err().is_canceled());
    }
}
