//! `filter`: keep the rows a predicate function accepts.

use std::any::Any;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, Result};
use tracing::trace;

use crate::arrays::group_key::GroupKey;
use crate::arrays::table::{ColumnReader, ColumnTable};
use crate::arrays::util::{add_table_cols, append_rows};
use crate::compiler::scope::Scope;
use crate::compiler::semantic::FunctionExpression;
use crate::compiler::{CompilationCache, CompiledFunction, record_input};
use crate::execution::dataset::{AccumulationMode, Dataset};
use crate::execution::registry::{ExecutionContext, Registry, downcast_spec};
use crate::execution::transformation::{DatasetId, Downstream, Transformation};
use crate::plan::{ProcedureKind, ProcedureSpec};
use crate::values::types::Type;
use crate::values::time::Time;
use crate::values::{Object, Value};

pub const FILTER_KIND: ProcedureKind = "filter";

#[derive(Debug, Clone)]
pub struct FilterProcedureSpec {
    pub func: Arc<FunctionExpression>,
}

impl ProcedureSpec for FilterProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        FILTER_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct FilterTransformation {
    dataset: Dataset,
    param: String,
    cache: CompilationCache,
}

impl FilterTransformation {
    /// The first parameter of `func` receives each row.
    pub fn try_new(
        dataset: Dataset,
        func: Arc<FunctionExpression>,
        builtins: Arc<Scope>,
    ) -> Result<Self> {
        let param = match func.params.first() {
            Some(p) => p.key.clone(),
            None => {
                return Err(DbError::new("Filter function must take a row parameter")
                    .with_kind(ErrorKind::TypeError));
            }
        };
        Ok(FilterTransformation {
            dataset,
            param,
            cache: CompilationCache::new(func, builtins),
        })
    }

    pub fn new_with_dataset(
        id: DatasetId,
        mode: AccumulationMode,
        func: Arc<FunctionExpression>,
        ctx: &ExecutionContext,
    ) -> Result<(Self, Downstream)> {
        let dataset = ctx.new_dataset(id, mode);
        let downstream = dataset.downstream().clone();
        Ok((Self::try_new(dataset, func, ctx.builtins.clone())?, downstream))
    }

    /// Compile the predicate for the columns of `table`.
    fn predicate(&mut self, table: &ColumnTable) -> Result<Arc<CompiledFunction>> {
        let record = Type::object(
            table
                .cols()
                .iter()
                .map(|c| (c.label.clone(), c.typ.as_type())),
        );
        let input = Type::object([(self.param.clone(), record)]);
        let f = self.cache.compile(&input)?;
        if f.typ() != &Type::Bool {
            return Err(DbError::new("Filter function must return a bool")
                .with_kind(ErrorKind::TypeError)
                .with_field("type", f.typ()));
        }
        Ok(f)
    }
}

fn row_record(cr: &ColumnReader<'_>, i: usize) -> Result<Object> {
    cr.cols()
        .iter()
        .enumerate()
        .map(|(j, c)| Ok((c.label.clone(), Value::from(cr.value(i, j)?))))
        .collect()
}

impl Transformation for FilterTransformation {
    fn retract_table(&mut self, _id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.dataset.retract_table(key)
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        let f = self.predicate(&table)?;
        let param = self.param.clone();

        let (builder, created) = self.dataset.table_builder(table.key());
        if !created {
            return Err(DbError::new("Filter found duplicate table").with_field("key", table.key()));
        }
        add_table_cols(&table, builder)?;

        table.do_columns(|cr| {
            let mut keep = Vec::new();
            for i in 0..cr.len() {
                let input = record_input(&param, row_record(cr, i)?);
                if f.eval_bool(&input)? {
                    keep.push(i);
                }
            }
            trace!(rows = cr.len(), kept = keep.len(), "filtered chunk");
            if keep.is_empty() {
                return Ok(());
            }
            append_rows(cr, &keep, builder)
        })
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
    registry.register_transformation(FILTER_KIND, |id, mode, spec, ctx| {
        let spec = downcast_spec::<FilterProcedureSpec>(spec)?;
        let (t, downstream) = FilterTransformation::new_with_dataset(id, mode, spec.func.clone(), ctx)?;
        Ok((Box::new(t) as Box<dyn Transformation>, downstream))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::allocator::Allocator;
    use crate::arrays::coltype::ColType;
    use crate::arrays::scalar::ScalarValue;
    use crate::compiler::builtins::default_builtins;
    use crate::compiler::semantic::{Expression, FunctionBody, FunctionParameter, binary, ident, member};
    use crate::testutil::{RecordingTransformation, table_from_rows};
    use crate::values::binary::Operator;

    fn table() -> ColumnTable {
        table_from_rows(
            &["host"],
            &[("host", ColType::String), ("_value", ColType::Float)],
            (0..5)
                .map(|v| vec!["a".into(), ScalarValue::Float(v as f64)])
                .collect(),
        )
    }

    fn func(body: Expression) -> Arc<FunctionExpression> {
        Arc::new(FunctionExpression::new(
            vec![FunctionParameter::new("row")],
            FunctionBody::Expression(body),
        ))
    }

    fn filter(f: Arc<FunctionExpression>) -> (FilterTransformation, RecordingTransformation) {
        let ds = Dataset::new(
            DatasetId::new("filter"),
            AccumulationMode::Accumulating,
            Arc::new(Allocator::new()),
        );
        let rec = RecordingTransformation::new();
        ds.add_transformation(Box::new(rec.clone()));
        (
            FilterTransformation::try_new(ds, f, Arc::new(default_builtins())).unwrap(),
            rec,
        )
    }

    #[test]
    fn keeps_matching_rows() {
        // (row) => row._value > 2.0
        let (mut t, rec) = filter(func(binary(
            Operator::Gt,
            member(ident("row"), "_value"),
            Expression::Float(2.0),
        )));
        let id = DatasetId::new("src");
        t.process(&id, table()).unwrap();
        t.finish(&id, None);

        let (key, rows) = rec.processed().remove(0);
        assert_eq!(table().key(), &key);
        assert_eq!(
            vec![
                vec![ScalarValue::from("a"), ScalarValue::Float(3.0)],
                vec![ScalarValue::from("a"), ScalarValue::Float(4.0)],
            ],
            rows
        );
    }

    #[test]
    fn no_matches_keeps_empty_table() {
        let (mut t, rec) = filter(func(Expression::Bool(false)));
        let id = DatasetId::new("src");
        t.process(&id, table()).unwrap();
        t.finish(&id, None);

        let (_, rows) = rec.processed().remove(0);
        assert!(rows.is_empty());
    }

    #[test]
    fn non_bool_function_rejected() {
        let (mut t, _) = filter(func(member(ident("row"), "_value")));
        let err = t.process(&DatasetId::new("src"), table()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
    }

    #[test]
    fn unknown_column_is_type_error() {
        let (mut t, _) = filter(func(binary(
            Operator::Eq,
            member(ident("row"), "region"),
            Expression::String("west".to_string()),
        )));
        let err = t.process(&DatasetId::new("src"), table()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
    }

    #[test]
    fn predicate_without_parameters_rejected() {
        let ds = Dataset::new(
            DatasetId::new("filter"),
            AccumulationMode::Accumulating,
            Arc::new(Allocator::new()),
        );
        let f = Arc::new(FunctionExpression::new(
            vec![],
            FunctionBody::Expression(Expression::Bool(true)),
        ));
        let err = FilterTransformation::try_new(ds, f, Arc::new(default_builtins())).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
    }
}
