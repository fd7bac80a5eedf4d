//! `sum`, `count` and `mean`.

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use fluxion_error::Result;

use crate::arrays::coltype::ColType;
use crate::arrays::physical::{PhysicalFloat, PhysicalInt, PhysicalType, PhysicalUInt};
use crate::arrays::scalar::ScalarValue;
use crate::arrays::table::ColumnReader;
use crate::execution::aggregate::{
    Aggregate, AggregateConfig, AggregateState, AggregateTransformation,
};
use crate::execution::dataset::AccumulationMode;
use crate::execution::registry::{ExecutionContext, Registry, downcast_spec};
use crate::execution::transformation::{DatasetId, Downstream, Transformation};
use crate::plan::{ProcedureKind, ProcedureSpec};

pub const SUM_KIND: ProcedureKind = "sum";
pub const COUNT_KIND: ProcedureKind = "count";
pub const MEAN_KIND: ProcedureKind = "mean";

/// Arguments shared by every aggregate procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateProcedureSpec {
    kind: ProcedureKind,
    pub config: AggregateConfig,
}

impl AggregateProcedureSpec {
    pub fn sum(config: AggregateConfig) -> Self {
        AggregateProcedureSpec {
            kind: SUM_KIND,
            config,
        }
    }

    pub fn count(config: AggregateConfig) -> Self {
        AggregateProcedureSpec {
            kind: COUNT_KIND,
            config,
        }
    }

    pub fn mean(config: AggregateConfig) -> Self {
        AggregateProcedureSpec {
            kind: MEAN_KIND,
            config,
        }
    }
}

impl ProcedureSpec for AggregateProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Native numeric values that can be summed.
trait Numeric: Copy + Default + Debug + Send + 'static {
    fn add(self, other: Self) -> Self;

    fn to_f64(self) -> f64;
}

impl Numeric for i64 {
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for u64 {
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for f64 {
    fn add(self, other: Self) -> Self {
        self + other
    }

    fn to_f64(self) -> f64 {
        self
    }
}

/// Pick a state generic over the numeric physical types.
macro_rules! numeric_state {
    ($state:ident, $typ:expr) => {
        match $typ {
            ColType::Int => Some(Box::new($state::<PhysicalInt>::default()) as Box<dyn AggregateState>),
            ColType::UInt => Some(Box::new($state::<PhysicalUInt>::default()) as Box<dyn AggregateState>),
            ColType::Float => Some(Box::new($state::<PhysicalFloat>::default()) as Box<dyn AggregateState>),
            _ => None,
        }
    };
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Aggregate for Sum {
    fn new_state(&self, typ: ColType) -> Option<Box<dyn AggregateState>> {
        numeric_state!(SumState, typ)
    }
}

#[derive(Debug, Default)]
struct SumState<S: PhysicalType> {
    sum: S::Native,
}

impl<S> AggregateState for SumState<S>
where
    S: PhysicalType,
    S::Native: Numeric,
{
    fn output_type(&self) -> ColType {
        S::COL_TYPE
    }

    fn update(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<()> {
        for v in cr.values::<S>(j)? {
            self.sum = self.sum.add(*v);
        }
        Ok(())
    }

    fn value(&self) -> ScalarValue {
        S::into_scalar(self.sum)
    }
}

/// Number of rows, for any column type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Aggregate for Count {
    fn new_state(&self, _typ: ColType) -> Option<Box<dyn AggregateState>> {
        Some(Box::new(CountState::default()))
    }
}

#[derive(Debug, Default)]
struct CountState {
    count: i64,
}

impl AggregateState for CountState {
    fn output_type(&self) -> ColType {
        ColType::Int
    }

    fn update(&mut self, cr: &ColumnReader<'_>, _j: usize) -> Result<()> {
        self.count += cr.len() as i64;
        Ok(())
    }

    fn value(&self) -> ScalarValue {
        ScalarValue::Int(self.count)
    }
}

/// Arithmetic mean as a float. The mean of no rows is NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Aggregate for Mean {
    fn new_state(&self, typ: ColType) -> Option<Box<dyn AggregateState>> {
        numeric_state!(MeanState, typ)
    }
}

#[derive(Debug)]
struct MeanState<S> {
    sum: f64,
    count: u64,
    _typ: PhantomData<S>,
}

impl<S> Default for MeanState<S> {
    fn default() -> Self {
        MeanState {
            sum: 0.0,
            count: 0,
            _typ: PhantomData,
        }
    }
}

impl<S> AggregateState for MeanState<S>
where
    S: PhysicalType,
    S::Native: Numeric,
{
    fn output_type(&self) -> ColType {
        ColType::Float
    }

    fn update(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<()> {
        let values = cr.values::<S>(j)?;
        self.sum += values.iter().map(|v| v.to_f64()).sum::<f64>();
        self.count += values.len() as u64;
        Ok(())
    }

    fn value(&self) -> ScalarValue {
        if self.count == 0 {
            return ScalarValue::Float(f64::NAN);
        }
        ScalarValue::Float(self.sum / self.count as f64)
    }
}

fn create(
    agg: Arc<dyn Aggregate>,
) -> impl Fn(
    DatasetId,
    AccumulationMode,
    &dyn ProcedureSpec,
    &ExecutionContext,
) -> Result<(Box<dyn Transformation>, Downstream)>
+ Send
+ Sync
+ 'static {
    move |id, mode, spec, ctx| {
        let spec = downcast_spec::<AggregateProcedureSpec>(spec)?;
        let (t, downstream) = AggregateTransformation::new_with_dataset(
            id,
            mode,
            agg.clone(),
            spec.config.clone(),
            ctx,
        );
        Ok((Box::new(t) as Box<dyn Transformation>, downstream))
    }
}

pub(super) fn register(registry: &mut Registry) -> Result<()> {
    registry.register_transformation(SUM_KIND, create(Arc::new(Sum)))?;
    registry.register_transformation(COUNT_KIND, create(Arc::new(Count)))?;
    registry.register_transformation(MEAN_KIND, create(Arc::new(Mean)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::allocator::Allocator;
    use crate::execution::dataset::Dataset;
    use crate::testutil::{RecordingTransformation, table_from_rows};

    struct TestCase {
        name: &'static str,
        agg: Arc<dyn Aggregate>,
        typ: ColType,
        values: Vec<ScalarValue>,
        expected: ScalarValue,
    }

    fn run(agg: Arc<dyn Aggregate>, typ: ColType, values: Vec<ScalarValue>) -> ScalarValue {
        let dataset = Dataset::new(
            DatasetId::new("agg"),
            AccumulationMode::Accumulating,
            Arc::new(Allocator::new()),
        );
        let rec = RecordingTransformation::new();
        dataset.add_transformation(Box::new(rec.clone()));
        let mut t = AggregateTransformation::new(dataset, agg, AggregateConfig::default());

        let rows = values.into_iter().map(|v| vec![v]).collect();
        let id = DatasetId::new("src");
        t.process(&id, table_from_rows(&[], &[("_value", typ)], rows))
            .unwrap();
        t.finish(&id, None);

        let (_, data) = rec.processed().remove(0);
        data[0][0].clone()
    }

    #[test]
    fn aggregates() {
        let cases = vec![
            TestCase {
                name: "sum int",
                agg: Arc::new(Sum),
                typ: ColType::Int,
                values: vec![1i64.into(), 2i64.into(), 3i64.into()],
                expected: ScalarValue::Int(6),
            },
            TestCase {
                name: "sum uint",
                agg: Arc::new(Sum),
                typ: ColType::UInt,
                values: vec![1u64.into(), 2u64.into()],
                expected: ScalarValue::UInt(3),
            },
            TestCase {
                name: "sum float",
                agg: Arc::new(Sum),
                typ: ColType::Float,
                values: vec![0.5.into(), 1.5.into()],
                expected: ScalarValue::Float(2.0),
            },
            TestCase {
                name: "count strings",
                agg: Arc::new(Count),
                typ: ColType::String,
                values: vec!["a".into(), "b".into()],
                expected: ScalarValue::Int(2),
            },
            TestCase {
                name: "mean int",
                agg: Arc::new(Mean),
                typ: ColType::Int,
                values: vec![1i64.into(), 2i64.into()],
                expected: ScalarValue::Float(1.5),
            },
        ];

        for case in cases {
            let got = run(case.agg, case.typ, case.values);
            assert_eq!(case.expected, got, "case: {}", case.name);
        }
    }

    #[test]
    fn mean_of_nothing_is_nan() {
        let got = run(Arc::new(Mean), ColType::Float, Vec::new());
        assert!(matches!(got, ScalarValue::Float(v) if v.is_nan()));
    }

    #[test]
    fn sum_rejects_strings() {
        assert!(Sum.new_state(ColType::String).is_none());
        assert!(Sum.new_state(ColType::Bool).is_none());
    }
}
