//! `first`, `last`, `min` and `max`.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use fluxion_error::Result;

use crate::arrays::coltype::ColType;
use crate::arrays::physical::{PhysicalFloat, PhysicalInt, PhysicalType, PhysicalUInt};
use crate::arrays::table::ColumnReader;
use crate::execution::registry::{Registry, downcast_spec};
use crate::execution::selector::{
    IndexSelector, IndexSelectorState, IndexSelectorTransformation, Row, RowSelector,
    RowSelectorState, RowSelectorTransformation, SelectorConfig, read_row,
};
use crate::execution::transformation::Transformation;
use crate::plan::{ProcedureKind, ProcedureSpec};

pub const FIRST_KIND: ProcedureKind = "first";
pub const LAST_KIND: ProcedureKind = "last";
pub const MIN_KIND: ProcedureKind = "min";
pub const MAX_KIND: ProcedureKind = "max";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorProcedureSpec {
    kind: ProcedureKind,
    pub config: SelectorConfig,
}

impl SelectorProcedureSpec {
    pub fn first(config: SelectorConfig) -> Self {
        SelectorProcedureSpec {
            kind: FIRST_KIND,
            config,
        }
    }

    pub fn last(config: SelectorConfig) -> Self {
        SelectorProcedureSpec {
            kind: LAST_KIND,
            config,
        }
    }

    pub fn min(config: SelectorConfig) -> Self {
        SelectorProcedureSpec {
            kind: MIN_KIND,
            config,
        }
    }

    pub fn max(config: SelectorConfig) -> Self {
        SelectorProcedureSpec {
            kind: MAX_KIND,
            config,
        }
    }
}

impl ProcedureSpec for SelectorProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// First row of each table.
#[derive(Debug, Clone, Copy, Default)]
pub struct First;

#[derive(Debug, Default)]
struct FirstState {
    selected: bool,
}

impl IndexSelector for First {
    fn new_state(&self, _typ: ColType) -> Option<Box<dyn IndexSelectorState>> {
        Some(Box::new(FirstState::default()))
    }
}

impl IndexSelectorState for FirstState {
    fn select(&mut self, cr: &ColumnReader<'_>, _j: usize) -> Result<Vec<usize>> {
        if self.selected || cr.is_empty() {
            return Ok(Vec::new());
        }
        self.selected = true;
        Ok(vec![0])
    }
}

/// Last row of each table.
///
/// Tables may be read in several chunks, so the last row is only known once
/// every chunk has been seen. The state keeps the row around and emits it as
/// the final selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Last;

#[derive(Debug, Default)]
struct LastState {
    row: Option<Row>,
}

impl RowSelector for Last {
    fn new_state(&self, _typ: ColType) -> Option<Box<dyn RowSelectorState>> {
        Some(Box::new(LastState::default()))
    }
}

impl RowSelectorState for LastState {
    fn update(&mut self, cr: &ColumnReader<'_>, _j: usize) -> Result<()> {
        if !cr.is_empty() {
            self.row = Some(read_row(cr.len() - 1, cr)?);
        }
        Ok(())
    }

    fn rows(&self) -> Vec<Row> {
        self.row.iter().cloned().collect()
    }
}

/// Which extreme a [`ExtremeState`] keeps.
trait Direction: std::fmt::Debug + Default + Send + 'static {
    fn better<T: PartialOrd>(candidate: &T, current: &T) -> bool;
}

#[derive(Debug, Default)]
struct Lowest;

impl Direction for Lowest {
    fn better<T: PartialOrd>(candidate: &T, current: &T) -> bool {
        candidate < current
    }
}

#[derive(Debug, Default)]
struct Highest;

impl Direction for Highest {
    fn better<T: PartialOrd>(candidate: &T, current: &T) -> bool {
        candidate > current
    }
}

/// Keeps the row holding the extreme value. Ties go to the earliest row.
#[derive(Debug)]
struct ExtremeState<S: PhysicalType, D> {
    best: Option<(S::Native, Row)>,
    _dir: PhantomData<D>,
}

impl<S: PhysicalType, D> Default for ExtremeState<S, D> {
    fn default() -> Self {
        ExtremeState {
            best: None,
            _dir: PhantomData,
        }
    }
}

impl<S: PhysicalType, D: Direction> RowSelectorState for ExtremeState<S, D> {
    fn update(&mut self, cr: &ColumnReader<'_>, j: usize) -> Result<()> {
        let values = cr.values::<S>(j)?;
        let mut found: Option<usize> = None;
        for (i, v) in values.iter().enumerate() {
            let better = match (found, &self.best) {
                (Some(f), _) => D::better(v, &values[f]),
                (None, Some((cur, _))) => D::better(v, cur),
                (None, None) => true,
            };
            if better {
                found = Some(i);
            }
        }
        if let Some(i) = found {
            self.best = Some((values[i].clone(), read_row(i, cr)?));
        }
        Ok(())
    }

    fn rows(&self) -> Vec<Row> {
        self.best.iter().map(|(_, row)| row.clone()).collect()
    }
}

fn extreme_state<D: Direction>(typ: ColType) -> Option<Box<dyn RowSelectorState>> {
    match typ {
        ColType::Int => Some(Box::new(ExtremeState::<PhysicalInt, D>::default())),
        ColType::UInt => Some(Box::new(ExtremeState::<PhysicalUInt, D>::default())),
        ColType::Float => Some(Box::new(ExtremeState::<PhysicalFloat, D>::default())),
        _ => None,
    }
}

/// Row with the smallest value. Numeric columns only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl RowSelector for Min {
    fn new_state(&self, typ: ColType) -> Option<Box<dyn RowSelectorState>> {
        extreme_state::<Lowest>(typ)
    }
}

/// Row with the largest value. Numeric columns only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl RowSelector for Max {
    fn new_state(&self, typ: ColType) -> Option<Box<dyn RowSelectorState>> {
        extreme_state::<Highest>(typ)
    }
}

fn register_index(
    registry: &mut Registry,
    kind: ProcedureKind,
    selector: Arc<dyn IndexSelector>,
) -> Result<()> {
    registry.register_transformation(kind, move |id, mode, spec, ctx| {
        let spec = downcast_spec::<SelectorProcedureSpec>(spec)?;
        let (t, downstream) = IndexSelectorTransformation::new_with_dataset(
            id,
            mode,
            selector.clone(),
            spec.config.clone(),
            ctx,
        );
        Ok((Box::new(t) as Box<dyn Transformation>, downstream))
    })
}

fn register_row(
    registry: &mut Registry,
    kind: ProcedureKind,
    selector: Arc<dyn RowSelector>,
) -> Result<()> {
    registry.register_transformation(kind, move |id, mode, spec, ctx| {
        let spec = downcast_spec::<SelectorProcedureSpec>(spec)?;
        let (t, downstream) = RowSelectorTransformation::new_with_dataset(
            id,
            mode,
            selector.clone(),
            spec.config.clone(),
            ctx,
        );
        Ok((Box::new(t) as Box<dyn Transformation>, downstream))
    })
}

pub(super) fn register(registry: &mut Registry) -> Result<()> {
    register_index(registry, FIRST_KIND, Arc::new(First))?;
    register_row(registry, LAST_KIND, Arc::new(Last))?;
    register_row(registry, MIN_KIND, Arc::new(Min))?;
    register_row(registry, MAX_KIND, Arc::new(Max))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use fluxion_error::ErrorKind;

    use super::*;
    use crate::arrays::allocator::Allocator;
    use crate::arrays::scalar::ScalarValue;
    use crate::arrays::table::ColumnTable;
    use crate::execution::dataset::{AccumulationMode, Dataset};
    use crate::execution::transformation::DatasetId;
    use crate::testutil::{RecordingTransformation, table_from_rows};

    fn table() -> ColumnTable {
        table_from_rows(
            &["host"],
            &[
                ("host", ColType::String),
                ("tag", ColType::String),
                ("_value", ColType::Float),
            ],
            vec![
                vec!["a".into(), "x".into(), ScalarValue::Float(3.0)],
                vec!["a".into(), "y".into(), ScalarValue::Float(1.0)],
                vec!["a".into(), "z".into(), ScalarValue::Float(5.0)],
                vec!["a".into(), "w".into(), ScalarValue::Float(1.0)],
                vec!["a".into(), "v".into(), ScalarValue::Float(5.0)],
            ],
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

    fn run_row(selector: Arc<dyn RowSelector>) -> Vec<Vec<ScalarValue>> {
        let (ds, rec) = dataset();
        let mut t = RowSelectorTransformation::new(ds, selector, SelectorConfig::default());
        let id = DatasetId::new("src");
        t.process(&id, table()).unwrap();
        t.finish(&id, None);
        rec.processed().remove(0).1
    }

    fn tag(rows: &[Vec<ScalarValue>]) -> Vec<ScalarValue> {
        rows.iter().map(|r| r[1].clone()).collect()
    }

    #[test]
    fn first_selects_one_row() {
        let (ds, rec) = dataset();
        let mut t = IndexSelectorTransformation::new(ds, Arc::new(First), SelectorConfig::default());
        let id = DatasetId::new("src");
        t.process(&id, table()).unwrap();
        t.finish(&id, None);

        let rows = rec.processed().remove(0).1;
        assert_eq!(vec![ScalarValue::from("x")], tag(&rows));
    }

    #[test]
    fn last_selects_final_row() {
        let rows = run_row(Arc::new(Last));
        assert_eq!(vec![ScalarValue::from("v")], tag(&rows));
    }

    #[test]
    fn min_first_occurrence_wins() {
        let rows = run_row(Arc::new(Min));
        assert_eq!(vec![ScalarValue::from("y")], tag(&rows));
        assert_eq!(ScalarValue::Float(1.0), rows[0][2]);
    }

    #[test]
    fn max_first_occurrence_wins() {
        let rows = run_row(Arc::new(Max));
        assert_eq!(vec![ScalarValue::from("z")], tag(&rows));
    }

    #[test]
    fn min_rejects_strings() {
        let (ds, _) = dataset();
        let mut t = RowSelectorTransformation::new(
            ds,
            Arc::new(Min),
            SelectorConfig {
                column: "tag".to_string(),
            },
        );
        let err = t.process(&DatasetId::new("src"), table()).unwrap_err();
        assert_eq!(ErrorKind::UnsupportedSelectorType, err.kind());
    }

    #[test]
    fn empty_table_selects_nothing() {
        let (ds, rec) = dataset();
        let mut t = RowSelectorTransformation::new(ds, Arc::new(Max), SelectorConfig::default());
        let id = DatasetId::new("src");
        let empty = table_from_rows(&[], &[("_value", ColType::Int)], Vec::new());
        t.process(&id, empty).unwrap();
        t.finish(&id, None);

        let (_, rows) = rec.processed().remove(0);
        assert!(rows.is_empty());
    }
}
