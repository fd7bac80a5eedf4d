use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use fluxion_error::{DbError, Result};
use parking_lot::Mutex;

use crate::arrays::group_key::GroupKey;
use crate::arrays::table::ColumnTable;
use crate::values::time::Time;

/// Identifies the dataset a message came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(Arc<str>);

impl DatasetId {
    pub fn new(id: impl AsRef<str>) -> Self {
        DatasetId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A push based operator.
///
/// Every call carries the id of the dataset that produced the message, so
/// operators with several parents can tell their inputs apart.
pub trait Transformation: Debug + Send {
    /// Drop everything previously sent for `key`.
    fn retract_table(&mut self, id: &DatasetId, key: &GroupKey) -> Result<()>;

    fn process(&mut self, id: &DatasetId, table: ColumnTable) -> Result<()>;

    fn update_watermark(&mut self, id: &DatasetId, mark: Time) -> Result<()>;

    fn update_processing_time(&mut self, id: &DatasetId, time: Time) -> Result<()>;

    /// Signal that the parent will send nothing more. `err` is set if the
    /// parent stopped because of a failure.
    fn finish(&mut self, id: &DatasetId, err: Option<DbError>);
}

/// The downstream transformations of a dataset or source.
///
/// Shared between the operator that owns the dataset and the executor,
/// which adds consumers while wiring the graph.
#[derive(Debug, Clone, Default)]
pub struct Downstream {
    transformations: Arc<Mutex<Vec<Box<dyn Transformation>>>>,
}

impl Downstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transformation(&self, t: Box<dyn Transformation>) {
        self.transformations.lock().push(t);
    }

    pub fn len(&self) -> usize {
        self.transformations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` on every downstream transformation, stopping at the first
    /// error.
    pub fn try_for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn Transformation) -> Result<()>,
    {
        let mut ts = self.transformations.lock();
        for t in ts.iter_mut() {
            f(t.as_mut())?;
        }
        Ok(())
    }

    /// Send a table to every downstream transformation.
    ///
    /// A single-pass table fanned out to several consumers is materialized
    /// first so each of them can read it.
    pub fn process(&self, id: &DatasetId, table: ColumnTable) -> Result<()> {
        let mut ts = self.transformations.lock();
        let table = if ts.len() > 1 && table.is_single_pass() {
            table.materialize()?
        } else {
            table
        };
        for t in ts.iter_mut() {
            t.process(id, table.clone())?;
        }
        Ok(())
    }

    pub fn retract_table(&self, id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.try_for_each(|t| t.retract_table(id, key))
    }

    pub fn update_watermark(&self, id: &DatasetId, mark: Time) -> Result<()> {
        self.try_for_each(|t| t.update_watermark(id, mark))
    }

    pub fn update_processing_time(&self, id: &DatasetId, time: Time) -> Result<()> {
        self.try_for_each(|t| t.update_processing_time(id, time))
    }

    pub fn finish(&self, id: &DatasetId, err: Option<DbError>) {
        let mut ts = self.transformations.lock();
        for t in ts.iter_mut() {
            t.finish(id, err.clone());
        }
    }
}
