use std::fmt;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, Result};
use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;

use super::dataset::{AccumulationMode, Dataset};
use super::source::Source;
use super::transformation::{DatasetId, Downstream, Transformation};
use super::trigger::TriggerSpec;
use crate::arrays::allocator::Allocator;
use crate::compiler::scope::Scope;
use crate::plan::{ProcedureKind, ProcedureSpec};
use crate::values::time::{Bounds, Time};

/// Everything a procedure constructor may need about the running query.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub now: Time,
    pub bounds: Option<Bounds>,
    pub allocator: Arc<Allocator>,
    /// Datasets feeding the node being built.
    pub parents: Vec<DatasetId>,
    pub trigger_spec: TriggerSpec,
    pub cancel: CancellationToken,
    pub builtins: Arc<Scope>,
}

impl ExecutionContext {
    /// Create a dataset using this context's allocator and trigger.
    pub fn new_dataset(&self, id: DatasetId, mode: AccumulationMode) -> Dataset {
        let mut dataset = Dataset::new(id, mode, self.allocator.clone());
        dataset.set_trigger_spec(self.trigger_spec.clone());
        dataset
    }
}

pub type CreateSource = Arc<
    dyn Fn(&dyn ProcedureSpec, DatasetId, &ExecutionContext) -> Result<Box<dyn Source>>
        + Send
        + Sync,
>;

/// Builds a transformation and returns it along with the downstream handle
/// of the dataset it writes to.
pub type CreateTransformation = Arc<
    dyn Fn(
            DatasetId,
            AccumulationMode,
            &dyn ProcedureSpec,
            &ExecutionContext,
        ) -> Result<(Box<dyn Transformation>, Downstream)>
        + Send
        + Sync,
>;

/// Constructors for every procedure kind the executor can run.
///
/// Populated once at startup, then shared read only.
#[derive(Default, Clone)]
pub struct Registry {
    sources: HashMap<ProcedureKind, CreateSource>,
    transformations: HashMap<ProcedureKind, CreateTransformation>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sources: Vec<_> = self.sources.keys().collect();
        sources.sort();
        let mut transformations: Vec<_> = self.transformations.keys().collect();
        transformations.sort();
        f.debug_struct("Registry")
            .field("sources", &sources)
            .field("transformations", &transformations)
            .finish()
    }
}

fn duplicate(kind: ProcedureKind) -> DbError {
    DbError::new("Procedure kind registered twice")
        .with_kind(ErrorKind::DuplicateRegistration)
        .with_field("kind", kind)
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<F>(&mut self, kind: ProcedureKind, create: F) -> Result<()>
    where
        F: Fn(&dyn ProcedureSpec, DatasetId, &ExecutionContext) -> Result<Box<dyn Source>>
            + Send
            + Sync
            + 'static,
    {
        if self.sources.contains_key(kind) || self.transformations.contains_key(kind) {
            return Err(duplicate(kind));
        }
        self.sources.insert(kind, Arc::new(create));
        Ok(())
    }

    pub fn register_transformation<F>(&mut self, kind: ProcedureKind, create: F) -> Result<()>
    where
        F: Fn(
                DatasetId,
                AccumulationMode,
                &dyn ProcedureSpec,
                &ExecutionContext,
            ) -> Result<(Box<dyn Transformation>, Downstream)>
            + Send
            + Sync
            + 'static,
    {
        if self.sources.contains_key(kind) || self.transformations.contains_key(kind) {
            return Err(duplicate(kind));
        }
        self.transformations.insert(kind, Arc::new(create));
        Ok(())
    }

    pub fn source(&self, kind: &str) -> Option<&CreateSource> {
        self.sources.get(kind)
    }

    pub fn transformation(&self, kind: &str) -> Option<&CreateTransformation> {
        self.transformations.get(kind)
    }
}

/// Downcast a procedure spec to the concrete type a constructor expects.
pub fn downcast_spec<T: 'static>(spec: &dyn ProcedureSpec) -> Result<&T> {
    spec.as_any().downcast_ref::<T>().ok_or_else(|| {
        DbError::new("Unexpected procedure spec type")
            .with_kind(ErrorKind::InvalidPlan)
            .with_field("kind", spec.kind())
    })
}
