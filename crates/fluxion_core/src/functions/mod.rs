//! Builtin procedures.

pub mod aggregates;
pub mod filter;
pub mod from_tables;
pub mod selectors;
pub mod sort;

use std::any::Any;

use fluxion_error::Result;

use crate::execution::registry::Registry;
use crate::plan::{ProcedureKind, ProcedureSpec};

pub const YIELD_KIND: ProcedureKind = "yield";

/// Default name of the result a query yields.
pub const DEFAULT_YIELD_NAME: &str = "_result";

/// Names a result. Yield nodes are removed from the execution graph, their
/// input feeds the result directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YieldProcedureSpec {
    pub name: String,
}

impl YieldProcedureSpec {
    pub fn new(name: impl Into<String>) -> Self {
        YieldProcedureSpec { name: name.into() }
    }
}

impl Default for YieldProcedureSpec {
    fn default() -> Self {
        Self::new(DEFAULT_YIELD_NAME)
    }
}

impl ProcedureSpec for YieldProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        YIELD_KIND
    }

    fn has_side_effect(&self) -> bool {
        true
    }

    fn yield_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Register every builtin source and transformation.
pub fn register_builtins(registry: &mut Registry) -> Result<()> {
    from_tables::register(registry)?;
    aggregates::register(registry)?;
    selectors::register(registry)?;
    filter::register(registry)?;
    sort::register(registry)?;
    Ok(())
}

/// A registry holding only the builtins.
pub fn builtin_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use fluxion_error::ErrorKind;

    use super::*;

    #[test]
    fn builtins_register_once() {
        let mut registry = builtin_registry().unwrap();
        for kind in ["sum", "count", "mean", "first", "last", "min", "max", "filter", "sort"] {
            assert!(registry.transformation(kind).is_some(), "{kind}");
        }
        assert!(registry.source(from_tables::FROM_TABLES_KIND).is_some());

        let err = register_builtins(&mut registry).unwrap_err();
        assert_eq!(ErrorKind::DuplicateRegistration, err.kind());
    }
}
