use std::sync::Arc;

use fluxion_error::{DbError, Result};
use hashbrown::HashMap;

use crate::values::Value;

/// Runtime variable environment.
///
/// Lookups walk from the innermost scope out through its parents. Parents
/// are shared and never mutated, so cloning a scope takes a snapshot that
/// later writes to the original do not affect.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    parent: Option<Arc<Scope>>,
    values: HashMap<String, Value>,
    /// Scope snapshots taken when a named function was declared.
    captures: HashMap<String, Arc<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scope nested under `parent`.
    pub fn nested(parent: Arc<Scope>) -> Self {
        Scope {
            parent: Some(parent),
            values: HashMap::new(),
            captures: HashMap::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(v) => Some(v),
            None => self.parent.as_ref().and_then(|p| p.get(name)),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| DbError::new("Undefined identifier").with_field("name", name))
    }

    /// Iterate over names bound directly in this scope.
    pub fn local_names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Record a snapshot of this scope for a declared function.
    pub fn capture(&mut self, name: impl Into<String>) {
        let snapshot = Arc::new(self.clone());
        self.captures.insert(name.into(), snapshot);
    }

    pub fn captured(&self, name: &str) -> Result<Arc<Scope>> {
        match self.captures.get(name) {
            Some(s) => Ok(s.clone()),
            None => match &self.parent {
                Some(p) => p.captured(name),
                None => Err(DbError::new("No captured scope for function").with_field("name", name)),
            },
        }
    }
}
