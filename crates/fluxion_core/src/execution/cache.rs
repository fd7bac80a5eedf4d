use std::collections::BTreeMap;
use std::sync::Arc;

use fluxion_error::Result;

use super::trigger::{Trigger, TriggerSpec};
use crate::arrays::allocator::Allocator;
use crate::arrays::builder::TableBuilder;
use crate::arrays::group_key::GroupKey;

/// Builder, trigger and emission state for one group key.
#[derive(Debug)]
pub(crate) struct TableState {
    pub(crate) builder: TableBuilder,
    pub(crate) trigger: Box<dyn Trigger>,
    /// Set once a table for this key has been sent downstream.
    pub(crate) emitted: bool,
}

/// Table builders of a dataset, one per group key.
///
/// Keys are kept ordered so triggers are evaluated and tables emitted in
/// group key order.
#[derive(Debug)]
pub struct TableBuilderCache {
    allocator: Arc<Allocator>,
    trigger_spec: TriggerSpec,
    tables: BTreeMap<GroupKey, TableState>,
}

impl TableBuilderCache {
    pub fn new(allocator: Arc<Allocator>) -> Self {
        TableBuilderCache {
            allocator,
            trigger_spec: TriggerSpec::default(),
            tables: BTreeMap::new(),
        }
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    pub fn trigger_spec(&self) -> &TriggerSpec {
        &self.trigger_spec
    }

    /// Set the trigger used for keys created after this call.
    pub fn set_trigger_spec(&mut self, spec: TriggerSpec) {
        self.trigger_spec = spec;
    }

    /// Get the builder for `key`, creating it if needed.
    ///
    /// The returned bool is true if the builder was created by this call.
    pub fn table_builder(&mut self, key: &GroupKey) -> (&mut TableBuilder, bool) {
        let mut created = false;
        let state = self.tables.entry(key.clone()).or_insert_with(|| {
            created = true;
            TableState {
                builder: TableBuilder::new(key.clone(), &self.allocator),
                trigger: self.trigger_spec.new_trigger(),
                emitted: false,
            }
        });
        (&mut state.builder, created)
    }

    pub fn get(&self, key: &GroupKey) -> Option<&TableBuilder> {
        self.tables.get(key).map(|s| &s.builder)
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.tables.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Keys with live builders, in order.
    pub fn keys(&self) -> Vec<GroupKey> {
        self.tables.keys().cloned().collect()
    }

    pub fn for_each_builder<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&GroupKey, &mut TableBuilder) -> Result<()>,
    {
        for (key, state) in self.tables.iter_mut() {
            f(key, &mut state.builder)?;
        }
        Ok(())
    }

    /// Clear the rows buffered for `key`, keeping its columns and trigger.
    pub fn discard_table(&mut self, key: &GroupKey) {
        if let Some(state) = self.tables.get_mut(key) {
            state.builder.clear_data();
        }
    }

    /// Remove all state for `key`. Returns false if the key was not present.
    pub fn expire_table(&mut self, key: &GroupKey) -> bool {
        self.tables.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub(crate) fn state_mut(&mut self, key: &GroupKey) -> Option<&mut TableState> {
        self.tables.get_mut(key)
    }
}
