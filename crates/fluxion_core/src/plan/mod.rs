//! Physical plan consumed by the executor.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, OptionExt, Result};
use serde::{Deserialize, Serialize};

use crate::execution::dataset::AccumulationMode;
use crate::execution::trigger::TriggerSpec;
use crate::values::time::{Bounds, Time};

/// Kind of a procedure, used to look up its constructor in the registry.
pub type ProcedureKind = &'static str;

/// Procedure specific arguments of a plan node.
pub trait ProcedureSpec: Debug + Sync + Send {
    fn kind(&self) -> ProcedureKind;

    /// Trigger for the dataset created for this node.
    fn trigger_spec(&self) -> TriggerSpec {
        TriggerSpec::default()
    }

    /// What the node's dataset does with a key's rows after emitting them.
    fn accumulation_mode(&self) -> AccumulationMode {
        AccumulationMode::Accumulating
    }

    /// True if the node's effect matters even when nothing reads its output.
    fn has_side_effect(&self) -> bool {
        false
    }

    /// Name of the result this node yields, set only for yield nodes.
    fn yield_name(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Resource limits for running a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Number of dispatcher workers. Must be non-zero.
    pub concurrency_quota: usize,
    /// Max bytes held by tables and builders. Zero means unlimited.
    pub memory_bytes_quota: usize,
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: String,
    pub spec: Arc<dyn ProcedureSpec>,
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
    pub bounds: Option<Bounds>,
}

impl PlanNode {
    pub fn kind(&self) -> ProcedureKind {
        self.spec.kind()
    }

    pub fn is_yield(&self) -> bool {
        self.spec.yield_name().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub nodes: BTreeMap<String, PlanNode>,
    pub now: Time,
    pub resources: Resources,
}

impl PlanSpec {
    pub fn node(&self, id: &str) -> Result<&PlanNode> {
        self.nodes.get(id).required_with(|| {
            DbError::new("Missing plan node")
                .with_kind(ErrorKind::InvalidPlan)
                .with_field("node", id)
        })
    }

    /// Nodes without successors, in id order.
    pub fn roots(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.values().filter(|n| n.successors.is_empty())
    }

    /// Follow yield nodes back to the first non-yield predecessor.
    pub fn skip_yields<'a>(&'a self, mut node: &'a PlanNode) -> Result<&'a PlanNode> {
        while node.is_yield() {
            let pred = node.predecessors.first().required_with(|| {
                DbError::new("Yield node has no predecessor")
                    .with_kind(ErrorKind::InvalidPlan)
                    .with_field("node", &node.id)
            })?;
            node = self.node(pred)?;
        }
        Ok(node)
    }

    /// Visit every node after all of its predecessors.
    ///
    /// The order is deterministic: roots are walked in id order and
    /// predecessors in the order they were added.
    pub fn bottom_up_walk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&PlanNode) -> Result<()>,
    {
        let mut visited = BTreeSet::new();
        let mut visiting = BTreeSet::new();
        for root in self.roots() {
            self.walk(root, &mut visited, &mut visiting, &mut f)?;
        }
        if visited.len() != self.nodes.len() {
            return Err(DbError::new("Plan contains nodes unreachable from a root")
                .with_kind(ErrorKind::InvalidPlan));
        }
        Ok(())
    }

    fn walk<'a, F>(
        &'a self,
        node: &'a PlanNode,
        visited: &mut BTreeSet<&'a str>,
        visiting: &mut BTreeSet<&'a str>,
        f: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&PlanNode) -> Result<()>,
    {
        if visited.contains(node.id.as_str()) {
            return Ok(());
        }
        if !visiting.insert(node.id.as_str()) {
            return Err(DbError::new("Plan contains a cycle")
                .with_kind(ErrorKind::InvalidPlan)
                .with_field("node", &node.id));
        }
        for pred in &node.predecessors {
            self.walk(self.node(pred)?, visited, visiting, f)?;
        }
        visiting.remove(node.id.as_str());
        visited.insert(node.id.as_str());
        f(node)
    }
}

/// Builds plans node by node.
#[derive(Debug)]
pub struct PlanBuilder {
    nodes: BTreeMap<String, PlanNode>,
    now: Time,
    resources: Resources,
}

impl PlanBuilder {
    pub fn new() -> Self {
        PlanBuilder {
            nodes: BTreeMap::new(),
            now: Time::default(),
            resources: Resources {
                concurrency_quota: 1,
                memory_bytes_quota: 0,
            },
        }
    }

    pub fn with_now(mut self, now: Time) -> Self {
        self.now = now;
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Add a node. `predecessors` must already be in the plan.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        spec: impl ProcedureSpec + 'static,
        predecessors: &[&str],
    ) -> Result<&mut Self> {
        self.add_node_with_bounds(id, spec, predecessors, None)
    }

    pub fn add_node_with_bounds(
        &mut self,
        id: impl Into<String>,
        spec: impl ProcedureSpec + 'static,
        predecessors: &[&str],
        bounds: Option<Bounds>,
    ) -> Result<&mut Self> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(DbError::new("Duplicate plan node")
                .with_kind(ErrorKind::InvalidPlan)
                .with_field("node", id));
        }
        for pred in predecessors {
            let parent = self.nodes.get_mut(*pred).required_with(|| {
                DbError::new("Unknown predecessor")
                    .with_kind(ErrorKind::InvalidPlan)
                    .with_field("node", &id)
                    .with_field("predecessor", pred)
            })?;
            parent.successors.push(id.clone());
        }
        self.nodes.insert(
            id.clone(),
            PlanNode {
                id,
                spec: Arc::new(spec),
                predecessors: predecessors.iter().map(|p| p.to_string()).collect(),
                successors: Vec::new(),
                bounds,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> PlanSpec {
        PlanSpec {
            nodes: self.nodes,
            now: self.now,
            resources: self.resources,
        }
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestSpec(&'static str);

    impl ProcedureSpec for TestSpec {
        fn kind(&self) -> ProcedureKind {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn walk_visits_predecessors_first() {
        let mut b = PlanBuilder::new();
        b.add_node("a", TestSpec("src"), &[]).unwrap();
        b.add_node("b", TestSpec("src"), &[]).unwrap();
        b.add_node("c", TestSpec("union"), &["b", "a"]).unwrap();
        b.add_node("d", TestSpec("sum"), &["c"]).unwrap();
        b.add_node("e", TestSpec("count"), &["a"]).unwrap();
        let plan = b.build();

        let mut order = Vec::new();
        plan.bottom_up_walk(|n| {
            order.push(n.id.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(vec!["b", "a", "c", "d", "e"], order);
        assert_eq!(vec!["c", "e"], plan.node("a").unwrap().successors);
    }

    #[test]
    fn unknown_predecessor_rejected() {
        let mut b = PlanBuilder::new();
        let err = b.add_node("a", TestSpec("sum"), &["missing"]).unwrap_err();
        assert_eq!(ErrorKind::InvalidPlan, err.kind());
    }

    #[test]
    fn cycle_detected() {
        let mut b = PlanBuilder::new();
        b.add_node("a", TestSpec("src"), &[]).unwrap();
        b.add_node("b", TestSpec("sum"), &["a"]).unwrap();
        let mut plan = b.build();
        // Make `a` depend on `b` to close the loop.
        plan.nodes.get_mut("a").unwrap().predecessors.push("b".to_string());

        let err = plan.bottom_up_walk(|_| Ok(())).unwrap_err();
        assert_eq!(ErrorKind::InvalidPlan, err.kind());
    }
}
