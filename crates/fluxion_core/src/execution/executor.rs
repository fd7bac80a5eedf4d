use std::collections::BTreeMap;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, OptionExt, Result, ResultExt};
use hashbrown::HashMap;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::dispatcher::Dispatcher;
use super::registry::{ExecutionContext, Registry};
use super::result::{QueryResult, new_result};
use super::source::{Source, run_source};
use super::transformation::{DatasetId, Downstream};
use super::transport::{SharedTransformation, Transport};
use crate::arrays::allocator::Allocator;
use crate::compiler::builtins::default_builtins;
use crate::compiler::scope::Scope;
use crate::config::ExecutorConfig;
use crate::plan::{PlanNode, PlanSpec};

/// Runs physical plans.
#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<Registry>,
    config: ExecutorConfig,
    builtins: Arc<Scope>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, config: ExecutorConfig) -> Self {
        Executor {
            registry,
            config,
            builtins: Arc::new(default_builtins()),
        }
    }

    /// Use `builtins` as the scope for functions compiled by procedures.
    pub fn with_builtins(mut self, builtins: Arc<Scope>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Build the execution graph for `plan` and start running it.
    ///
    /// Must be called from within a tokio runtime. Sources run on blocking
    /// tasks and deliveries on a dispatcher pool sized by the plan's
    /// concurrency quota. The returned results should be drained
    /// concurrently, a result nobody reads eventually stalls its producer.
    pub fn execute(
        &self,
        cancel: CancellationToken,
        plan: &PlanSpec,
        alloc: Arc<Allocator>,
    ) -> Result<BTreeMap<String, QueryResult>> {
        let handle = Handle::try_current().context("Executing a plan requires a tokio runtime")?;

        let resources = plan.resources;
        if resources.concurrency_quota == 0 {
            return Err(DbError::new("Plan must have a non-zero concurrency quota")
                .with_kind(ErrorKind::InvalidPlan));
        }
        alloc.set_limit(resources.memory_bytes_quota);
        debug!(
            concurrency = resources.concurrency_quota,
            memory_limit = resources.memory_bytes_quota,
            nodes = plan.nodes.len(),
            "executing plan"
        );

        let dispatcher =
            Dispatcher::try_new(resources.concurrency_quota, self.config.dispatcher_throughput)?;
        let mut state = ExecutionState {
            executor: self,
            plan,
            alloc,
            cancel: cancel.clone(),
            dispatcher: dispatcher.clone(),
            nodes: HashMap::new(),
            sources: Vec::new(),
            transports: Vec::new(),
            results: BTreeMap::new(),
        };
        plan.bottom_up_walk(|node| state.visit(node))?;

        let ExecutionState {
            sources,
            transports,
            results,
            ..
        } = state;
        start(handle, cancel, dispatcher, sources, transports, &results);
        Ok(results)
    }
}

/// Graph under construction.
struct ExecutionState<'a> {
    executor: &'a Executor,
    plan: &'a PlanSpec,
    alloc: Arc<Allocator>,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
    /// Output of every non-yield node built so far.
    nodes: HashMap<String, Downstream>,
    sources: Vec<Box<dyn Source>>,
    transports: Vec<Transport>,
    results: BTreeMap<String, QueryResult>,
}

impl ExecutionState<'_> {
    fn visit(&mut self, node: &PlanNode) -> Result<()> {
        if let Some(name) = node.spec.yield_name() {
            let producer = self.plan.skip_yields(node)?;
            return self.add_result(name, &producer.id);
        }

        let id = DatasetId::new(&node.id);
        let parents = node
            .predecessors
            .iter()
            .map(|p| {
                let pred = self.plan.node(p)?;
                Ok(self.plan.skip_yields(pred)?.id.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        let ctx = ExecutionContext {
            now: self.plan.now,
            bounds: node.bounds,
            allocator: self.alloc.clone(),
            parents: parents.iter().map(DatasetId::new).collect(),
            trigger_spec: node.spec.trigger_spec(),
            cancel: self.cancel.clone(),
            builtins: self.executor.builtins.clone(),
        };

        if node.predecessors.is_empty() {
            let create = self.executor.registry.source(node.kind()).required_with(|| {
                DbError::new("Unsupported source kind")
                    .with_kind(ErrorKind::InvalidPlan)
                    .with_field("kind", node.kind())
            })?;
            let source = create(node.spec.as_ref(), id, &ctx)?;
            trace!(node = %node.id, kind = node.kind(), "created source");
            self.nodes
                .insert(node.id.clone(), source.downstream().clone());
            self.sources.push(source);
            return Ok(());
        }

        let create = self
            .executor
            .registry
            .transformation(node.kind())
            .required_with(|| {
                DbError::new("Unsupported procedure kind")
                    .with_kind(ErrorKind::InvalidPlan)
                    .with_field("kind", node.kind())
            })?;
        let (transformation, downstream) =
            create(id, node.spec.accumulation_mode(), node.spec.as_ref(), &ctx)?;
        let target = SharedTransformation::new(transformation, parents.len());
        for parent in &parents {
            let parent_out = self.nodes.get(parent).required_with(|| {
                DbError::new("Predecessor not built before its successor")
                    .with_kind(ErrorKind::InvalidPlan)
                    .with_field("node", &node.id)
                    .with_field("predecessor", parent)
            })?;
            let transport = Transport::new(
                DatasetId::new(parent),
                self.dispatcher.clone(),
                target.clone(),
                self.executor.config.transport_buffer_size,
            );
            parent_out.add_transformation(Box::new(transport.clone()));
            self.transports.push(transport);
        }
        trace!(node = %node.id, kind = node.kind(), parents = parents.len(), "created transformation");
        self.nodes.insert(node.id.clone(), downstream);

        if node.spec.has_side_effect() && node.successors.is_empty() {
            self.add_result(&node.id, &node.id)?;
        }
        Ok(())
    }

    /// Attach a named result to the output of node `producer`.
    fn add_result(&mut self, name: &str, producer: &str) -> Result<()> {
        if self.results.contains_key(name) {
            return Err(DbError::new("Duplicate result name")
                .with_kind(ErrorKind::InvalidPlan)
                .with_field("result", name));
        }
        let out = self.nodes.get(producer).required_with(|| {
            DbError::new("Result producer not built")
                .with_kind(ErrorKind::InvalidPlan)
                .with_field("node", producer)
        })?;
        let (result, writer) = new_result(name, self.executor.config.result_buffer_size);
        out.add_transformation(Box::new(writer));
        debug!(result = name, node = producer, "registered result");
        self.results.insert(name.to_string(), result);
        Ok(())
    }
}

/// Start every source and the task that tears the run down.
fn start(
    handle: Handle,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
    sources: Vec<Box<dyn Source>>,
    transports: Vec<Transport>,
    results: &BTreeMap<String, QueryResult>,
) {
    dispatcher.start(cancel.clone());

    let source_tasks: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let cancel = cancel.clone();
            let dispatcher = dispatcher.clone();
            handle.spawn_blocking(move || run_source(source, cancel, dispatcher))
        })
        .collect();

    let finished: Vec<_> = transports.iter().map(|t| t.finished()).collect();
    let err_rx = dispatcher.err_receiver();
    let results: Vec<QueryResult> = results.values().cloned().collect();

    handle.spawn(async move {
        let done = async {
            for task in source_tasks {
                // Source failures are reported through the dispatcher.
                let _ = task.await;
            }
            for mut rx in finished {
                let _ = rx.wait_for(|finished| *finished).await;
            }
        };

        let err = tokio::select! {
            _ = done => None,
            _ = cancel.cancelled() => {
                Some(DbError::new("Query canceled").with_kind(ErrorKind::Canceled))
            }
            err = first_error(err_rx) => Some(err),
        };

        let err = match (err, dispatcher.stop()) {
            (Some(err), _) => Some(err),
            (None, Err(err)) => Some(err),
            (None, Ok(())) => None,
        };
        match err {
            Some(err) => {
                debug!(%err, "aborting results");
                for result in &results {
                    result.abort(err.clone());
                }
            }
            None => debug!("execution finished"),
        }
    });
}

/// Wait for the dispatcher's first error.
async fn first_error(mut rx: watch::Receiver<Option<DbError>>) -> DbError {
    let err = match rx.wait_for(Option::is_some).await {
        Ok(err) => err.clone(),
        Err(_) => None,
    };
    match err {
        Some(err) => err,
        None => futures::future::pending().await,
    }
}
