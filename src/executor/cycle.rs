//! Per-cycle strategy drivers: sequential, parallel-by-level, and the
//! adaptive refinement of the sequential path.
//!
//! A driver borrows the graph for the whole cycle (the executor holds the
//! graph lock), never locks more than one node at a time itself, and hands
//! may-block or sibling nodes to spawned tasks that each lock only their own
//! node.

use miette::Diagnostic;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

use futures_util::future::join_all;

use crate::config::ExecutorConfig;
use crate::events::{EventEmitter, PipelineEvent, StepPhase};
use crate::graph::{GraphError, PipelineGraph, SharedNode, execution_levels, execution_order};
use crate::metrics::MetricsHub;
use crate::module::StepOutput;
use crate::types::{DataMap, ExecutionMode, new_data_map};

/// Fatal per-cycle failure. Only the ordered strategies produce `NodeRun`;
/// the parallel strategy isolates node failures instead.
#[derive(Debug, Error, Diagnostic)]
pub enum CycleError {
    #[error("node {node_id} failed: {message}")]
    #[diagnostic(
        code(visionflow::cycle::node_run),
        help("The worker loop exits on a fatal node failure; inspect the module's error list.")
    )]
    NodeRun { node_id: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// Result of one executed cycle.
pub(crate) struct CycleOutcome {
    /// Every node's raw outputs merged by key, plus the external packet.
    /// This is what the output queue yields.
    pub merged: DataMap,
    pub aborted: bool,
    pub duration: Duration,
}

/// Borrowed view of everything a strategy needs for one cycle.
pub(crate) struct CycleDriver<'a> {
    pub graph: &'a PipelineGraph,
    pub config: &'a ExecutorConfig,
    pub metrics: &'a MetricsHub,
    pub emitter: &'a EventEmitter,
    pub cycle: u64,
}

impl CycleDriver<'_> {
    /// Execute one cycle with the configured strategy.
    pub async fn run(&self, external: DataMap) -> Result<CycleOutcome, CycleError> {
        let started = Instant::now();
        let outcome = match self.config.mode {
            ExecutionMode::Parallel => self.run_parallel(external).await,
            // Pipeline is accepted but currently drives the sequential path.
            ExecutionMode::Sequential | ExecutionMode::Pipeline => {
                self.run_sequential(external).await
            }
        };
        match outcome {
            Ok((merged, aborted)) => {
                let duration = started.elapsed();
                self.metrics.record_cycle(duration);
                self.emitter.emit_lossy(PipelineEvent::cycle_result(
                    self.cycle,
                    aborted,
                    duration.as_secs_f64(),
                ));
                Ok(CycleOutcome {
                    merged,
                    aborted,
                    duration,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn run_sequential(&self, external: DataMap) -> Result<(DataMap, bool), CycleError> {
        let order = execution_order(self.graph)?;
        let mut state = CycleState::new(external, self.config.shared_context);
        let total = order.len();

        if self.config.adaptive_parallel {
            for level in execution_levels(self.graph)? {
                let aborted = self.run_level_adaptive(&level, &mut state, total).await?;
                if aborted {
                    return Ok((state.merged, true));
                }
            }
        } else {
            for (idx, node_id) in order.iter().enumerate() {
                let node = self.node(node_id)?;
                let step = self.execute_node(&node, node_id, &state.context).await?;
                let abort = step.is_abort();
                state.absorb(step);
                self.emit_progress(node_id, idx + 1, total);
                if abort {
                    tracing::debug!(node = %node_id, cycle = self.cycle, "cycle aborted by gate");
                    return Ok((state.merged, true));
                }
            }
        }
        Ok((state.merged, false))
    }

    /// One level under the adaptive refinement: may-block siblings run
    /// concurrently with a per-node timeout, everything else keeps strict
    /// order. A fatal failure in an ordered node still fails the cycle;
    /// failures in the concurrent set are isolated like the parallel
    /// strategy's.
    async fn run_level_adaptive(
        &self,
        level: &[String],
        state: &mut CycleState,
        total: usize,
    ) -> Result<bool, CycleError> {
        let mut ordered = Vec::new();
        let mut handles = Vec::new();
        for node_id in level {
            let node = self.node(node_id)?;
            let may_block = node.lock().await.module.capabilities().may_block;
            if may_block {
                let prepared = self.prepare_inputs(&node, &state.context).await;
                handles.push(self.spawn_node_task(node, node_id.clone(), prepared));
            } else {
                ordered.push((node_id, node));
            }
        }

        let mut aborted = false;
        for (node_id, node) in ordered {
            let step = self.execute_node(&node, node_id, &state.context).await?;
            if step.is_abort() {
                aborted = true;
            }
            state.absorb(step);
            state.completed += 1;
            self.emit_progress(node_id, state.completed, total);
        }

        for result in join_all(handles).await {
            match result {
                Ok((node_id, Some(step))) => {
                    if step.is_abort() {
                        aborted = true;
                    }
                    state.absorb(step);
                    state.completed += 1;
                    self.emit_progress(&node_id, state.completed, total);
                }
                Ok((node_id, None)) => {
                    state.completed += 1;
                    self.emit_progress(&node_id, state.completed, total);
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "node task panicked");
                }
            }
        }
        Ok(aborted)
    }

    async fn run_parallel(&self, external: DataMap) -> Result<(DataMap, bool), CycleError> {
        let levels = execution_levels(self.graph)?;
        let mut state = CycleState::new(external, self.config.shared_context);
        let total: usize = levels.iter().map(Vec::len).sum();

        for level in levels {
            let mut handles = Vec::with_capacity(level.len());
            for node_id in &level {
                let node = self.node(node_id)?;
                let prepared = self.prepare_inputs(&node, &state.context).await;
                handles.push(self.spawn_node_task(node, node_id.clone(), prepared));
            }
            // Barrier: outputs become visible to the next level only here.
            for result in join_all(handles).await {
                match result {
                    Ok((node_id, Some(step))) => {
                        if step.is_abort() {
                            tracing::debug!(
                                node = %node_id,
                                "abort signal ignored under the parallel strategy"
                            );
                        }
                        state.absorb(step);
                        state.completed += 1;
                        self.emit_progress(&node_id, state.completed, total);
                    }
                    Ok((node_id, None)) => {
                        state.completed += 1;
                        self.emit_progress(&node_id, state.completed, total);
                    }
                    Err(join_err) => {
                        tracing::error!(error = %join_err, "node task panicked");
                    }
                }
            }
        }
        Ok((state.merged, false))
    }

    /// Gather one node's inputs: for each declared input port, the bound
    /// source's last result wins; unbound ports (or sources that have not
    /// produced yet) fall back to the shared context by port name.
    async fn prepare_inputs(&self, node: &SharedNode, context: &DataMap) -> DataMap {
        let (bindings, input_names) = {
            let guard = node.lock().await;
            let names: Vec<String> = guard.module.ports().inputs.keys().cloned().collect();
            (guard.input_bindings.clone(), names)
        };

        let mut prepared = new_data_map();
        for name in input_names {
            if let Some((source, source_port)) = bindings.get(&name)
                && let Some(source_node) = self.graph.node(source)
            {
                let guard = source_node.lock().await;
                if let Some(last) = &guard.last_result
                    && let Some(value) = last.get(source_port)
                {
                    prepared.insert(name, value.clone());
                    continue;
                }
            }
            if let Some(value) = context.get(&name) {
                prepared.insert(name, value.clone());
            }
        }
        prepared
    }

    /// Run one node inline. Errors are fatal to the cycle (ordered
    /// strategies only call this).
    async fn execute_node(
        &self,
        node: &SharedNode,
        node_id: &str,
        context: &DataMap,
    ) -> Result<StepOutput, CycleError> {
        let prepared = self.prepare_inputs(node, context).await;
        self.emitter
            .emit_lossy(PipelineEvent::module_step(self.cycle, node_id, StepPhase::Start));

        let started = Instant::now();
        let mut guard = node.lock().await;
        guard.module.receive_inputs(&prepared);
        let result = guard.module.run_cycle().await;
        let elapsed = started.elapsed();

        match result {
            Ok(step) => {
                guard.last_result = Some(step.outputs.clone());
                guard.last_duration = elapsed;
                drop(guard);
                self.metrics.record_node(node_id, elapsed);
                self.emitter
                    .emit_lossy(PipelineEvent::module_step(self.cycle, node_id, StepPhase::End));
                Ok(step)
            }
            Err(err) => {
                drop(guard);
                tracing::error!(node = %node_id, error = %err, "node execution failed");
                self.emitter.emit_lossy(PipelineEvent::exec_error(
                    Some(node_id.to_string()),
                    err.to_string(),
                ));
                Err(CycleError::NodeRun {
                    node_id: node_id.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    /// Run one node on its own task with the configured wall-clock budget.
    /// Failures and timeouts are isolated: logged, reported, and the node
    /// simply contributes no outputs this cycle.
    fn spawn_node_task(
        &self,
        node: SharedNode,
        node_id: String,
        prepared: DataMap,
    ) -> JoinHandle<(String, Option<StepOutput>)> {
        let metrics = self.metrics.clone();
        let emitter = self.emitter.clone();
        let budget = self.config.node_timeout;
        let cycle = self.cycle;

        tokio::spawn(async move {
            emitter.emit_lossy(PipelineEvent::module_step(cycle, &node_id, StepPhase::Start));
            let started = Instant::now();
            let run = async {
                let mut guard = node.lock().await;
                guard.module.receive_inputs(&prepared);
                let result = guard.module.run_cycle().await;
                if let Ok(step) = &result {
                    guard.last_result = Some(step.outputs.clone());
                    guard.last_duration = started.elapsed();
                }
                result
            };
            match tokio::time::timeout(budget, run).await {
                Ok(Ok(step)) => {
                    metrics.record_node(&node_id, started.elapsed());
                    emitter.emit_lossy(PipelineEvent::module_step(cycle, &node_id, StepPhase::End));
                    (node_id, Some(step))
                }
                Ok(Err(err)) => {
                    tracing::error!(node = %node_id, error = %err, "node execution failed");
                    emitter.emit_lossy(PipelineEvent::exec_error(
                        Some(node_id.clone()),
                        err.to_string(),
                    ));
                    (node_id, None)
                }
                Err(_) => {
                    tracing::error!(node = %node_id, ?budget, "node timed out");
                    emitter.emit_lossy(PipelineEvent::exec_error(
                        Some(node_id.clone()),
                        format!("timed out after {budget:?}"),
                    ));
                    (node_id, None)
                }
            }
        })
    }

    fn node(&self, node_id: &str) -> Result<SharedNode, CycleError> {
        self.graph
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.to_string(),
            })
            .map_err(CycleError::from)
    }

    fn emit_progress(&self, node_id: &str, completed: usize, total: usize) {
        self.emitter
            .emit_lossy(PipelineEvent::progress(self.cycle, node_id, completed, total));
    }
}

/// Mutable cycle-local state shared by the strategy drivers.
struct CycleState {
    /// Fallback scope for unbound inputs. Only grows with node outputs when
    /// the shared-context feature is on.
    context: DataMap,
    /// Cycle result delivered to the output queue, always merged.
    merged: DataMap,
    shared_context: bool,
    completed: usize,
}

impl CycleState {
    fn new(external: DataMap, shared_context: bool) -> Self {
        Self {
            context: external.clone(),
            merged: external,
            shared_context,
            completed: 0,
        }
    }

    fn absorb(&mut self, step: StepOutput) {
        if self.shared_context {
            self.context.extend(step.outputs.clone());
        }
        self.merged.extend(step.outputs);
    }
}
