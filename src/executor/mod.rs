//! Pipeline executor: construction API, lifecycle control, queues, and
//! introspection.
//!
//! One executor owns one [`PipelineGraph`] plus the channels around it: an
//! input queue fed by the host, an output queue yielding each cycle's merged
//! result, and the event bus subscribers hang sinks on. The background
//! worker (see [`worker`]) is the single logical cycle driver.

mod cycle;
mod worker;

pub use cycle::CycleError;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex as PlMutex;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::config::ExecutorConfig;
use crate::events::{
    CallbackSink, CycleResultEvent, EventBus, EventEmitter, EventSink, ExecErrorEvent,
    ModuleStepEvent, PipelineEvent, ProgressEvent,
};
use crate::graph::{Connection, GraphError, PipelineGraph, execution_order};
use crate::metrics::{MetricsHub, MetricsSnapshot, spawn_reporter};
use crate::module::{Module, ModuleSnapshot};
use crate::types::{DataMap, ExecutionMode, ExecutorStatus, ModuleStatus};

use self::cycle::CycleDriver;
use self::worker::WorkerContext;

/// Executor-level counters for host status panels.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutorState {
    pub status: ExecutorStatus,
    pub mode: ExecutionMode,
    pub cycles: u64,
    pub errors: u64,
    pub nodes: usize,
}

/// Serializable picture of the graph for diagnostic and visualization
/// consumers.
#[derive(Clone, Debug, Serialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub connections: Vec<Connection>,
    /// Present when the graph is currently acyclic.
    pub execution_order: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeView {
    pub node_id: String,
    pub module: ModuleSnapshot,
    pub last_duration_secs: f64,
}

/// The engine facade hosts drive.
pub struct PipelineExecutor {
    graph: Arc<Mutex<PipelineGraph>>,
    config: ExecutorConfig,
    status: Arc<PlMutex<ExecutorStatus>>,
    metrics: MetricsHub,
    bus: EventBus,
    emitter: EventEmitter,
    input_tx: flume::Sender<DataMap>,
    input_rx: flume::Receiver<DataMap>,
    output_tx: flume::Sender<DataMap>,
    output_rx: flume::Receiver<DataMap>,
    pause_tx: watch::Sender<bool>,
    stop_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
    cycle_counter: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor {
    /// Executor with default configuration and a stdout sink on the bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ExecutorConfig) -> Self {
        let bus = EventBus::default();
        let emitter = bus.emitter();
        let (input_tx, input_rx) = flume::unbounded();
        let (output_tx, output_rx) = flume::unbounded();
        let (pause_tx, _) = watch::channel(false);
        let (stop_tx, _) = watch::channel(false);
        Self {
            graph: Arc::new(Mutex::new(PipelineGraph::new())),
            config,
            status: Arc::new(PlMutex::new(ExecutorStatus::Idle)),
            metrics: MetricsHub::new(),
            bus,
            emitter,
            input_tx,
            input_rx,
            output_tx,
            output_rx,
            pause_tx,
            stop_tx,
            worker: None,
            reporter: None,
            cycle_counter: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    // ------------------------------------------------------------------
    // Construction API
    // ------------------------------------------------------------------

    /// Insert a module; returns the node id to address it by.
    pub async fn add_module(
        &self,
        module: Module,
        node_id: Option<String>,
    ) -> Result<String, GraphError> {
        self.graph.lock().await.add(module, node_id)
    }

    pub async fn remove_module(&self, node_id: &str) -> Result<(), GraphError> {
        self.graph.lock().await.remove(node_id).await
    }

    pub async fn connect(
        &self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<(), GraphError> {
        self.graph
            .lock()
            .await
            .connect(source, source_port, target, target_port)
            .await
    }

    pub async fn disconnect(
        &self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<(), GraphError> {
        self.graph
            .lock()
            .await
            .disconnect(source, source_port, target, target_port)
            .await
    }

    /// Apply a configuration mapping to one module. `false` when the node is
    /// unknown or the module rejected the config.
    pub async fn configure_module(&self, node_id: &str, config: DataMap) -> bool {
        let graph = self.graph.lock().await;
        match graph.node(node_id) {
            Some(node) => node.lock().await.module.configure(config),
            None => {
                tracing::warn!(node = %node_id, "configure for unknown node ignored");
                false
            }
        }
    }

    /// Change the cycle strategy. Ignored while the worker is running.
    pub fn set_execution_mode(&mut self, mode: ExecutionMode) -> bool {
        if self.is_active() {
            tracing::warn!(%mode, "execution mode change ignored while running");
            return false;
        }
        self.config.mode = mode;
        true
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Validate the graph, start every module, and launch the background
    /// worker (plus the metrics reporter when monitoring is enabled).
    ///
    /// Fails fast, leaving status untouched, when: the executor is already
    /// active, the graph is empty or cyclic, any module is in `Error` state,
    /// or any module refuses to start. Already-started modules are left
    /// as-is on a partial failure.
    #[instrument(skip_all)]
    pub async fn start(&mut self, initial_input: Option<DataMap>) -> bool {
        if !matches!(self.status(), ExecutorStatus::Idle | ExecutorStatus::Stopped) {
            tracing::warn!(status = %self.status(), "start ignored");
            return false;
        }

        {
            let graph = self.graph.lock().await;
            if graph.is_empty() {
                tracing::error!("cannot start: pipeline has no nodes");
                return false;
            }
            if let Err(err) = execution_order(&graph) {
                tracing::error!(error = %err, "cannot start: invalid graph");
                return false;
            }
            for node_id in graph.node_ids() {
                let node = graph.node(node_id).expect("node listed but missing");
                let mut guard = node.lock().await;
                if guard.module.status() == ModuleStatus::Error {
                    tracing::error!(node = %node_id, "cannot start: module in error state");
                    return false;
                }
                if !guard.module.start() {
                    tracing::error!(node = %node_id, "cannot start: module refused to start");
                    return false;
                }
            }
        }

        // Fresh run flags; receivers held by the executor keep both channels
        // alive across restarts.
        let _ = self.stop_tx.send(false);
        let _ = self.pause_tx.send(false);
        self.bus.listen();

        if let Some(packet) = initial_input {
            let _ = self.input_tx.send(packet);
        }

        self.worker = Some(worker::spawn(WorkerContext {
            graph: self.graph.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            emitter: self.emitter.clone(),
            status: self.status.clone(),
            input_rx: self.input_rx.clone(),
            output_tx: self.output_tx.clone(),
            pause: self.pause_tx.subscribe(),
            stop: self.stop_tx.subscribe(),
            cycle_counter: self.cycle_counter.clone(),
            error_count: self.error_count.clone(),
        }));
        if self.config.enable_monitoring {
            self.reporter = Some(spawn_reporter(
                self.metrics.clone(),
                self.emitter.clone(),
                self.config.metrics_interval,
                self.stop_tx.subscribe(),
            ));
        }

        self.set_status(ExecutorStatus::Running);
        tracing::info!(mode = %self.config.mode, "pipeline started");
        true
    }

    /// Signal the worker to exit, join it with a bounded wait, stop every
    /// module best-effort, and halt the reporter. Idempotent: `false` when
    /// nothing was running.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            tracing::warn!("stop ignored: executor not running");
            return false;
        };

        self.set_status(ExecutorStatus::Stopping);
        let _ = self.stop_tx.send(true);
        // Unpark a paused worker so it can observe the stop flag.
        let _ = self.pause_tx.send(false);

        if tokio::time::timeout(self.config.stop_join_timeout, worker)
            .await
            .is_err()
        {
            tracing::warn!("worker did not exit in time; aborting");
        }
        if let Some(reporter) = self.reporter.take()
            && tokio::time::timeout(Duration::from_secs(1), reporter)
                .await
                .is_err()
        {
            tracing::warn!("metrics reporter did not exit in time; aborting");
        }

        self.stop_all_modules().await;
        self.set_status(ExecutorStatus::Stopped);
        tracing::info!("pipeline stopped");
        true
    }

    /// Park the worker before its next cycle and pause every module. Valid
    /// only from `Running`; in-flight work is not interrupted.
    pub async fn pause(&self) -> bool {
        if self.status() != ExecutorStatus::Running {
            tracing::warn!(status = %self.status(), "pause ignored");
            return false;
        }
        let _ = self.pause_tx.send(true);
        self.for_each_module(|m| {
            m.pause();
        })
        .await;
        self.set_status(ExecutorStatus::Paused);
        true
    }

    /// Unpark the worker. Valid only from `Paused`; the next queued input is
    /// processed with no data loss.
    pub async fn resume(&self) -> bool {
        if self.status() != ExecutorStatus::Paused {
            tracing::warn!(status = %self.status(), "resume ignored");
            return false;
        }
        self.for_each_module(|m| {
            m.resume();
        })
        .await;
        let _ = self.pause_tx.send(false);
        self.set_status(ExecutorStatus::Running);
        true
    }

    /// Synchronous single-cycle variant, usable only from `Idle`.
    ///
    /// Validates and starts the graph, runs exactly one sequential cycle
    /// inline, stops every module, and returns the merged data context.
    /// `None` on any validation, start, or cycle failure (with started
    /// modules rolled back best-effort).
    #[instrument(skip_all)]
    pub async fn run_once(&mut self, initial_input: DataMap) -> Option<DataMap> {
        if self.status() != ExecutorStatus::Idle {
            tracing::warn!(status = %self.status(), "run_once requires an idle executor");
            return None;
        }

        let graph = self.graph.lock().await;
        if graph.is_empty() {
            tracing::error!("run_once: pipeline has no nodes");
            return None;
        }
        if let Err(err) = execution_order(&graph) {
            tracing::error!(error = %err, "run_once: invalid graph");
            return None;
        }

        let mut started: Vec<String> = Vec::new();
        for node_id in graph.node_ids() {
            let node = graph.node(node_id).expect("node listed but missing");
            let ok = node.lock().await.module.start();
            if !ok {
                tracing::error!(node = %node_id, "run_once: module refused to start");
                for id in &started {
                    if let Some(node) = graph.node(id) {
                        node.lock().await.module.stop();
                    }
                }
                return None;
            }
            started.push(node_id.clone());
        }

        self.bus.listen();
        let sequential = self.config.clone().with_mode(ExecutionMode::Sequential);
        let cycle = self.cycle_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let driver = CycleDriver {
            graph: &graph,
            config: &sequential,
            metrics: &self.metrics,
            emitter: &self.emitter,
            cycle,
        };
        let outcome = driver.run(initial_input).await;

        for id in &started {
            if let Some(node) = graph.node(id) {
                node.lock().await.module.stop();
            }
        }
        drop(graph);

        match outcome {
            Ok(outcome) => Some(outcome.merged),
            Err(err) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                self.emitter
                    .emit_lossy(PipelineEvent::exec_error(None, err.to_string()));
                tracing::error!(error = %err, "run_once failed");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Feed / drain
    // ------------------------------------------------------------------

    /// Enqueue an input packet for the worker. `false` if the queue is gone.
    pub fn submit(&self, packet: DataMap) -> bool {
        self.input_tx.send(packet).is_ok()
    }

    /// Non-blocking read of the next cycle result.
    pub fn try_recv_output(&self) -> Option<DataMap> {
        self.output_rx.try_recv().ok()
    }

    /// Await the next cycle result with a deadline.
    pub async fn recv_output(&self, wait: Duration) -> Option<DataMap> {
        tokio::time::timeout(wait, self.output_rx.recv_async())
            .await
            .ok()
            .and_then(Result::ok)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Attach any sink to the event bus.
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.bus.add_sink(sink);
    }

    /// Producer handle for custom emitters (tests, host bridges).
    #[must_use]
    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    pub fn on_progress(&self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.bus
            .add_sink(CallbackSink::new(move |event| {
                if let PipelineEvent::Progress(e) = event {
                    callback(e);
                }
            }));
    }

    pub fn on_result(&self, callback: impl Fn(&CycleResultEvent) + Send + Sync + 'static) {
        self.bus
            .add_sink(CallbackSink::new(move |event| {
                if let PipelineEvent::CycleResult(e) = event {
                    callback(e);
                }
            }));
    }

    pub fn on_error(&self, callback: impl Fn(&ExecErrorEvent) + Send + Sync + 'static) {
        self.bus
            .add_sink(CallbackSink::new(move |event| {
                if let PipelineEvent::ExecError(e) = event {
                    callback(e);
                }
            }));
    }

    pub fn on_module_step(&self, callback: impl Fn(&ModuleStepEvent) + Send + Sync + 'static) {
        self.bus
            .add_sink(CallbackSink::new(move |event| {
                if let PipelineEvent::ModuleStep(e) = event {
                    callback(e);
                }
            }));
    }

    pub fn on_metrics(&self, callback: impl Fn(&MetricsSnapshot) + Send + Sync + 'static) {
        self.bus
            .add_sink(CallbackSink::new(move |event| {
                if let PipelineEvent::Metrics(e) = event {
                    callback(&e.snapshot);
                }
            }));
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn status(&self) -> ExecutorStatus {
        *self.status.lock()
    }

    /// Executor counters for status panels.
    pub async fn state(&self) -> ExecutorState {
        ExecutorState {
            status: self.status(),
            mode: self.config.mode,
            cycles: self.cycle_counter.load(Ordering::Relaxed),
            errors: self.error_count.load(Ordering::Relaxed),
            nodes: self.graph.lock().await.len(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub async fn module_snapshot(&self, node_id: &str) -> Option<ModuleSnapshot> {
        let graph = self.graph.lock().await;
        let node = graph.node(node_id)?;
        let guard = node.lock().await;
        Some(guard.module.snapshot())
    }

    /// Full graph picture: node snapshots, connections, and the computed
    /// order when the graph is acyclic.
    pub async fn graph_view(&self) -> GraphView {
        let graph = self.graph.lock().await;
        let mut nodes = Vec::with_capacity(graph.len());
        for node_id in graph.node_ids() {
            if let Some(node) = graph.node(node_id) {
                let guard = node.lock().await;
                nodes.push(NodeView {
                    node_id: node_id.clone(),
                    module: guard.module.snapshot(),
                    last_duration_secs: guard.last_duration.as_secs_f64(),
                });
            }
        }
        GraphView {
            nodes,
            connections: graph.connections().to_vec(),
            execution_order: execution_order(&graph).ok(),
        }
    }

    pub(crate) fn graph_handle(&self) -> Arc<Mutex<PipelineGraph>> {
        self.graph.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn is_active(&self) -> bool {
        matches!(
            self.status(),
            ExecutorStatus::Running | ExecutorStatus::Paused | ExecutorStatus::Stopping
        )
    }

    fn set_status(&self, status: ExecutorStatus) {
        *self.status.lock() = status;
        self.emitter
            .emit_lossy(PipelineEvent::status_change(status));
    }

    async fn for_each_module(&self, f: impl Fn(&mut Module)) {
        let graph = self.graph.lock().await;
        for node_id in graph.node_ids() {
            if let Some(node) = graph.node(node_id) {
                let mut guard = node.lock().await;
                f(&mut guard.module);
            }
        }
    }

    async fn stop_all_modules(&self) {
        self.for_each_module(|m| {
            if !m.stop() && m.status() != ModuleStatus::Stopped {
                tracing::debug!(module = %m.name(), "module stop was a no-op");
            }
        })
        .await;
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("status", &self.status())
            .field("mode", &self.config.mode)
            .field("cycles", &self.cycle_counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
