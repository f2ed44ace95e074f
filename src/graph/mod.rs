//! Execution graph model: nodes wrapping module instances, port-level
//! bindings, and the normalized connection list.
//!
//! Adjacency (predecessors/successors) is always derived from the connection
//! list rather than stored separately, so the "bindings mirror connections"
//! invariant cannot drift.

mod order;

pub use order::{execution_levels, execution_order};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::module::Module;
use crate::types::DataMap;

/// Graph-shape errors, rejected synchronously at call time rather than
/// discovered mid-cycle.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node id already exists: {node_id}")]
    #[diagnostic(code(visionflow::graph::duplicate_node))]
    DuplicateNode { node_id: String },

    #[error("node not found: {node_id}")]
    #[diagnostic(code(visionflow::graph::node_not_found))]
    NodeNotFound { node_id: String },

    #[error("pipeline has no nodes")]
    #[diagnostic(
        code(visionflow::graph::empty),
        help("Add at least one module before starting the pipeline.")
    )]
    EmptyGraph,

    #[error("cycle detected in pipeline graph")]
    #[diagnostic(
        code(visionflow::graph::cycle),
        help("Remove the circular connection; execution requires a DAG.")
    )]
    CycleDetected,
}

/// Normalized record of one port-to-port connection, kept alongside the
/// bindings registered on the two nodes it names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Connection {
    pub fn new(
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
            active: true,
        }
    }
}

/// One node of the execution graph: exactly one owned module plus its
/// port-level bindings and the previous cycle's result.
#[derive(Debug)]
pub struct GraphNode {
    pub node_id: String,
    pub module: Module,
    /// input port → (source node, source port)
    pub input_bindings: FxHashMap<String, (String, String)>,
    /// output port → [(target node, target input port)]
    pub output_bindings: FxHashMap<String, Vec<(String, String)>>,
    pub last_result: Option<DataMap>,
    pub last_duration: Duration,
}

impl GraphNode {
    fn new(node_id: String, module: Module) -> Self {
        Self {
            node_id,
            module,
            input_bindings: FxHashMap::default(),
            output_bindings: FxHashMap::default(),
            last_result: None,
            last_duration: Duration::ZERO,
        }
    }
}

/// Handle to a node shared between the executor API and per-node execution
/// tasks. Each task locks only its own node, so sibling nodes in a parallel
/// level never contend.
pub type SharedNode = Arc<Mutex<GraphNode>>;

/// The full node set plus the connection list.
#[derive(Default)]
pub struct PipelineGraph {
    nodes: FxHashMap<String, SharedNode>,
    /// Insertion order; gives deterministic iteration for ordering and
    /// introspection.
    order: Vec<String>,
    connections: Vec<Connection>,
}

impl PipelineGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module, returning the node id used for executor-local
    /// addressing.
    ///
    /// An explicitly requested duplicate id is rejected; when no id is given
    /// the module's own id is used and suffixed on the improbable collision.
    pub fn add(&mut self, module: Module, node_id: Option<String>) -> Result<String, GraphError> {
        let node_id = match node_id {
            Some(id) => {
                if self.nodes.contains_key(&id) {
                    return Err(GraphError::DuplicateNode { node_id: id });
                }
                id
            }
            None => {
                let base = module.id().to_string();
                let mut candidate = base.clone();
                let mut n = 1;
                while self.nodes.contains_key(&candidate) {
                    n += 1;
                    candidate = format!("{base}-{n}");
                }
                candidate
            }
        };
        tracing::info!(node = %node_id, module = %module.name(), "module added to pipeline");
        self.nodes.insert(
            node_id.clone(),
            Arc::new(Mutex::new(GraphNode::new(node_id.clone(), module))),
        );
        self.order.push(node_id.clone());
        Ok(node_id)
    }

    /// Remove a node, cascading the cleanup of every binding and connection
    /// that references it.
    pub async fn remove(&mut self, node_id: &str) -> Result<(), GraphError> {
        let removed = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
        drop(removed);
        self.order.retain(|id| id != node_id);
        self.connections
            .retain(|c| c.source != node_id && c.target != node_id);
        for other in self.nodes.values() {
            let mut guard = other.lock().await;
            guard
                .input_bindings
                .retain(|_, (source, _)| source != node_id);
            for targets in guard.output_bindings.values_mut() {
                targets.retain(|(target, _)| target != node_id);
            }
            guard.output_bindings.retain(|_, targets| !targets.is_empty());
        }
        tracing::info!(node = %node_id, "module removed from pipeline");
        Ok(())
    }

    /// Wire `source.source_port` into `target.target_port`.
    ///
    /// A target port holds at most one binding. Connecting into an occupied
    /// port rewires it: the superseded edge is removed in full, both its
    /// connection record and the old source's output binding, so the
    /// connection list keeps mirroring the bindings on every node. Repeating
    /// an identical connect is a no-op rather than a duplicate record.
    pub async fn connect(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<(), GraphError> {
        let source_node = self.shared(source)?;
        let target_node = self.shared(target)?;

        let superseded = {
            let mut guard = target_node.lock().await;
            guard.input_bindings.insert(
                target_port.to_string(),
                (source.to_string(), source_port.to_string()),
            )
        };
        if let Some((old_source, old_port)) = superseded {
            if old_source == source && old_port == source_port {
                // Same edge again; bindings and record are already in place.
                return Ok(());
            }
            if let Some(old_node) = self.nodes.get(&old_source) {
                let mut guard = old_node.lock().await;
                if let Some(targets) = guard.output_bindings.get_mut(&old_port) {
                    targets.retain(|(t, p)| !(t == target && p == target_port));
                    if targets.is_empty() {
                        guard.output_bindings.remove(&old_port);
                    }
                }
            }
            self.connections
                .retain(|c| !(c.active && c.target == target && c.target_port == target_port));
            tracing::warn!(
                "rewired {target}.{target_port}: dropped edge from {old_source}.{old_port}"
            );
        }

        {
            let mut guard = source_node.lock().await;
            guard
                .output_bindings
                .entry(source_port.to_string())
                .or_default()
                .push((target.to_string(), target_port.to_string()));
        }
        self.connections
            .push(Connection::new(source, source_port, target, target_port));
        tracing::info!(
            "connected {source}.{source_port} -> {target}.{target_port}"
        );
        Ok(())
    }

    /// Remove a previously registered connection. Unknown node ids are
    /// rejected; a connection that was never made is a silent no-op.
    pub async fn disconnect(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<(), GraphError> {
        let source_node = self.shared(source)?;
        let target_node = self.shared(target)?;
        {
            let mut guard = source_node.lock().await;
            if let Some(targets) = guard.output_bindings.get_mut(source_port) {
                targets.retain(|(t, p)| !(t == target && p == target_port));
                if targets.is_empty() {
                    guard.output_bindings.remove(source_port);
                }
            }
        }
        {
            let mut guard = target_node.lock().await;
            if let Some((s, p)) = guard.input_bindings.get(target_port)
                && s == source
                && p == source_port
            {
                guard.input_bindings.remove(target_port);
            }
        }
        self.connections.retain(|c| {
            !(c.source == source
                && c.source_port == source_port
                && c.target == target
                && c.target_port == target_port)
        });
        tracing::info!(
            "disconnected {source}.{source_port} -> {target}.{target_port}"
        );
        Ok(())
    }

    /// Toggle a connection without forgetting it. Deactivating removes the
    /// bindings from both nodes (so routing and ordering ignore the edge)
    /// while the record stays in the connection list for introspection and
    /// export; reactivating restores the bindings.
    pub async fn set_connection_active(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
        active: bool,
    ) -> Result<(), GraphError> {
        let source_node = self.shared(source)?;
        let target_node = self.shared(target)?;
        let Some(conn) = self.connections.iter_mut().find(|c| {
            c.source == source
                && c.source_port == source_port
                && c.target == target
                && c.target_port == target_port
        }) else {
            return Ok(());
        };
        if conn.active == active {
            return Ok(());
        }
        conn.active = active;

        if active {
            let mut guard = source_node.lock().await;
            guard
                .output_bindings
                .entry(source_port.to_string())
                .or_default()
                .push((target.to_string(), target_port.to_string()));
            drop(guard);
            let mut guard = target_node.lock().await;
            guard.input_bindings.insert(
                target_port.to_string(),
                (source.to_string(), source_port.to_string()),
            );
        } else {
            let mut guard = source_node.lock().await;
            if let Some(targets) = guard.output_bindings.get_mut(source_port) {
                targets.retain(|(t, p)| !(t == target && p == target_port));
                if targets.is_empty() {
                    guard.output_bindings.remove(source_port);
                }
            }
            drop(guard);
            let mut guard = target_node.lock().await;
            if let Some((s, p)) = guard.input_bindings.get(target_port)
                && s == source
                && p == source_port
            {
                guard.input_bindings.remove(target_port);
            }
        }
        Ok(())
    }

    fn shared(&self, node_id: &str) -> Result<SharedNode, GraphError> {
        self.nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.to_string(),
            })
    }

    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<SharedNode> {
        self.nodes.get(node_id).cloned()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Distinct predecessor node ids of `node_id`, from active connections.
    #[must_use]
    pub fn predecessors(&self, node_id: &str) -> Vec<String> {
        let mut preds = Vec::new();
        for c in self.connections.iter().filter(|c| c.active) {
            if c.target == node_id && !preds.contains(&c.source) {
                preds.push(c.source.clone());
            }
        }
        preds
    }

    /// Distinct successor node ids of `node_id`, from active connections.
    #[must_use]
    pub fn successors(&self, node_id: &str) -> Vec<String> {
        let mut succs = Vec::new();
        for c in self.connections.iter().filter(|c| c.active) {
            if c.source == node_id && !succs.contains(&c.target) {
                succs.push(c.target.clone());
            }
        }
        succs
    }
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("nodes", &self.order)
            .field("connections", &self.connections.len())
            .finish()
    }
}
