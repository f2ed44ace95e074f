//! Persisted graph shape: enough to rebuild a pipeline through the
//! construction API, and the inverse export.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExecutorConfig;
use crate::executor::PipelineExecutor;
use crate::graph::{Connection, GraphError};
use crate::module::ModuleRegistry;
use crate::types::{DataMap, new_data_map};

#[derive(Debug, Error, Diagnostic)]
pub enum BlueprintError {
    #[error("unknown module kind: {kind}")]
    #[diagnostic(
        code(visionflow::blueprint::unknown_kind),
        help("Register the module (or its plugin) before building the blueprint.")
    )]
    UnknownKind { kind: String },

    #[error("module {node_id} rejected its configuration")]
    #[diagnostic(code(visionflow::blueprint::config_rejected))]
    ConfigRejected { node_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// One module descriptor inside a blueprint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Registry key (the processor's type tag).
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "new_data_map")]
    pub config: DataMap,
}

/// Serializable graph shape. The concrete file format is whatever serde
/// target the host picks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    pub modules: Vec<ModuleSpec>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl PipelineBlueprint {
    /// Reconstruct an executor from this shape. Unknown kinds and rejected
    /// configurations are hard errors; nothing is silently skipped.
    pub async fn build(
        &self,
        registry: &ModuleRegistry,
        config: ExecutorConfig,
    ) -> Result<PipelineExecutor, BlueprintError> {
        let executor = PipelineExecutor::with_config(config);
        for spec in &self.modules {
            let mut module =
                registry
                    .instantiate(&spec.kind)
                    .ok_or_else(|| BlueprintError::UnknownKind {
                        kind: spec.kind.clone(),
                    })?;
            if let Some(name) = &spec.name {
                module = module.with_name(name);
            }
            let node_id = executor.add_module(module, spec.node_id.clone()).await?;
            if !spec.config.is_empty()
                && !executor
                    .configure_module(&node_id, spec.config.clone())
                    .await
            {
                return Err(BlueprintError::ConfigRejected { node_id });
            }
        }
        for conn in &self.connections {
            executor
                .connect(&conn.source, &conn.source_port, &conn.target, &conn.target_port)
                .await?;
            if !conn.active {
                let graph = executor.graph_handle();
                graph
                    .lock()
                    .await
                    .set_connection_active(
                        &conn.source,
                        &conn.source_port,
                        &conn.target,
                        &conn.target_port,
                        false,
                    )
                    .await?;
            }
        }
        Ok(executor)
    }
}

impl PipelineExecutor {
    /// Snapshot the current graph as a blueprint, the inverse of
    /// [`PipelineBlueprint::build`].
    pub async fn export_blueprint(&self) -> PipelineBlueprint {
        let graph = self.graph_handle();
        let graph = graph.lock().await;
        let mut modules = Vec::with_capacity(graph.len());
        for node_id in graph.node_ids() {
            if let Some(node) = graph.node(node_id) {
                let guard = node.lock().await;
                modules.push(ModuleSpec {
                    kind: guard.module.type_tag().to_string(),
                    node_id: Some(node_id.clone()),
                    name: Some(guard.module.name().to_string()),
                    config: guard.module.config().clone(),
                });
            }
        }
        PipelineBlueprint {
            modules,
            connections: graph.connections().to_vec(),
        }
    }
}
