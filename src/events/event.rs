use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::metrics::MetricsSnapshot;
use crate::types::ExecutorStatus;

/// Which edge of a node's execution a [`ModuleStepEvent`] marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Start,
    End,
}

/// Everything the pipeline reports while running, delivered to sinks via the
/// [`EventBus`](super::EventBus).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    CycleResult(CycleResultEvent),
    ExecError(ExecErrorEvent),
    ModuleStep(ModuleStepEvent),
    Metrics(MetricsEvent),
    Diagnostic(DiagnosticEvent),
}

/// Node-granular progress within one cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub cycle: u64,
    pub node_id: String,
    pub completed: usize,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

/// End-of-cycle summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleResultEvent {
    pub cycle: u64,
    pub aborted: bool,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// A node or pipeline failure surfaced to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecErrorEvent {
    pub node_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Start/end marker around a single node execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleStepEvent {
    pub cycle: u64,
    pub node_id: String,
    pub phase: StepPhase,
    pub timestamp: DateTime<Utc>,
}

/// Periodic metrics snapshot from the reporter task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub snapshot: MetricsSnapshot,
}

/// Free-form scoped message; also carries executor status transitions under
/// the `status` scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn progress(cycle: u64, node_id: impl Into<String>, completed: usize, total: usize) -> Self {
        Self::Progress(ProgressEvent {
            cycle,
            node_id: node_id.into(),
            completed,
            total,
            timestamp: Utc::now(),
        })
    }

    pub fn cycle_result(cycle: u64, aborted: bool, duration_secs: f64) -> Self {
        Self::CycleResult(CycleResultEvent {
            cycle,
            aborted,
            duration_secs,
            timestamp: Utc::now(),
        })
    }

    pub fn exec_error(node_id: Option<String>, message: impl Into<String>) -> Self {
        Self::ExecError(ExecErrorEvent {
            node_id,
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn module_step(cycle: u64, node_id: impl Into<String>, phase: StepPhase) -> Self {
        Self::ModuleStep(ModuleStepEvent {
            cycle,
            node_id: node_id.into(),
            phase,
            timestamp: Utc::now(),
        })
    }

    pub fn metrics(snapshot: MetricsSnapshot) -> Self {
        Self::Metrics(MetricsEvent { snapshot })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    /// Status transitions ride the diagnostic channel under a fixed scope.
    pub fn status_change(status: ExecutorStatus) -> Self {
        Self::diagnostic("status", status.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::CycleResult(_) => "cycle_result",
            Self::ExecError(_) => "exec_error",
            Self::ModuleStep(_) => "module_step",
            Self::Metrics(_) => "metrics",
            Self::Diagnostic(_) => "diagnostic",
        }
    }

    /// Normalized JSON shape: `{type, timestamp, payload}`.
    pub fn to_json_value(&self) -> Value {
        let payload = match self {
            Self::Progress(e) => json!({
                "cycle": e.cycle, "node_id": e.node_id,
                "completed": e.completed, "total": e.total,
            }),
            Self::CycleResult(e) => json!({
                "cycle": e.cycle, "aborted": e.aborted,
                "duration_secs": e.duration_secs,
            }),
            Self::ExecError(e) => json!({
                "node_id": e.node_id, "message": e.message,
            }),
            Self::ModuleStep(e) => json!({
                "cycle": e.cycle, "node_id": e.node_id, "phase": e.phase,
            }),
            Self::Metrics(e) => serde_json::to_value(&e.snapshot).unwrap_or(Value::Null),
            Self::Diagnostic(e) => json!({
                "scope": e.scope, "message": e.message,
            }),
        };
        json!({
            "type": self.kind(),
            "timestamp": self.timestamp().to_rfc3339(),
            "payload": payload,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Progress(e) => e.timestamp,
            Self::CycleResult(e) => e.timestamp,
            Self::ExecError(e) => e.timestamp,
            Self::ModuleStep(e) => e.timestamp,
            Self::Metrics(e) => e.snapshot.taken_at,
            Self::Diagnostic(e) => e.timestamp,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(e) => {
                write!(f, "[cycle {}] {} ({}/{})", e.cycle, e.node_id, e.completed, e.total)
            }
            Self::CycleResult(e) => {
                if e.aborted {
                    write!(f, "[cycle {}] aborted after {:.3}s", e.cycle, e.duration_secs)
                } else {
                    write!(f, "[cycle {}] completed in {:.3}s", e.cycle, e.duration_secs)
                }
            }
            Self::ExecError(e) => match &e.node_id {
                Some(node) => write!(f, "[{node}] error: {}", e.message),
                None => write!(f, "pipeline error: {}", e.message),
            },
            Self::ModuleStep(e) => {
                let phase = match e.phase {
                    StepPhase::Start => "start",
                    StepPhase::End => "end",
                };
                write!(f, "[cycle {}] {} {phase}", e.cycle, e.node_id)
            }
            Self::Metrics(e) => {
                write!(
                    f,
                    "metrics: {} cycles, {} nodes tracked",
                    e.snapshot.pipeline.exec_count,
                    e.snapshot.nodes.len()
                )
            }
            Self::Diagnostic(e) => write!(f, "[{}] {}", e.scope, e.message),
        }
    }
}
