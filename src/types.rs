//! Core types shared across the visionflow engine.
//!
//! These are the fundamental vocabulary types: module and executor lifecycle
//! states, execution strategies, and the string-keyed value map that flows
//! between ports every cycle.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// String-keyed value mapping routed between module ports each cycle.
///
/// The same shape backs module configuration, per-cycle input/output caches,
/// and the shared data context accumulated while a cycle runs.
pub type DataMap = FxHashMap<String, serde_json::Value>;

/// Convenience constructor for an empty [`DataMap`].
#[must_use]
pub fn new_data_map() -> DataMap {
    FxHashMap::default()
}

/// Lifecycle state of a single module instance.
///
/// Transitions are guarded by [`Module`](crate::module::Module):
/// `start` only from `Idle`/`Stopped`, `pause` only from `Running`,
/// `resume` only from `Paused`, `stop` from `Running`/`Paused`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Idle,
    Running,
    Paused,
    Error,
    Stopped,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of the pipeline executor itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorStatus {
    Idle,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Strategy used to drive one cycle of the graph.
///
/// `Pipeline` is accepted for forward compatibility and currently falls back
/// to the sequential driver. The adaptive-concurrent refinement of the
/// sequential strategy is enabled separately via
/// [`ExecutorConfig::adaptive_parallel`](crate::config::ExecutorConfig).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
    Pipeline,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Pipeline => "pipeline",
        };
        write!(f, "{s}")
    }
}

impl ExecutionMode {
    /// Parse a mode from its persisted string form; unknown strings fall back
    /// to `Sequential`.
    pub fn decode(s: &str) -> Self {
        match s {
            "parallel" => Self::Parallel,
            "pipeline" => Self::Pipeline,
            _ => Self::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_decode_round_trip() {
        for mode in [
            ExecutionMode::Sequential,
            ExecutionMode::Parallel,
            ExecutionMode::Pipeline,
        ] {
            assert_eq!(ExecutionMode::decode(&mode.to_string()), mode);
        }
        assert_eq!(ExecutionMode::decode("bogus"), ExecutionMode::Sequential);
    }

    #[test]
    fn status_display_matches_serde() {
        let json = serde_json::to_string(&ExecutorStatus::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        assert_eq!(ExecutorStatus::Stopping.to_string(), "stopping");
    }
}
