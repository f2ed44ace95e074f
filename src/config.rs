//! Executor configuration with environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ExecutionMode;

/// Tunables for a [`PipelineExecutor`](crate::executor::PipelineExecutor).
///
/// Defaults match a desktop host driving a camera-rate pipeline; every field
/// can be overridden from the environment via [`ExecutorConfig::from_env`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Strategy used by the worker loop for each cycle.
    pub mode: ExecutionMode,
    /// Refines the sequential path: siblings of a level whose capability
    /// descriptor marks them may-block run concurrently, everything else
    /// stays strictly ordered.
    pub adaptive_parallel: bool,
    /// Merge every node's raw outputs into a per-cycle shared context that
    /// unbound inputs fall back to.
    pub shared_context: bool,
    /// Run the interval metrics reporter while the pipeline is running.
    pub enable_monitoring: bool,
    /// How long the worker waits on the input queue before re-checking the
    /// stop flag.
    pub queue_poll_timeout: Duration,
    /// Per-node wall-clock budget in parallel levels; an overrun aborts that
    /// node's task and logs a failure.
    pub node_timeout: Duration,
    /// How long `stop()` waits for the worker to exit before aborting it.
    pub stop_join_timeout: Duration,
    /// Cadence of the metrics reporter.
    pub metrics_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            adaptive_parallel: false,
            shared_context: true,
            enable_monitoring: false,
            queue_poll_timeout: Duration::from_millis(100),
            node_timeout: Duration::from_secs(30),
            stop_join_timeout: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(1),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_adaptive_parallel(mut self, enabled: bool) -> Self {
        self.adaptive_parallel = enabled;
        self
    }

    #[must_use]
    pub fn with_shared_context(mut self, enabled: bool) -> Self {
        self.shared_context = enabled;
        self
    }

    #[must_use]
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.enable_monitoring = enabled;
        self
    }

    #[must_use]
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Defaults overlaid with `VISIONFLOW_*` environment variables, read
    /// after loading `.env` if one exists.
    ///
    /// Recognized: `VISIONFLOW_MODE` (sequential|parallel|pipeline),
    /// `VISIONFLOW_ADAPTIVE`, `VISIONFLOW_SHARED_CONTEXT`,
    /// `VISIONFLOW_MONITORING` (booleans), `VISIONFLOW_NODE_TIMEOUT_MS`,
    /// `VISIONFLOW_QUEUE_POLL_MS`, `VISIONFLOW_METRICS_INTERVAL_MS`
    /// (integers). Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(mode) = env_var("VISIONFLOW_MODE") {
            config.mode = ExecutionMode::decode(&mode);
        }
        if let Some(v) = env_bool("VISIONFLOW_ADAPTIVE") {
            config.adaptive_parallel = v;
        }
        if let Some(v) = env_bool("VISIONFLOW_SHARED_CONTEXT") {
            config.shared_context = v;
        }
        if let Some(v) = env_bool("VISIONFLOW_MONITORING") {
            config.enable_monitoring = v;
        }
        if let Some(ms) = env_millis("VISIONFLOW_NODE_TIMEOUT_MS") {
            config.node_timeout = ms;
        }
        if let Some(ms) = env_millis("VISIONFLOW_QUEUE_POLL_MS") {
            config.queue_poll_timeout = ms;
        }
        if let Some(ms) = env_millis("VISIONFLOW_METRICS_INTERVAL_MS") {
            config.metrics_interval = ms;
        }
        config
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = env_var(name)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(var = name, value = %raw, "unparseable boolean ignored");
            None
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    let raw = env_var(name)?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "unparseable duration ignored");
            None
        }
    }
}
