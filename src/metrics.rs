//! Execution timing aggregation and the periodic metrics reporter.
//!
//! Recording happens on the hot path of every cycle, so the hub is a cheap
//! `parking_lot` mutex around a hash map rather than anything channel-based.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{EventEmitter, PipelineEvent};

/// Running timing aggregate for one node (or for the pipeline as a whole).
/// All durations are seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub exec_count: u64,
    pub total_time: f64,
    pub max_time: f64,
    pub last_time: f64,
    pub avg_time: f64,
}

impl NodeStats {
    fn record(&mut self, duration: Duration) {
        let secs = duration.as_secs_f64();
        self.exec_count += 1;
        self.total_time += secs;
        self.last_time = secs;
        if secs > self.max_time {
            self.max_time = secs;
        }
        self.avg_time = self.total_time / self.exec_count as f64;
    }
}

/// Point-in-time copy of all aggregates, safe to serialize and ship.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub nodes: FxHashMap<String, NodeStats>,
    pub pipeline: NodeStats,
    pub taken_at: DateTime<Utc>,
}

#[derive(Default)]
struct MetricsInner {
    nodes: FxHashMap<String, NodeStats>,
    pipeline: NodeStats,
}

/// Shared timing collector. Cloning hands out another handle to the same
/// aggregates.
#[derive(Clone, Default)]
pub struct MetricsHub {
    inner: Arc<Mutex<MetricsInner>>,
}

impl MetricsHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one node execution.
    pub fn record_node(&self, node_id: &str, duration: Duration) {
        let mut inner = self.inner.lock();
        inner
            .nodes
            .entry(node_id.to_string())
            .or_default()
            .record(duration);
    }

    /// Record one full cycle.
    pub fn record_cycle(&self, duration: Duration) {
        self.inner.lock().pipeline.record(duration);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            nodes: inner.nodes.clone(),
            pipeline: inner.pipeline.clone(),
            taken_at: Utc::now(),
        }
    }

    /// Clear every aggregate in one atomic step.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.nodes.clear();
        inner.pipeline = NodeStats::default();
    }
}

impl std::fmt::Debug for MetricsHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MetricsHub")
            .field("nodes", &inner.nodes.len())
            .field("cycles", &inner.pipeline.exec_count)
            .finish()
    }
}

/// Spawn the interval reporter: every `interval` it emits a
/// [`PipelineEvent::Metrics`] snapshot until the stop flag flips.
pub fn spawn_reporter(
    hub: MetricsHub,
    emitter: EventEmitter,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if emitter.emit(PipelineEvent::metrics(hub.snapshot())).is_err() {
                        break;
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("metrics reporter stopped");
    })
}
