//! Background worker loop driving cycles off the input queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as PlMutex;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::cycle::CycleDriver;
use crate::config::ExecutorConfig;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::PipelineGraph;
use crate::metrics::MetricsHub;
use crate::types::{DataMap, ExecutorStatus};

/// Everything the worker task owns. Cloned handles onto executor state.
pub(crate) struct WorkerContext {
    pub graph: Arc<Mutex<PipelineGraph>>,
    pub config: ExecutorConfig,
    pub metrics: MetricsHub,
    pub emitter: EventEmitter,
    pub status: Arc<PlMutex<ExecutorStatus>>,
    pub input_rx: flume::Receiver<DataMap>,
    pub output_tx: flume::Sender<DataMap>,
    pub pause: watch::Receiver<bool>,
    pub stop: watch::Receiver<bool>,
    pub cycle_counter: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

/// Park until the pause flag clears or a stop is requested. Returns `false`
/// when the control channels are gone and the loop should exit.
async fn wait_while_paused(
    pause: &mut watch::Receiver<bool>,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    while *pause.borrow() && !*stop.borrow() {
        tokio::select! {
            changed = pause.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
    true
}

/// Spawn the single logical cycle driver.
///
/// Loop shape: wait out the pause gate, check the stop flag, poll the input
/// queue with a short timeout (so stop stays responsive with no traffic),
/// and run exactly one cycle per dequeued packet. A fatal cycle failure
/// flips status to `Error` and exits the loop; the engine never
/// auto-restarts.
pub(crate) fn spawn(mut ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("worker loop started");
        loop {
            if *ctx.stop.borrow() {
                break;
            }
            if !wait_while_paused(&mut ctx.pause, &mut ctx.stop).await {
                break;
            }
            if *ctx.stop.borrow() {
                break;
            }

            let external =
                match tokio::time::timeout(ctx.config.queue_poll_timeout, ctx.input_rx.recv_async())
                    .await
                {
                    Ok(Ok(packet)) => packet,
                    Ok(Err(_)) => break,
                    Err(_) => continue,
                };

            // A pause can land while the poll above is in flight. Park here
            // with the packet in hand so nothing is lost across the gap, and
            // run it once the pipeline resumes.
            if !wait_while_paused(&mut ctx.pause, &mut ctx.stop).await {
                break;
            }
            if *ctx.stop.borrow() {
                break;
            }

            let cycle = ctx.cycle_counter.fetch_add(1, Ordering::Relaxed) + 1;
            let graph = ctx.graph.lock().await;
            let driver = CycleDriver {
                graph: &graph,
                config: &ctx.config,
                metrics: &ctx.metrics,
                emitter: &ctx.emitter,
                cycle,
            };
            match driver.run(external).await {
                Ok(outcome) => {
                    drop(graph);
                    if ctx.output_tx.send(outcome.merged).is_err() {
                        tracing::debug!("output queue closed; worker exiting");
                        break;
                    }
                }
                Err(err) => {
                    drop(graph);
                    ctx.error_count.fetch_add(1, Ordering::Relaxed);
                    *ctx.status.lock() = ExecutorStatus::Error;
                    tracing::error!(error = %err, cycle, "fatal cycle failure; worker exiting");
                    ctx.emitter
                        .emit_lossy(PipelineEvent::exec_error(None, err.to_string()));
                    ctx.emitter
                        .emit_lossy(PipelineEvent::status_change(ExecutorStatus::Error));
                    break;
                }
            }
        }
        tracing::debug!("worker loop stopped");
    })
}
