mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use visionflow::config::ExecutorConfig;
use visionflow::executor::PipelineExecutor;
use visionflow::module::Module;
use visionflow::types::new_data_map;

#[tokio::test]
async fn run_once_populates_node_and_pipeline_stats() {
    let mut executor = PipelineExecutor::new();
    executor
        .add_module(Module::new(Box::new(CounterProcessor::new())), Some("c".into()))
        .await
        .unwrap();
    let (recorder, _) = RecorderProcessor::new();
    executor
        .add_module(Module::new(Box::new(recorder)), Some("r".into()))
        .await
        .unwrap();
    executor.connect("c", "val", "r", "val").await.unwrap();

    assert!(executor.run_once(new_data_map()).await.is_some());

    let snap = executor.metrics();
    assert_eq!(snap.pipeline.exec_count, 1);
    assert_eq!(snap.nodes["c"].exec_count, 1);
    assert_eq!(snap.nodes["r"].exec_count, 1);
    assert!(snap.pipeline.last_time >= snap.nodes["c"].last_time);
}

#[tokio::test]
async fn stats_accumulate_across_cycles() {
    let mut executor = PipelineExecutor::new();
    executor
        .add_module(
            Module::new(Box::new(SlowProcessor {
                delay: Duration::from_millis(10),
            })),
            Some("slow".into()),
        )
        .await
        .unwrap();
    assert!(executor.start(None).await);
    for _ in 0..3 {
        executor.submit(new_data_map());
    }
    for _ in 0..3 {
        executor
            .recv_output(Duration::from_secs(2))
            .await
            .expect("cycle output");
    }
    assert!(executor.stop().await);

    let snap = executor.metrics();
    assert_eq!(snap.pipeline.exec_count, 3);
    let slow = &snap.nodes["slow"];
    assert_eq!(slow.exec_count, 3);
    assert!(slow.avg_time >= 0.01);
    assert!(slow.max_time >= slow.avg_time);
    assert!((slow.total_time - slow.avg_time * 3.0).abs() < 1e-9);

    executor.reset_metrics();
    let snap = executor.metrics();
    assert!(snap.nodes.is_empty());
    assert_eq!(snap.pipeline.exec_count, 0);
}

#[tokio::test]
async fn reporter_emits_snapshots_while_monitoring() {
    let config = ExecutorConfig {
        enable_monitoring: true,
        metrics_interval: Duration::from_millis(50),
        ..ExecutorConfig::default()
    };
    let mut executor = PipelineExecutor::with_config(config);
    executor
        .add_module(Module::new(Box::new(CounterProcessor::new())), Some("c".into()))
        .await
        .unwrap();

    let reports = Arc::new(AtomicU64::new(0));
    {
        let reports = reports.clone();
        executor.on_metrics(move |_| {
            reports.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(executor.start(Some(new_data_map())).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(executor.stop().await);

    assert!(reports.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn snapshot_serializes_for_host_consumers() {
    let mut executor = PipelineExecutor::new();
    executor
        .add_module(Module::new(Box::new(CounterProcessor::new())), Some("c".into()))
        .await
        .unwrap();
    assert!(executor.run_once(new_data_map()).await.is_some());

    let value = serde_json::to_value(executor.metrics()).unwrap();
    assert_eq!(value["nodes"]["c"]["exec_count"], json!(1));
    assert!(value["taken_at"].is_string());
    assert!(value["pipeline"]["avg_time"].is_number());
}
