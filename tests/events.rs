mod common;

use common::*;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use visionflow::events::{
    CallbackSink, ChannelSink, EventBus, EventSink, MemorySink, PipelineEvent, StepPhase,
};
use visionflow::executor::PipelineExecutor;
use visionflow::module::Module;
use visionflow::types::new_data_map;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn fan_out_reaches_every_sink() {
    let first = MemorySink::new();
    let second = MemorySink::new();
    let bus = EventBus::with_sink(first.clone());
    bus.add_sink(second.clone());
    bus.listen();

    let emitter = bus.emitter();
    emitter.emit(PipelineEvent::diagnostic("test", "one")).unwrap();
    emitter.emit(PipelineEvent::progress(1, "n", 1, 3)).unwrap();
    emitter
        .emit(PipelineEvent::module_step(1, "n", StepPhase::End))
        .unwrap();

    settle().await;
    bus.stop_listener().await;

    let kinds: Vec<&str> = first.snapshot().iter().map(PipelineEvent::kind).collect();
    assert_eq!(kinds, vec!["diagnostic", "progress", "module_step"]);
    assert_eq!(second.snapshot().len(), 3);
}

struct BrokenSink;

impl EventSink for BrokenSink {
    fn handle(&mut self, _event: &PipelineEvent) -> io::Result<()> {
        Err(io::Error::other("sink down"))
    }
}

#[tokio::test]
async fn failing_sink_does_not_disturb_the_others() {
    let memory = MemorySink::new();
    let bus = EventBus::with_sink(BrokenSink);
    bus.add_sink(memory.clone());
    bus.listen();

    bus.emitter()
        .emit(PipelineEvent::cycle_result(1, false, 0.01))
        .unwrap();
    settle().await;
    bus.stop_listener().await;

    assert_eq!(memory.snapshot().len(), 1);
}

#[tokio::test]
async fn filtered_callback_sees_only_its_kind() {
    let hits = Arc::new(AtomicU64::new(0));
    let seen = hits.clone();
    let bus = EventBus::with_sink(CallbackSink::filtered("exec_error", move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    bus.listen();

    let emitter = bus.emitter();
    emitter.emit(PipelineEvent::diagnostic("test", "noise")).unwrap();
    emitter
        .emit(PipelineEvent::exec_error(Some("n".into()), "boom"))
        .unwrap();
    emitter.emit(PipelineEvent::progress(1, "n", 1, 1)).unwrap();

    settle().await;
    bus.stop_listener().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn channel_sink_feeds_async_consumers() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let bus = EventBus::with_sink(ChannelSink::new(tx));
    bus.listen();

    bus.emitter()
        .emit(PipelineEvent::diagnostic("status", "running"))
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind(), "diagnostic");
    bus.stop_listener().await;
}

#[tokio::test]
async fn listen_is_idempotent() {
    let memory = MemorySink::new();
    let bus = EventBus::with_sink(memory.clone());
    bus.listen();
    bus.listen();

    bus.emitter()
        .emit(PipelineEvent::diagnostic("test", "once"))
        .unwrap();
    settle().await;
    bus.stop_listener().await;

    // A second listener would have delivered the event twice.
    assert_eq!(memory.snapshot().len(), 1);
}

#[tokio::test]
async fn normalized_json_shape() {
    let event = PipelineEvent::progress(7, "node-a", 2, 5);
    let value = event.to_json_value();
    assert_eq!(value["type"], "progress");
    assert!(value["timestamp"].is_string());
    assert_eq!(value["payload"]["node_id"], "node-a");
    assert_eq!(value["payload"]["completed"], 2);
    assert_eq!(value["payload"]["total"], 5);
}

#[tokio::test]
async fn executor_callbacks_fire_during_a_cycle() {
    let mut executor = PipelineExecutor::new();
    executor
        .add_module(Module::new(Box::new(CounterProcessor::new())), Some("c".into()))
        .await
        .unwrap();

    let results = Arc::new(AtomicU64::new(0));
    let progress = Arc::new(AtomicU64::new(0));
    let steps = Arc::new(AtomicU64::new(0));
    {
        let results = results.clone();
        executor.on_result(move |event| {
            assert!(!event.aborted);
            results.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let progress = progress.clone();
        executor.on_progress(move |_| {
            progress.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let steps = steps.clone();
        executor.on_module_step(move |_| {
            steps.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(executor.run_once(new_data_map()).await.is_some());
    // Delivery is asynchronous on the listener task.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while results.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(results.load(Ordering::SeqCst), 1);
    assert_eq!(progress.load(Ordering::SeqCst), 1);
    assert_eq!(steps.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn error_callback_reports_failed_nodes() {
    let mut executor = PipelineExecutor::new();
    executor
        .add_module(Module::new(Box::new(FailingProcessor)), Some("f".into()))
        .await
        .unwrap();

    let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let errors = errors.clone();
        executor.on_error(move |event| {
            errors.lock().push((event.node_id.clone(), event.message.clone()));
        });
    }

    assert!(executor.run_once(new_data_map()).await.is_none());
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while errors.lock().is_empty() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let captured = errors.lock().clone();
    // One event from the node itself, one executor-level from the failed run.
    assert!(captured.iter().any(|(node, _)| node.as_deref() == Some("f")));
    assert!(captured.iter().any(|(_, msg)| msg.contains("intentional failure")));
}
