//! Shared test processors and builders.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use visionflow::module::{
    Capabilities, Module, ModuleError, PortLayout, PortSpec, Processor, StepOutput,
};
use visionflow::types::{DataMap, new_data_map};

/// Build a [`DataMap`] from literal pairs.
pub fn data(pairs: &[(&str, Value)]) -> DataMap {
    let mut map = new_data_map();
    for (key, value) in pairs {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

/// Emits `{"val": n}` with an incrementing counter each cycle.
pub struct CounterProcessor {
    count: u64,
}

impl CounterProcessor {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl Default for CounterProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for CounterProcessor {
    fn type_tag(&self) -> &str {
        "counter"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new().with_output("val", PortSpec::new("number", "cycle counter"))
    }

    async fn process(&mut self, _inputs: DataMap) -> Result<StepOutput, ModuleError> {
        self.count += 1;
        let mut outputs = new_data_map();
        outputs.insert("val".to_string(), json!(self.count));
        Ok(StepOutput::new(outputs))
    }
}

/// Copies its `val` input to a `last` output and remembers every value seen.
pub struct RecorderProcessor {
    pub seen: Arc<parking_lot::Mutex<Vec<Value>>>,
}

impl RecorderProcessor {
    pub fn new() -> (Self, Arc<parking_lot::Mutex<Vec<Value>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        (Self { seen: seen.clone() }, seen)
    }
}

#[async_trait]
impl Processor for RecorderProcessor {
    fn type_tag(&self) -> &str {
        "recorder"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new()
            .with_input("val", PortSpec::new("number", "value to record").required())
            .with_output("last", PortSpec::new("number", "last recorded value"))
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        let value = inputs.get("val").cloned().unwrap_or(Value::Null);
        self.seen.lock().push(value.clone());
        let mut outputs = new_data_map();
        outputs.insert("last".to_string(), value);
        Ok(StepOutput::new(outputs))
    }
}

/// Always fails processing.
pub struct FailingProcessor;

#[async_trait]
impl Processor for FailingProcessor {
    fn type_tag(&self) -> &str {
        "failing"
    }

    async fn process(&mut self, _inputs: DataMap) -> Result<StepOutput, ModuleError> {
        Err(ModuleError::Failed("intentional failure".to_string()))
    }
}

/// Refuses its start hook, for bring-up rollback coverage.
pub struct RefusesStartProcessor;

#[async_trait]
impl Processor for RefusesStartProcessor {
    fn type_tag(&self) -> &str {
        "refuses_start"
    }

    fn on_start(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::Lifecycle {
            phase: "start",
            message: "device busy".to_string(),
        })
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        Ok(StepOutput::new(inputs))
    }
}

/// Sleeps for a fixed interval, then echoes its inputs. Marked may-block.
pub struct SlowProcessor {
    pub delay: Duration,
}

#[async_trait]
impl Processor for SlowProcessor {
    fn type_tag(&self) -> &str {
        "slow"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::blocking()
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        tokio::time::sleep(self.delay).await;
        Ok(StepOutput::new(inputs))
    }
}

/// Records which nodes ran and in what order, across all instances sharing
/// the log. Passes `val` through.
pub struct OrderedProcessor {
    pub label: String,
    pub log: Arc<parking_lot::Mutex<Vec<String>>>,
}

#[async_trait]
impl Processor for OrderedProcessor {
    fn type_tag(&self) -> &str {
        "ordered"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new()
            .with_input("val", PortSpec::new("number", "incoming value"))
            .with_output("val", PortSpec::new("number", "outgoing value"))
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        self.log.lock().push(self.label.clone());
        let mut outputs = new_data_map();
        outputs.insert(
            "val".to_string(),
            inputs.get("val").cloned().unwrap_or(json!(0)),
        );
        Ok(StepOutput::new(outputs))
    }
}

/// Shared run log plus a factory for [`OrderedProcessor`] modules.
pub fn ordered_log() -> Arc<parking_lot::Mutex<Vec<String>>> {
    Arc::new(parking_lot::Mutex::new(Vec::new()))
}

pub fn ordered_module(label: &str, log: &Arc<parking_lot::Mutex<Vec<String>>>) -> Module {
    Module::new(Box::new(OrderedProcessor {
        label: label.to_string(),
        log: log.clone(),
    }))
    .with_name(label)
}

/// Counts invocations across clones, for concurrency assertions.
#[derive(Clone, Default)]
pub struct InvocationCounter(pub Arc<AtomicU64>);

impl InvocationCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
