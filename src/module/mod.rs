//! Module contract: pluggable processors, the owning [`Module`] wrapper, and
//! the lifecycle state machine.
//!
//! A [`Processor`] is the pluggable black box (camera capture, model
//! inference, post-processing, I/O) with declared ports, a capability
//! descriptor, and a typed configuration validator. [`Module`] wraps exactly
//! one processor and adds everything the executor needs: identity, lifecycle
//! status, the config/input/output caches, and the accumulated error list.
//!
//! Lifecycle and configuration failures never cross the module boundary as
//! errors: they are captured into the module's `errors` list, reflected in
//! its status, and surfaced as a `bool` return. Only `process` failures
//! propagate, because the executor owns that failure mode.

mod capabilities;
mod ports;
mod registry;

pub use capabilities::Capabilities;
pub use ports::{PortLayout, PortSpec};
pub use registry::{ModuleFactory, ModulePlugin, ModuleRegistry, PluginError};

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{DataMap, ModuleStatus, new_data_map};

// ============================================================================
// Processing results
// ============================================================================

/// Per-cycle control decision carried alongside a processor's outputs.
///
/// `AbortCycle` is the cooperative gate primitive: the executor stops
/// dispatching the remaining nodes of the current cycle, leaving already
/// produced outputs routed and valid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControlSignal {
    #[default]
    Continue,
    AbortCycle,
}

/// Result of one processing step: an output mapping plus a control signal.
#[derive(Clone, Debug, Default)]
pub struct StepOutput {
    pub outputs: DataMap,
    pub control: ControlSignal,
}

impl StepOutput {
    #[must_use]
    pub fn new(outputs: DataMap) -> Self {
        Self {
            outputs,
            control: ControlSignal::Continue,
        }
    }

    /// Wrap a single scalar as `{"out": value}`, the normalization applied to
    /// processors that conceptually return one unnamed value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        let mut outputs = new_data_map();
        outputs.insert("out".to_string(), value.into());
        Self::new(outputs)
    }

    /// Attach an abort request to the outputs produced so far.
    #[must_use]
    pub fn aborting(mut self) -> Self {
        self.control = ControlSignal::AbortCycle;
        self
    }

    pub fn is_abort(&self) -> bool {
        self.control == ControlSignal::AbortCycle
    }
}

// ============================================================================
// Error types
// ============================================================================

/// A single field-level configuration complaint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Validation failure produced by [`Processor::validate_config`].
///
/// Carries one issue per offending field so hosts can annotate property
/// panels precisely.
#[derive(Debug, Error, Diagnostic)]
#[error("configuration rejected: {}", self.summary())]
#[diagnostic(
    code(visionflow::module::config),
    help("Fix the listed fields and call configure again; prior config is untouched.")
)]
pub struct ConfigError {
    pub issues: Vec<FieldIssue>,
}

impl ConfigError {
    #[must_use]
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Errors raised by processor hooks and per-cycle processing.
#[derive(Debug, Error, Diagnostic)]
pub enum ModuleError {
    /// A declared required input was absent from the cycle's input mapping.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(visionflow::module::missing_input),
        help("Check that an upstream node is connected and produced the port.")
    )]
    MissingInput { what: String },

    /// Processing failed in a module-specific way.
    #[error("module processing failed: {0}")]
    #[diagnostic(code(visionflow::module::failed))]
    Failed(String),

    /// A lifecycle hook (start/stop/pause/resume) failed.
    #[error("lifecycle hook {phase} failed: {message}")]
    #[diagnostic(code(visionflow::module::lifecycle))]
    Lifecycle { phase: &'static str, message: String },

    #[error(transparent)]
    #[diagnostic(code(visionflow::module::serde_json))]
    Serde(#[from] serde_json::Error),
}

// ============================================================================
// Processor trait
// ============================================================================

/// The pluggable unit of computation.
///
/// Implementations declare their port surface and capabilities, validate
/// their own configuration, and perform one step of work per cycle. They are
/// intentionally ignorant of the graph: inputs arrive as a [`DataMap`] and
/// outputs leave as a [`StepOutput`]; routing is the executor's concern.
///
/// `process` must not mutate state beyond the processor's own fields.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable type tag used by registries and persisted graph shapes.
    fn type_tag(&self) -> &str;

    /// Declare the port surface. Must be idempotent: the layout is rebuilt
    /// after every successful configure, which is how variable-arity
    /// processors grow or shrink their ports.
    fn define_ports(&self) -> PortLayout {
        PortLayout::generic()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Validate an incoming configuration mapping, returning the (possibly
    /// normalized) fields to merge. The default accepts everything verbatim.
    fn validate_config(&self, config: &DataMap) -> Result<DataMap, ConfigError> {
        Ok(config.clone())
    }

    /// Hot-reload hook invoked after validated fields were merged.
    fn on_configure(&mut self, _config: &DataMap) {}

    fn on_start(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_stop(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_pause(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_resume(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_reset(&mut self) {}

    /// Perform one step of work for the current cycle.
    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError>;
}

// ============================================================================
// Module wrapper
// ============================================================================

/// Serializable snapshot of a module's externally visible state.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleSnapshot {
    pub id: String,
    pub name: String,
    pub type_tag: String,
    pub status: ModuleStatus,
    pub config: DataMap,
    pub errors: Vec<String>,
    pub input_ports: PortLayoutHalf,
    pub output_ports: PortLayoutHalf,
    pub current_inputs: Vec<String>,
    pub current_outputs: Vec<String>,
    pub capabilities: Capabilities,
}

/// One half of a port layout as it appears in a snapshot.
pub type PortLayoutHalf = rustc_hash::FxHashMap<String, PortSpec>;

/// One module instance: a processor plus identity, lifecycle status, and the
/// per-cycle caches the executor routes data through.
pub struct Module {
    id: String,
    name: String,
    type_tag: String,
    status: ModuleStatus,
    config: DataMap,
    inputs: DataMap,
    outputs: DataMap,
    errors: Vec<String>,
    ports: PortLayout,
    capabilities: Capabilities,
    processor: Box<dyn Processor>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_tag", &self.type_tag)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Wrap a processor with a generated id and the processor's type tag as
    /// its name.
    #[must_use]
    pub fn new(processor: Box<dyn Processor>) -> Self {
        let type_tag = processor.type_tag().to_string();
        let ports = processor.define_ports();
        let capabilities = processor.capabilities();
        Self {
            id: Uuid::new_v4().to_string(),
            name: type_tag.clone(),
            type_tag,
            status: ModuleStatus::Idle,
            config: new_data_map(),
            inputs: new_data_map(),
            outputs: new_data_map(),
            errors: Vec::new(),
            ports,
            capabilities,
            processor,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    pub fn config(&self) -> &DataMap {
        &self.config
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn ports(&self) -> &PortLayout {
        &self.ports
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn inputs(&self) -> &DataMap {
        &self.inputs
    }

    pub fn outputs(&self) -> &DataMap {
        &self.outputs
    }

    /// Validate and merge a configuration mapping.
    ///
    /// On validation failure the diagnostic is appended to `errors`, the
    /// existing config is left untouched, and `false` is returned. On success
    /// the validated fields are merged, the on-configure hook fires, and the
    /// port layout is rebuilt from the processor (variable-arity modules may
    /// have changed their surface).
    pub fn configure(&mut self, config: DataMap) -> bool {
        match self.processor.validate_config(&config) {
            Ok(validated) => {
                self.config.extend(validated);
                self.processor.on_configure(&self.config);
                self.ports = self.processor.define_ports();
                tracing::debug!(module = %self.name, "configuration applied");
                true
            }
            Err(err) => {
                tracing::warn!(module = %self.name, error = %err, "configuration rejected");
                self.errors.push(err.to_string());
                false
            }
        }
    }

    /// Start the module. Valid from `Idle` or `Stopped` only; a disallowed
    /// state is a logged no-op returning `false`.
    pub fn start(&mut self) -> bool {
        if !matches!(self.status, ModuleStatus::Idle | ModuleStatus::Stopped) {
            tracing::warn!(module = %self.name, status = %self.status, "start ignored");
            return false;
        }
        self.run_hook("start", |p| p.on_start(), ModuleStatus::Running)
    }

    /// Stop the module. Valid from `Running` or `Paused`.
    pub fn stop(&mut self) -> bool {
        if !matches!(self.status, ModuleStatus::Running | ModuleStatus::Paused) {
            tracing::warn!(module = %self.name, status = %self.status, "stop ignored");
            return false;
        }
        self.run_hook("stop", |p| p.on_stop(), ModuleStatus::Stopped)
    }

    /// Pause the module. Valid from `Running` only.
    pub fn pause(&mut self) -> bool {
        if self.status != ModuleStatus::Running {
            tracing::warn!(module = %self.name, status = %self.status, "pause ignored");
            return false;
        }
        self.run_hook("pause", |p| p.on_pause(), ModuleStatus::Paused)
    }

    /// Resume the module. Valid from `Paused` only.
    pub fn resume(&mut self) -> bool {
        if self.status != ModuleStatus::Paused {
            tracing::warn!(module = %self.name, status = %self.status, "resume ignored");
            return false;
        }
        self.run_hook("resume", |p| p.on_resume(), ModuleStatus::Running)
    }

    /// Stop if needed, clear accumulated errors and caches, return to `Idle`.
    pub fn reset(&mut self) -> bool {
        if matches!(self.status, ModuleStatus::Running | ModuleStatus::Paused) {
            let _ = self.stop();
        }
        self.processor.on_reset();
        self.inputs.clear();
        self.outputs.clear();
        self.errors.clear();
        self.status = ModuleStatus::Idle;
        tracing::debug!(module = %self.name, "module reset");
        true
    }

    fn run_hook(
        &mut self,
        phase: &'static str,
        hook: fn(&mut dyn Processor) -> Result<(), ModuleError>,
        on_success: ModuleStatus,
    ) -> bool {
        match hook(self.processor.as_mut()) {
            Ok(()) => {
                self.status = on_success;
                tracing::debug!(module = %self.name, phase, status = %self.status, "lifecycle transition");
                true
            }
            Err(err) => {
                tracing::error!(module = %self.name, phase, error = %err, "lifecycle hook failed");
                self.errors.push(err.to_string());
                self.status = ModuleStatus::Error;
                false
            }
        }
    }

    /// Copy declared-input keys into the input cache; undeclared keys are
    /// silently dropped (defensive against stale connections).
    pub fn receive_inputs(&mut self, data: &DataMap) {
        for (key, value) in data {
            if self.ports.has_input(key) {
                self.inputs.insert(key.clone(), value.clone());
            }
        }
    }

    /// Write declared-output keys into the output cache; undeclared keys are
    /// dropped here but still present in the raw step result for routing
    /// decisions the executor makes.
    fn produce_outputs(&mut self, data: &DataMap) {
        for (key, value) in data {
            if self.ports.has_output(key) {
                self.outputs.insert(key.clone(), value.clone());
            }
        }
    }

    /// Clear the per-cycle input/output caches.
    pub fn clear_io(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
    }

    /// Execute one processing step against the current input cache.
    ///
    /// Processing errors propagate to the caller; the executor decides
    /// whether they are fatal for the cycle (sequential/adaptive) or isolated
    /// to this node (parallel).
    pub async fn run_cycle(&mut self) -> Result<StepOutput, ModuleError> {
        let result = self.processor.process(self.inputs.clone()).await?;
        self.produce_outputs(&result.outputs);
        Ok(result)
    }

    /// Structured read-only snapshot for hosts and introspection.
    #[must_use]
    pub fn snapshot(&self) -> ModuleSnapshot {
        ModuleSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            type_tag: self.type_tag.clone(),
            status: self.status,
            config: self.config.clone(),
            errors: self.errors.clone(),
            input_ports: self.ports.inputs.clone(),
            output_ports: self.ports.outputs.clone(),
            current_inputs: self.inputs.keys().cloned().collect(),
            current_outputs: self.outputs.keys().cloned().collect(),
            capabilities: self.capabilities.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Processor for Echo {
        fn type_tag(&self) -> &str {
            "echo"
        }

        async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
            Ok(StepOutput::new(inputs))
        }
    }

    struct Picky;

    #[async_trait]
    impl Processor for Picky {
        fn type_tag(&self) -> &str {
            "picky"
        }

        fn validate_config(&self, config: &DataMap) -> Result<DataMap, ConfigError> {
            if config.contains_key("bad") {
                return Err(ConfigError::field("bad", "not allowed"));
            }
            Ok(config.clone())
        }

        async fn process(&mut self, _: DataMap) -> Result<StepOutput, ModuleError> {
            Ok(StepOutput::default())
        }
    }

    struct FailsToStart;

    #[async_trait]
    impl Processor for FailsToStart {
        fn type_tag(&self) -> &str {
            "fails_to_start"
        }

        fn on_start(&mut self) -> Result<(), ModuleError> {
            Err(ModuleError::Lifecycle {
                phase: "start",
                message: "device unavailable".into(),
            })
        }

        async fn process(&mut self, _: DataMap) -> Result<StepOutput, ModuleError> {
            Ok(StepOutput::default())
        }
    }

    #[test]
    fn lifecycle_guards() {
        let mut m = Module::new(Box::new(Echo));
        assert_eq!(m.status(), ModuleStatus::Idle);
        assert!(!m.pause(), "pause from idle must be a no-op");
        assert!(!m.stop(), "stop from idle must be a no-op");
        assert!(m.start());
        assert!(m.pause());
        assert!(!m.start(), "start from paused must fail");
        assert!(m.resume());
        assert!(m.stop());
        assert!(m.start(), "restart from stopped is allowed");
    }

    #[test]
    fn failing_hook_forces_error_state() {
        let mut m = Module::new(Box::new(FailsToStart));
        assert!(!m.start());
        assert_eq!(m.status(), ModuleStatus::Error);
        assert_eq!(m.errors().len(), 1);
        assert!(m.errors()[0].contains("device unavailable"));
    }

    #[test]
    fn configure_failure_leaves_config_untouched() {
        let mut m = Module::new(Box::new(Picky));
        let mut good = new_data_map();
        good.insert("threshold".into(), json!(0.5));
        assert!(m.configure(good));

        let mut bad = new_data_map();
        bad.insert("bad".into(), json!(true));
        assert!(!m.configure(bad));
        assert_eq!(m.config().get("threshold"), Some(&json!(0.5)));
        assert!(!m.config().contains_key("bad"));
        assert_eq!(m.errors().len(), 1);
    }

    #[test]
    fn receive_inputs_drops_undeclared_keys() {
        let mut m = Module::new(Box::new(Echo));
        let mut data = new_data_map();
        data.insert("in".into(), json!(1));
        data.insert("stale".into(), json!(2));
        m.receive_inputs(&data);
        assert!(m.inputs().contains_key("in"));
        assert!(!m.inputs().contains_key("stale"));
    }

    #[tokio::test]
    async fn run_cycle_filters_outputs_but_returns_raw() {
        struct Extra;

        #[async_trait]
        impl Processor for Extra {
            fn type_tag(&self) -> &str {
                "extra"
            }

            async fn process(&mut self, _: DataMap) -> Result<StepOutput, ModuleError> {
                let mut out = new_data_map();
                out.insert("out".into(), json!("declared"));
                out.insert("side_channel".into(), json!("undeclared"));
                Ok(StepOutput::new(out))
            }
        }

        let mut m = Module::new(Box::new(Extra));
        let result = m.run_cycle().await.unwrap();
        assert!(result.outputs.contains_key("side_channel"));
        assert!(m.outputs().contains_key("out"));
        assert!(!m.outputs().contains_key("side_channel"));
    }

    #[test]
    fn reset_clears_errors() {
        let mut m = Module::new(Box::new(FailsToStart));
        let _ = m.start();
        assert!(!m.errors().is_empty());
        assert!(m.reset());
        assert!(m.errors().is_empty());
        assert_eq!(m.status(), ModuleStatus::Idle);
    }
}
