//! Named, typed input/output slots declared by a processor.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Declaration of one named port: a loose type tag, a human description, and
/// whether upstream data is required for the module to do useful work.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub port_type: String,
    pub desc: String,
    #[serde(default)]
    pub required: bool,
}

impl PortSpec {
    pub fn new(port_type: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            port_type: port_type.into(),
            desc: desc.into(),
            required: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// The full port surface of a module: two name-keyed maps, one for inputs and
/// one for outputs.
///
/// Built with a fluent API inside [`Processor::define_ports`]; registering the
/// same name twice silently keeps the last declaration, so repeated calls to
/// `define_ports` are idempotent by construction.
///
/// [`Processor::define_ports`]: crate::module::Processor::define_ports
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortLayout {
    pub inputs: FxHashMap<String, PortSpec>,
    pub outputs: FxHashMap<String, PortSpec>,
}

impl PortLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A generic one-in/one-out layout, the default for processors that do
    /// not declare anything more specific.
    #[must_use]
    pub fn generic() -> Self {
        Self::new()
            .with_input("in", PortSpec::new("generic", "generic input"))
            .with_output("out", PortSpec::new("generic", "generic output"))
    }

    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, spec: PortSpec) -> Self {
        self.inputs.insert(name.into(), spec);
        self
    }

    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, spec: PortSpec) -> Self {
        self.outputs.insert(name.into(), spec);
        self
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Input port names whose spec marks them required.
    pub fn required_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }
}
