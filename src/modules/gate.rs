use async_trait::async_trait;
use serde_json::json;

use super::coerce_bool;
use crate::module::{ModuleError, PortLayout, PortSpec, Processor, StepOutput};
use crate::types::{DataMap, new_data_map};

/// Conditional branch primitive.
///
/// Coerces its `flag` input to a boolean (optionally inverted) and, when the
/// gate blocks, attaches [`ControlSignal::AbortCycle`] so the executor stops
/// dispatching the remaining nodes of the cycle. Outputs the resolved flag
/// either way.
///
/// [`ControlSignal::AbortCycle`]: crate::module::ControlSignal::AbortCycle
#[derive(Default)]
pub struct BoolGateProcessor;

#[async_trait]
impl Processor for BoolGateProcessor {
    fn type_tag(&self) -> &str {
        "bool_gate"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new()
            .with_input("flag", PortSpec::new("bool", "boolean condition").required())
            .with_input("invert", PortSpec::new("bool", "invert the condition"))
            .with_output("passed", PortSpec::new("bool", "whether the gate passed"))
            .with_output("flag_out", PortSpec::new("bool", "resolved boolean"))
            .with_output("gate_trigger", PortSpec::new("meta", "true when the gate blocked"))
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        let mut flag = inputs.get("flag").map(coerce_bool).unwrap_or(false);
        if inputs.get("invert").map(coerce_bool).unwrap_or(false) {
            flag = !flag;
        }

        let mut outputs = new_data_map();
        outputs.insert("passed".to_string(), json!(flag));
        outputs.insert("flag_out".to_string(), json!(flag));
        outputs.insert("gate_trigger".to_string(), json!(!flag));

        let step = StepOutput::new(outputs);
        if flag {
            Ok(step)
        } else {
            tracing::debug!("gate blocked; requesting cycle abort");
            Ok(step.aborting())
        }
    }
}
