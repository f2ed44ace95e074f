use async_trait::async_trait;

use crate::module::{ModuleError, PortLayout, PortSpec, Processor, StepOutput};
use crate::types::{DataMap, new_data_map};

/// Logs its `text` input through tracing and passes it along unchanged.
pub struct PrintProcessor;

#[async_trait]
impl Processor for PrintProcessor {
    fn type_tag(&self) -> &str {
        "print"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new()
            .with_input("text", PortSpec::new("string", "value to print").required())
            .with_output("text_out", PortSpec::new("string", "pass-through"))
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        let value = inputs
            .get("text")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        tracing::info!(target: "visionflow::print", %value, "print");
        let mut outputs = new_data_map();
        outputs.insert("text_out".to_string(), value);
        Ok(StepOutput::new(outputs))
    }
}
