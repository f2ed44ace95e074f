use async_trait::async_trait;
use serde_json::json;

use crate::module::{ModuleError, PortLayout, PortSpec, Processor, StepOutput};
use crate::types::{DataMap, new_data_map};

/// Source module emitting a configured string on its `text` port each cycle.
pub struct TextInputProcessor {
    text: String,
}

impl Default for TextInputProcessor {
    fn default() -> Self {
        Self {
            text: "Hello".to_string(),
        }
    }
}

impl TextInputProcessor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Processor for TextInputProcessor {
    fn type_tag(&self) -> &str {
        "text_input"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new().with_output("text", PortSpec::new("string", "text content"))
    }

    fn on_configure(&mut self, config: &DataMap) {
        if let Some(text) = config.get("text").and_then(|v| v.as_str()) {
            self.text = text.to_string();
        }
    }

    async fn process(&mut self, _inputs: DataMap) -> Result<StepOutput, ModuleError> {
        let mut outputs = new_data_map();
        outputs.insert("text".to_string(), json!(self.text));
        Ok(StepOutput::new(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;

    #[tokio::test]
    async fn emits_configured_text() {
        let mut module = Module::new(Box::new(TextInputProcessor::default()));
        let mut config = new_data_map();
        config.insert("text".into(), json!("frame ready"));
        assert!(module.configure(config));
        let step = module.run_cycle().await.unwrap();
        assert_eq!(step.outputs["text"], json!("frame ready"));
    }
}
