use std::time::Duration;

use async_trait::async_trait;

use crate::module::{
    Capabilities, ConfigError, ModuleError, PortLayout, PortSpec, Processor, StepOutput,
};
use crate::types::{DataMap, new_data_map};

const MAX_DELAY_MS: u64 = 60_000;

/// Holds its input for a configured interval before passing it through.
/// Declares `may_block` so the adaptive strategy lifts it off the ordered
/// path.
pub struct DelayProcessor {
    delay: Duration,
}

impl Default for DelayProcessor {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
        }
    }
}

impl DelayProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Processor for DelayProcessor {
    fn type_tag(&self) -> &str {
        "delay"
    }

    fn define_ports(&self) -> PortLayout {
        PortLayout::new()
            .with_input("text", PortSpec::new("string", "value to delay").required())
            .with_output("delayed_text", PortSpec::new("string", "delayed value"))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::blocking()
            .with_resource_tag("delay")
            .with_throughput_hint(5.0)
    }

    fn validate_config(&self, config: &DataMap) -> Result<DataMap, ConfigError> {
        if let Some(raw) = config.get("delay_ms") {
            let Some(ms) = raw.as_u64() else {
                return Err(ConfigError::field(
                    "delay_ms",
                    "must be a non-negative integer",
                ));
            };
            if ms > MAX_DELAY_MS {
                return Err(ConfigError::field(
                    "delay_ms",
                    format!("must be <= {MAX_DELAY_MS}"),
                ));
            }
        }
        Ok(config.clone())
    }

    fn on_configure(&mut self, config: &DataMap) {
        if let Some(ms) = config.get("delay_ms").and_then(|v| v.as_u64()) {
            self.delay = Duration::from_millis(ms);
        }
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        let mut outputs = new_data_map();
        match inputs.get("text") {
            Some(value) => {
                tokio::time::sleep(self.delay).await;
                outputs.insert("delayed_text".to_string(), value.clone());
            }
            None => {
                outputs.insert("delayed_text".to_string(), serde_json::Value::Null);
            }
        }
        Ok(StepOutput::new(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use serde_json::json;

    #[test]
    fn rejects_out_of_range_delay() {
        let mut module = Module::new(Box::new(DelayProcessor::default()));
        let mut config = new_data_map();
        config.insert("delay_ms".into(), json!(-5));
        assert!(!module.configure(config));
        let mut config = new_data_map();
        config.insert("delay_ms".into(), json!(120_000));
        assert!(!module.configure(config));
    }

    #[tokio::test]
    async fn passes_input_through() {
        let mut module = Module::new(Box::new(DelayProcessor::new(Duration::ZERO)));
        let mut data = new_data_map();
        data.insert("text".into(), json!("hi"));
        module.receive_inputs(&data);
        let step = module.run_cycle().await.unwrap();
        assert_eq!(step.outputs["delayed_text"], json!("hi"));
    }
}
