use async_trait::async_trait;
use serde_json::json;

use super::coerce_bool;
use crate::module::{
    ConfigError, FieldIssue, ModuleError, PortLayout, PortSpec, Processor, StepOutput,
};
use crate::types::{DataMap, new_data_map};

const MAX_INPUTS: u64 = 26;

/// Boolean combinator over the gate's truthiness rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogicOp {
    #[default]
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Not,
}

impl LogicOp {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "xor" => Some(Self::Xor),
            "nand" => Some(Self::Nand),
            "nor" => Some(Self::Nor),
            "not" => Some(Self::Not),
            _ => None,
        }
    }

    fn apply(self, values: &[bool]) -> bool {
        match self {
            Self::And => values.iter().all(|v| *v),
            Self::Or => values.iter().any(|v| *v),
            Self::Xor => values.iter().filter(|v| **v).count() % 2 == 1,
            Self::Nand => !values.iter().all(|v| *v),
            Self::Nor => !values.iter().any(|v| *v),
            // NOT only considers the first input.
            Self::Not => !values.first().copied().unwrap_or(false),
        }
    }
}

/// Variable-arity logic node with input ports `a`, `b`, `c`, ... grown or
/// shrunk by the `inputs` config field. The port rebuild after configure is
/// what exercises variable-arity modules in the engine.
pub struct LogicProcessor {
    op: LogicOp,
    invert: bool,
    inputs_count: usize,
}

impl Default for LogicProcessor {
    fn default() -> Self {
        Self {
            op: LogicOp::And,
            invert: false,
            inputs_count: 2,
        }
    }
}

fn port_name(index: usize) -> String {
    char::from(b'a' + index as u8).to_string()
}

#[async_trait]
impl Processor for LogicProcessor {
    fn type_tag(&self) -> &str {
        "logic"
    }

    fn define_ports(&self) -> PortLayout {
        let mut layout =
            PortLayout::new().with_output("result", PortSpec::new("bool", "logic result"));
        for i in 0..self.inputs_count {
            let spec = PortSpec::new("bool", format!("input {}", port_name(i)));
            let spec = if i == 0 { spec.required() } else { spec };
            layout = layout.with_input(port_name(i), spec);
        }
        layout
    }

    fn validate_config(&self, config: &DataMap) -> Result<DataMap, ConfigError> {
        let mut issues = Vec::new();
        if let Some(op) = config.get("op") {
            match op.as_str() {
                Some(s) if LogicOp::parse(s).is_some() => {}
                _ => issues.push(FieldIssue {
                    field: "op".to_string(),
                    message: "must be one of and/or/xor/nand/nor/not".to_string(),
                }),
            }
        }
        if let Some(count) = config.get("inputs") {
            match count.as_u64() {
                Some(n) if (1..=MAX_INPUTS).contains(&n) => {}
                _ => issues.push(FieldIssue {
                    field: "inputs".to_string(),
                    message: format!("must be in 1..={MAX_INPUTS}"),
                }),
            }
        }
        if issues.is_empty() {
            Ok(config.clone())
        } else {
            Err(ConfigError { issues })
        }
    }

    fn on_configure(&mut self, config: &DataMap) {
        if let Some(op) = config.get("op").and_then(|v| v.as_str()) {
            if let Some(op) = LogicOp::parse(op) {
                self.op = op;
            }
        }
        if let Some(invert) = config.get("invert") {
            self.invert = coerce_bool(invert);
        }
        if let Some(n) = config.get("inputs").and_then(|v| v.as_u64()) {
            self.inputs_count = n as usize;
        }
    }

    async fn process(&mut self, inputs: DataMap) -> Result<StepOutput, ModuleError> {
        let values: Vec<bool> = (0..self.inputs_count)
            .map(|i| inputs.get(&port_name(i)).map(coerce_bool).unwrap_or(false))
            .collect();
        let mut result = self.op.apply(&values);
        if self.invert {
            result = !result;
        }
        let mut outputs = new_data_map();
        outputs.insert("result".to_string(), json!(result));
        Ok(StepOutput::new(outputs))
    }
}
