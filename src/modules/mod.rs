//! Built-in leaf processors exercising the module contract: text source,
//! logging pass-through, async delay, boolean gate, and variable-arity
//! logic.

mod delay;
mod gate;
mod logic;
mod print;
mod text;

pub use delay::DelayProcessor;
pub use gate::BoolGateProcessor;
pub use logic::{LogicOp, LogicProcessor};
pub use print::PrintProcessor;
pub use text::TextInputProcessor;

use std::sync::Arc;

use serde_json::Value;

use crate::module::{Module, ModuleRegistry};

/// Register every built-in under its type tag.
pub fn register_builtins(registry: &mut ModuleRegistry) {
    registry.register(
        "text_input",
        Arc::new(|| Module::new(Box::new(TextInputProcessor::default()))),
    );
    registry.register(
        "print",
        Arc::new(|| Module::new(Box::new(PrintProcessor))),
    );
    registry.register(
        "delay",
        Arc::new(|| Module::new(Box::new(DelayProcessor::default()))),
    );
    registry.register(
        "bool_gate",
        Arc::new(|| Module::new(Box::new(BoolGateProcessor::default()))),
    );
    registry.register(
        "logic",
        Arc::new(|| Module::new(Box::new(LogicProcessor::default()))),
    );
}

/// Liberal truthiness used by the gate and logic processors.
///
/// Strings accept the usual spellings plus the inspection vocabulary
/// (`ok`/`pass`/`success` and `nok`/`ng`/`fail`); unrecognized strings are
/// parsed as numbers, then fall back to non-emptiness. Numbers are true when
/// non-zero. Arrays and objects are true when non-empty; null is false.
pub(crate) fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let v = s.trim().to_ascii_lowercase();
            const TRUE_SET: [&str; 9] =
                ["true", "1", "yes", "y", "ok", "pass", "passed", "success", "on"];
            const FALSE_SET: [&str; 10] =
                ["false", "0", "no", "n", "nok", "ng", "fail", "failed", "error", "off"];
            if TRUE_SET.contains(&v.as_str()) {
                return true;
            }
            if FALSE_SET.contains(&v.as_str()) {
                return false;
            }
            match v.parse::<f64>() {
                Ok(f) => f != 0.0,
                Err(_) => !v.is_empty(),
            }
        }
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
