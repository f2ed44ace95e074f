//! Tracing setup and event rendering for text sinks.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::events::PipelineEvent;

/// Install the global tracing subscriber with env-filter control and span
/// traces on errors.
///
/// `RUST_LOG` wins when set; otherwise the given default directive applies.
/// Safe to call more than once (subsequent calls are no-ops).
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(ErrorLayer::default())
        .try_init();
}

/// Renders a [`PipelineEvent`] to a single line of text for stream sinks.
pub trait EventFormatter: Send + Sync {
    fn render(&self, event: &PipelineEvent) -> String;
}

/// Human-oriented one-line rendering via the event's `Display` impl.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainFormatter;

impl EventFormatter for PlainFormatter {
    fn render(&self, event: &PipelineEvent) -> String {
        format!("{} {event}", event.timestamp().format("%H:%M:%S%.3f"))
    }
}

/// Compact JSON rendering of the normalized event shape, one object per
/// line.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormatter;

impl EventFormatter for JsonFormatter {
    fn render(&self, event: &PipelineEvent) -> String {
        event.to_json_value().to_string()
    }
}
