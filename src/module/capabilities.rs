//! Immutable capability metadata advertised by a processor.

use serde::{Deserialize, Serialize};

/// Advisory descriptor the scheduler consults when grouping work.
///
/// `may_block` is the load-bearing flag: the adaptive strategy runs
/// may-block siblings of a level concurrently while keeping everything else
/// strictly ordered. The remaining fields are informational for hosts and
/// introspection surfaces.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub supports_async: bool,
    #[serde(default)]
    pub supports_batch: bool,
    #[serde(default)]
    pub may_block: bool,
    #[serde(default)]
    pub resource_tags: Vec<String>,
    /// Estimated cycles per second this module can sustain. Advisory only.
    #[serde(default)]
    pub throughput_hint: f64,
}

impl Capabilities {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn blocking() -> Self {
        Self {
            may_block: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_resource_tag(mut self, tag: impl Into<String>) -> Self {
        self.resource_tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_throughput_hint(mut self, hint: f64) -> Self {
        self.throughput_hint = hint;
        self
    }
}
