use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::event::PipelineEvent;
use crate::telemetry::{EventFormatter, PlainFormatter};

/// Output target consuming full [`PipelineEvent`] objects. Sink failures are
/// logged by the bus listener and never reach executor control flow.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()>;
}

/// Stdout sink with pluggable formatting.
pub struct StdOutSink<F: EventFormatter = PlainFormatter> {
    handle: Stdout,
    formatter: F,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
            formatter: PlainFormatter,
        }
    }
}

impl<F: EventFormatter> StdOutSink<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            handle: io::stdout(),
            formatter,
        }
    }
}

impl<F: EventFormatter> EventSink for StdOutSink<F> {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        let mut rendered = self.formatter.render(event);
        rendered.push('\n');
        self.handle.write_all(rendered.as_bytes())?;
        self.handle.flush()
    }
}

/// In-memory sink for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PipelineEvent> {
        self.entries.lock().expect("sink poisoned").clone()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("sink poisoned").clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        self.entries
            .lock()
            .expect("sink poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Forwards events into a tokio mpsc channel for async consumers such as a
/// host UI thread.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}

/// Invokes a closure per event, the registration shape host applications
/// use for listener callbacks. Optionally filtered to one event kind.
pub struct CallbackSink {
    callback: Arc<dyn Fn(&PipelineEvent) + Send + Sync>,
    kind: Option<&'static str>,
}

impl CallbackSink {
    pub fn new(callback: impl Fn(&PipelineEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            kind: None,
        }
    }

    /// Only deliver events whose [`PipelineEvent::kind`] matches.
    #[must_use]
    pub fn filtered(
        kind: &'static str,
        callback: impl Fn(&PipelineEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback: Arc::new(callback),
            kind: Some(kind),
        }
    }
}

impl EventSink for CallbackSink {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        if self.kind.is_none_or(|k| k == event.kind()) {
            (self.callback)(event);
        }
        Ok(())
    }
}
