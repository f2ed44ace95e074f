use std::sync::{Arc, Mutex};

use miette::Diagnostic;
use thiserror::Error;
use tokio::{sync::oneshot, task};

use super::event::PipelineEvent;
use super::sink::{EventSink, StdOutSink};

/// Emission failure. The only realistic cause is a bus whose receiver side
/// has been dropped.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitterError {
    #[error("event bus closed")]
    #[diagnostic(code(visionflow::events::closed))]
    Closed,
}

/// Cloneable producer handle onto the bus spine. Emission is synchronous and
/// non-blocking; delivery to sinks happens on the listener task.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    sender: flume::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: PipelineEvent) -> Result<(), EmitterError> {
        self.sender.send(event).map_err(|_| EmitterError::Closed)
    }

    /// Emit and swallow a closed-bus failure with a debug log. Used on paths
    /// where event delivery must never influence control flow.
    pub fn emit_lossy(&self, event: PipelineEvent) {
        if self.emit(event).is_err() {
            tracing::debug!("event dropped: bus closed");
        }
    }
}

/// Receives events and broadcasts each one to every registered sink on a
/// background listener task.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<PipelineEvent>, flume::Receiver<PipelineEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink; takes effect for all subsequent events.
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().expect("sinks poisoned").push(Box::new(sink));
    }

    /// Producer handle for executors and reporters.
    #[must_use]
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            sender: self.event_channel.0.clone(),
        }
    }

    /// Spawn the background listener that fans events out to sinks.
    /// Idempotent: calling again while listening has no effect.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock().expect("sinks poisoned");
                            for (slot, sink) in sinks_guard.iter_mut().enumerate() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::warn!(
                                        error = %e,
                                        slot,
                                        kind = event.kind(),
                                        "event sink failed"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the listener, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
