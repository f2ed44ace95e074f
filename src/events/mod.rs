//! Event delivery: the [`PipelineEvent`] vocabulary, a flume-backed
//! [`EventBus`] with background fan-out, and the sink implementations hosts
//! subscribe with.

mod bus;
mod event;
mod sink;

pub use bus::{EmitterError, EventBus, EventEmitter};
pub use event::{
    CycleResultEvent, DiagnosticEvent, ExecErrorEvent, MetricsEvent, ModuleStepEvent,
    PipelineEvent, ProgressEvent, StepPhase,
};
pub use sink::{CallbackSink, ChannelSink, EventSink, MemorySink, StdOutSink};
