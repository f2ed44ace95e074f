//! # Visionflow: Pipeline Execution Engine for Machine-Vision Workflows
//!
//! Visionflow executes directed graphs of pluggable processing modules the
//! way a visual workflow editor wires them: typed ports, explicit
//! connections, per-cycle data routing with a shared context, and a
//! background worker loop with pause/resume/stop control.
//!
//! ## Core Concepts
//!
//! - **Processor**: async unit of computation with declared ports, a
//!   capability descriptor, and a config validator
//! - **Module**: the executor-facing wrapper adding identity, lifecycle
//!   status, and per-cycle I/O caches
//! - **Graph**: nodes plus normalized port-to-port connections; cycles are
//!   rejected before execution
//! - **Executor**: input/output queues, three cycle strategies
//!   (sequential, parallel-by-level, adaptive), gating, and metrics
//! - **Events**: a flume-backed bus fanning progress/result/error/metrics
//!   events out to subscriber sinks
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use visionflow::executor::PipelineExecutor;
//! use visionflow::module::Module;
//! use visionflow::modules::{PrintProcessor, TextInputProcessor};
//! use visionflow::types::new_data_map;
//!
//! # async fn demo() {
//! let mut executor = PipelineExecutor::new();
//! let src = executor
//!     .add_module(Module::new(Box::new(TextInputProcessor::new("hello"))), None)
//!     .await
//!     .unwrap();
//! let dst = executor
//!     .add_module(Module::new(Box::new(PrintProcessor)), None)
//!     .await
//!     .unwrap();
//! executor.connect(&src, "text", &dst, "text").await.unwrap();
//!
//! let result = executor.run_once(new_data_map()).await.unwrap();
//! assert_eq!(result["text_out"], json!("hello"));
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`module`] - the processor contract, lifecycle, and registry
//! - [`graph`] - graph model, topological order, execution levels
//! - [`executor`] - lifecycle control, queues, cycle strategies
//! - [`events`] - event vocabulary, bus, and sinks
//! - [`metrics`] - per-node timing aggregation and the interval reporter
//! - [`blueprint`] - persisted graph shape and reconstruction
//! - [`modules`] - built-in leaf processors

pub mod blueprint;
pub mod config;
pub mod events;
pub mod executor;
pub mod graph;
pub mod metrics;
pub mod module;
pub mod modules;
pub mod telemetry;
pub mod types;
