// fulfillment/src/pipeline/mod.rs

//! A small step pipeline: an ordered list of named steps, each with `before`, `on`
//! and `after` handlers that share one `ContextData<T>`.
//!
//! The order worker builds one pipeline per worker and runs it once per queue
//! message; each handler can stop the run early with `PipelineControl::Stop`.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod execution;
pub mod hooks;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Pipeline, SkipCondition, StepDef};
