// fulfillment/src/pipeline/control.rs

/// Returned by every handler to say whether the run goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  Continue,
  /// Halt now: no further handlers of this step or later steps run.
  Stop,
}

/// How a run ended when no handler failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
  Completed,
  Stopped { step_name: String },
}
