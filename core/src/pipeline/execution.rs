// fulfillment/src/pipeline/execution.rs

//! `Pipeline::run()`: walks the steps in order and runs each phase's handlers.

use super::context_data::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::definition::{Handler, Pipeline};
use crate::error::PipelineError;
use tracing::{event, instrument, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Runs every step against `ctx_data`.
  ///
  /// Returns `Stopped` as soon as a handler asks to stop, and the first handler
  /// error as-is. A non-optional step without any handler is a `HandlerMissing` error.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(context_type = %std::any::type_name::<TData>(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip_if) = &step_def.skip_if {
        if skip_if(ctx_data.clone()) {
          event!(Level::DEBUG, step_name, "Step skipped by condition.");
          continue;
        }
      }

      let phases = [
        ("before", self.before.get(step_name)),
        ("on", self.on.get(step_name)),
        ("after", self.after.get(step_name)),
      ];

      if phases.iter().all(|(_, handlers)| handlers.map_or(true, Vec::is_empty)) {
        if step_def.optional {
          event!(Level::DEBUG, step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(Level::ERROR, step_name, "Non-optional step has no handlers.");
        return Err(Err::from(PipelineError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      let step_span = tracing::info_span!("pipeline_step", step_name, step_index = step_idx);
      for (phase, handlers) in phases {
        let Some(handlers) = handlers else { continue };
        if run_phase(handlers, &ctx_data, phase).instrument(step_span.clone()).await? == PipelineControl::Stop {
          event!(Level::DEBUG, step_name, phase, "Pipeline stopped by handler.");
          return Ok(PipelineResult::Stopped {
            step_name: step_def.name.clone(),
          });
        }
      }
    }

    Ok(PipelineResult::Completed)
  }
}

async fn run_phase<TData, Err>(
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
  phase: &'static str,
) -> Result<PipelineControl, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error,
{
  for handler in handlers {
    match handler(ctx_data.clone()).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => return Ok(PipelineControl::Stop),
      Err(e) => {
        event!(Level::ERROR, phase, error = %e, "Handler failed.");
        return Err(e);
      }
    }
  }
  Ok(PipelineControl::Continue)
}
