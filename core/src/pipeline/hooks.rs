// fulfillment/src/pipeline/hooks.rs

//! Registration of `before`, `on` and `after` handlers.

use super::context_data::ContextData;
use super::control::PipelineControl;
use super::definition::{Handler, Pipeline};
use crate::error::PipelineError;
use std::collections::HashMap;
use std::future::Future;

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub fn before_root<F, HandlerErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, HandlerErr>> + Send + 'static,
    HandlerErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    push_handler(&mut self.before, step_name, handler_fn);
  }

  pub fn on_root<F, HandlerErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, HandlerErr>> + Send + 'static,
    HandlerErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    push_handler(&mut self.on, step_name, handler_fn);
  }

  pub fn after_root<F, HandlerErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, HandlerErr>> + Send + 'static,
    HandlerErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    push_handler(&mut self.after, step_name, handler_fn);
  }
}

fn push_handler<TData, Err, F, HandlerErr>(
  phase: &mut HashMap<String, Vec<Handler<TData, Err>>>,
  step_name: &str,
  handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
) where
  TData: 'static + Send + Sync,
  Err: 'static,
  F: Future<Output = Result<PipelineControl, HandlerErr>> + Send + 'static,
  HandlerErr: Into<Err> + Send + Sync + 'static,
{
  let handler: Handler<TData, Err> = Box::new(move |ctx_data| {
    let fut = handler_fn(ctx_data);
    Box::pin(async move { fut.await.map_err(Into::into) })
  });
  phase.entry(step_name.to_string()).or_default().push(handler);
}
