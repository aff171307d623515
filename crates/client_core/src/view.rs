//! Shared plumbing for the view controllers: where rendered values go, the
//! listening contract, and the staged-to-sink commit step.

use serde_json::Value;
use tracing::debug;

use crate::{error::StateError, reconcilable_state::ReconcilableState};

/// View state is heterogeneous, so values are kept as JSON.
pub type ViewState = ReconcilableState<Value>;

/// Display target for committed view state.
pub trait RenderSink: Send + Sync {
    fn render(&self, element: &str, value: &Value);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&self, _element: &str, _value: &Value) {}
}

/// Reports every rendered value at debug level.
#[derive(Debug, Clone, Copy)]
pub struct TraceSink {
    pub view: &'static str,
}

impl RenderSink for TraceSink {
    fn render(&self, element: &str, value: &Value) {
        debug!(view = self.view, element, value = %value, "render");
    }
}

/// Balanced start/stop of input handling. Only the first start and the
/// matching last stop take effect.
pub trait Listener: Send + Sync {
    fn start_listening(&self);
    fn stop_listening(&self);
    fn is_listening(&self) -> bool;
}

/// Commit `key` and hand it to `sink` if it is staged or `force` is set.
/// Returns whether the value was rendered.
pub fn enforce(
    state: &mut ViewState,
    sink: &dyn RenderSink,
    key: &str,
    force: bool,
) -> Result<bool, StateError> {
    if !force && !state.is_staged(key)? {
        return Ok(false);
    }
    match state.commit_value(key)? {
        Some(value) => {
            sink.render(key, value);
            Ok(true)
        }
        None => Ok(false),
    }
}

pub(crate) fn number(state: &ViewState, key: &str) -> Result<f64, StateError> {
    Ok(state.get_value(key)?.and_then(Value::as_f64).unwrap_or(0.0))
}

pub(crate) fn integer(state: &ViewState, key: &str) -> Result<Option<i64>, StateError> {
    Ok(state.get_value(key)?.and_then(Value::as_i64))
}

pub(crate) fn flag(state: &ViewState, key: &str) -> Result<bool, StateError> {
    Ok(state.get_value(key)?.and_then(Value::as_bool).unwrap_or(false))
}
