//! Engine errors.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the engine to the embedding layer.
///
/// Producer failures are not errors here; they become rejected state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("runaway re-invocation: {restarts} restarts within {window:?}; a producer or watch key probably changes on every cycle")]
    RunawayRestarts { restarts: usize, window: Duration },
}
