//! Build errors for the engine builder.

use std::time::Duration;
use thiserror::Error;

/// One problem with the configured options.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OptionViolation {
    #[error("restart guard limit must be at least 1")]
    ZeroRestartLimit,

    #[error("restart guard window must be non-zero, got {0:?}")]
    ZeroRestartWindow(Duration),

    #[error("debug label must not be blank")]
    BlankDebugLabel,

    #[error("a custom dispatcher cannot be combined with devtools. Call only one of .dispatcher() or .devtools()")]
    DispatcherConflict,
}

/// Errors returned by [`AsyncBuilder::build`](crate::builder::AsyncBuilder::build).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    /// Every violation found, not just the first
    #[error("invalid engine options: {0:?}")]
    Invalid(Vec<OptionViolation>),
}

impl BuildError {
    pub fn violations(&self) -> &[OptionViolation] {
        match self {
            Self::Invalid(violations) => violations,
        }
    }
}
