//! Checkpoint error types.

use crate::core::Status;
use std::fmt;
use thiserror::Error;

/// Wire format of an exported snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Binary,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Binary => "binary",
        })
    }
}

/// Why a snapshot could not be exported or restored.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CheckpointError {
    #[error("cannot export snapshot as {encoding}: {reason}")]
    Export { encoding: Encoding, reason: String },

    #[error("cannot read {encoding} snapshot: {reason}")]
    Import { encoding: Encoding, reason: String },

    /// Written by a build with a different checkpoint layout
    #[error("snapshot uses checkpoint format v{found}, this build reads v{supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Restored status has no value to show
    #[error("{status} snapshot carries no {missing}")]
    Inconsistent {
        status: Status,
        missing: &'static str,
    },
}
