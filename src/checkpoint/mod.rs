//! Checkpoint and hydration.
//!
//! A checkpoint freezes one engine snapshot so it can be stored, shipped and
//! later fed back as the initial value of a new engine. In-flight work,
//! producers and subscribers are not part of it.

use crate::core::{AsyncState, Seed, Status};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;

pub use error::{CheckpointError, Encoding};

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable copy of an engine snapshot.
///
/// # Example
///
/// ```rust
/// use async_state::checkpoint::Checkpoint;
/// use async_state::core::{AsyncState, Seed};
///
/// let state: AsyncState<u32, String> = AsyncState::init(Some(Seed::Data(7)), false);
/// let checkpoint = Checkpoint::capture(&state, Some("answer"));
///
/// let json = checkpoint.to_json().unwrap();
/// let restored: Checkpoint<u32, String> = Checkpoint::from_json(&json).unwrap();
/// assert_eq!(restored.seed(), Some(Seed::Data(7)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<T, E> {
    /// Checkpoint format version
    pub version: u32,
    /// Unique checkpoint identifier
    pub id: String,
    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,
    /// Debug label of the engine it was taken from
    pub label: Option<String>,
    pub state: AsyncState<T, E>,
}

impl<T: Clone, E: Clone> Checkpoint<T, E> {
    pub fn capture(state: &AsyncState<T, E>, label: Option<&str>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            label: label.map(str::to_string),
            state: state.clone(),
        }
    }

    /// Initial value for an engine resumed from this checkpoint.
    ///
    /// The current error wins over stale data; a pending or initial
    /// snapshot with neither yields `None`.
    pub fn seed(&self) -> Option<Seed<T, E>> {
        match (&self.state.error, &self.state.data) {
            (Some(error), _) if self.state.status == Status::Rejected => {
                Some(Seed::Error(error.clone()))
            }
            (_, Some(data)) => Some(Seed::Data(data.clone())),
            (Some(error), None) => Some(Seed::Error(error.clone())),
            (None, None) => None,
        }
    }
}

impl<T: Serialize, E: Serialize> Checkpoint<T, E> {
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self).map_err(|e| CheckpointError::Export {
            encoding: Encoding::Json,
            reason: e.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::Export {
            encoding: Encoding::Binary,
            reason: e.to_string(),
        })
    }
}

impl<T: DeserializeOwned, E: DeserializeOwned> Checkpoint<T, E> {
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json).map_err(|e| CheckpointError::Import {
            encoding: Encoding::Json,
            reason: e.to_string(),
        })?;
        checkpoint.validate()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes).map_err(|e| CheckpointError::Import {
            encoding: Encoding::Binary,
            reason: e.to_string(),
        })?;
        checkpoint.validate()
    }
}

impl<T, E> Checkpoint<T, E> {
    fn validate(self) -> Result<Self, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.state.status == Status::Fulfilled && self.state.data.is_none() {
            return Err(CheckpointError::Inconsistent {
                status: Status::Fulfilled,
                missing: "data",
            });
        }
        if self.state.status == Status::Rejected && self.state.error.is_none() {
            return Err(CheckpointError::Inconsistent {
                status: Status::Rejected,
                missing: "error",
            });
        }
        Ok(self)
    }
}
