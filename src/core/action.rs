//! Actions: the only way to change a snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deferred work attached to a start action.
///
/// The dispatch pipeline invokes it after subscribers have seen the
/// pending state, which lets an interceptor hold it back.
pub type StartThunk = Box<dyn FnOnce()>;

/// Metadata carried by every action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMeta {
    /// Invocation the action belongs to
    pub counter: u64,
    pub debug_label: Option<String>,
}

/// Discriminant of an [`Action`], for logging and tooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Start,
    Cancel,
    Fulfill,
    Reject,
    Custom,
}

impl ActionType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Fulfill => "fulfill",
            Self::Reject => "reject",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A requested state transition.
pub enum Action<T, E> {
    /// An invocation started; `payload` performs the actual work
    Start {
        payload: Option<StartThunk>,
        meta: ActionMeta,
    },
    /// The active invocation was abandoned
    Cancel { meta: ActionMeta },
    /// The active invocation produced data
    Fulfill { payload: T, meta: ActionMeta },
    /// The active invocation failed
    Reject { payload: E, meta: ActionMeta },
    /// Extension action injected by middleware; the base reducer ignores it
    Custom { name: String, meta: ActionMeta },
}

impl<T, E> Action<T, E> {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Start { .. } => ActionType::Start,
            Self::Cancel { .. } => ActionType::Cancel,
            Self::Fulfill { .. } => ActionType::Fulfill,
            Self::Reject { .. } => ActionType::Reject,
            Self::Custom { .. } => ActionType::Custom,
        }
    }

    pub fn meta(&self) -> &ActionMeta {
        match self {
            Self::Start { meta, .. }
            | Self::Cancel { meta }
            | Self::Fulfill { meta, .. }
            | Self::Reject { meta, .. }
            | Self::Custom { meta, .. } => meta,
        }
    }

    /// Detach the work of a start action, leaving `None` in its place.
    ///
    /// Returns `None` for every other action type.
    pub fn take_start_payload(&mut self) -> Option<StartThunk> {
        match self {
            Self::Start { payload, .. } => payload.take(),
            _ => None,
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Action<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { payload, meta } => f
                .debug_struct("Start")
                .field("payload", &payload.as_ref().map(|_| "<thunk>"))
                .field("meta", meta)
                .finish(),
            Self::Cancel { meta } => f.debug_struct("Cancel").field("meta", meta).finish(),
            Self::Fulfill { payload, meta } => f
                .debug_struct("Fulfill")
                .field("payload", payload)
                .field("meta", meta)
                .finish(),
            Self::Reject { payload, meta } => f
                .debug_struct("Reject")
                .field("payload", payload)
                .field("meta", meta)
                .finish(),
            Self::Custom { name, meta } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("meta", meta)
                .finish(),
        }
    }
}
