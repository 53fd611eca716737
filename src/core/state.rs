//! Immutable state snapshots.
//!
//! A snapshot describes the observable status of an asynchronous operation
//! at one point in time. Snapshots are never mutated: every action produces
//! a new one, shared behind an `Rc` so unchanged states keep their identity.

use super::status::{classify_initial, derive_flags, Status, StatusFlags};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Shared handle to an immutable state snapshot.
pub type Snapshot<T, E> = Rc<AsyncState<T, E>>;

/// Either a value or an error.
///
/// Used for the seed supplied at construction and for the current
/// [`AsyncState::value`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seed<T, E> {
    Data(T),
    Error(E),
}

impl<T, E> Seed<T, E> {
    /// Borrow the contents.
    pub fn as_ref(&self) -> Seed<&T, &E> {
        match self {
            Self::Data(data) => Seed::Data(data),
            Self::Error(error) => Seed::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(data) => Some(data),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Data(_) => None,
            Self::Error(error) => Some(error),
        }
    }
}

/// Observable state of one asynchronous operation.
///
/// The boolean flags are not stored; they are derived from `status` on
/// every call so they cannot drift from it.
///
/// # Example
///
/// ```rust
/// use async_state::core::{AsyncState, Seed, Status};
///
/// let state: AsyncState<String, String> = AsyncState::init(None, false);
/// assert_eq!(state.status, Status::Initial);
/// assert!(state.is_initial());
///
/// let hydrated: AsyncState<String, String> =
///     AsyncState::init(Some(Seed::Data("cached".to_string())), true);
/// assert!(hydrated.is_fulfilled());
/// assert_eq!(hydrated.data.as_deref(), Some("cached"));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AsyncState<T, E> {
    /// Seed supplied at construction, kept for reference
    pub initial_value: Option<Seed<T, E>>,
    /// Last successfully produced value
    pub data: Option<T>,
    /// Last failure
    pub error: Option<E>,
    /// When the current invocation started
    pub started_at: Option<DateTime<Utc>>,
    /// When the current invocation settled
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Status,
    /// Invocation that produced this snapshot
    pub counter: u64,
}

impl<T: Clone, E: Clone> AsyncState<T, E> {
    /// Build the first snapshot of a machine.
    ///
    /// `has_work` tells whether a promise or producer is configured; it makes
    /// an unseeded machine start out pending.
    pub fn init(initial_value: Option<Seed<T, E>>, has_work: bool) -> Self {
        let now = Utc::now();
        let status = classify_initial(initial_value.as_ref(), has_work);
        let (data, error) = match &initial_value {
            Some(Seed::Data(data)) => (Some(data.clone()), None),
            Some(Seed::Error(error)) => (None, Some(error.clone())),
            None => (None, None),
        };

        Self {
            finished_at: initial_value.as_ref().map(|_| now),
            started_at: has_work.then_some(now),
            initial_value,
            data,
            error,
            status,
            counter: 0,
        }
    }
}

impl<T, E> AsyncState<T, E> {
    /// Whichever of data/error is current.
    ///
    /// `fulfill` clears the error, so a present error always belongs to the
    /// latest settlement.
    pub fn value(&self) -> Option<Seed<&T, &E>> {
        match (&self.error, &self.data) {
            (Some(error), _) => Some(Seed::Error(error)),
            (None, Some(data)) => Some(Seed::Data(data)),
            (None, None) => None,
        }
    }

    pub fn flags(&self) -> StatusFlags {
        derive_flags(self.status)
    }

    pub fn is_initial(&self) -> bool {
        self.flags().is_initial
    }

    pub fn is_pending(&self) -> bool {
        self.flags().is_pending
    }

    pub fn is_fulfilled(&self) -> bool {
        self.flags().is_fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.flags().is_rejected
    }

    pub fn is_settled(&self) -> bool {
        self.flags().is_settled
    }
}
