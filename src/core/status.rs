//! Status model for asynchronous operations.
//!
//! Maps a seed value and the presence of a unit of work to one of four
//! canonical statuses, and projects a status onto its boolean flags.
//! Everything here is pure and total.

use super::state::Seed;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical status of an asynchronous operation.
///
/// # Example
///
/// ```rust
/// use async_state::core::Status;
///
/// assert_eq!(Status::Pending.name(), "pending");
/// assert!(Status::Rejected.is_settled());
/// assert!(!Status::Initial.is_settled());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No invocation ever started, or the machine was reset to empty
    Initial,
    /// An invocation is in flight
    Pending,
    /// The last settlement produced data
    Fulfilled,
    /// The last settlement produced an error
    Rejected,
}

impl Status {
    /// Get the status name for display/logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }

    /// Check if the status is a settlement (fulfilled or rejected).
    pub fn is_settled(&self) -> bool {
        derive_flags(*self).is_settled
    }

    /// Project this status onto its boolean flags.
    pub fn flags(&self) -> StatusFlags {
        derive_flags(*self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Boolean projection of a [`Status`].
///
/// Only [`derive_flags`] builds these, so they always agree with the
/// status they were derived from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusFlags {
    pub is_initial: bool,
    pub is_pending: bool,
    pub is_fulfilled: bool,
    pub is_rejected: bool,
    pub is_settled: bool,
}

/// Derive the five boolean flags for a status.
///
/// # Example
///
/// ```rust
/// use async_state::core::{derive_flags, Status};
///
/// let flags = derive_flags(Status::Fulfilled);
/// assert!(flags.is_fulfilled);
/// assert!(flags.is_settled);
/// assert!(!flags.is_pending);
/// ```
pub fn derive_flags(status: Status) -> StatusFlags {
    let is_fulfilled = status == Status::Fulfilled;
    let is_rejected = status == Status::Rejected;
    StatusFlags {
        is_initial: status == Status::Initial,
        is_pending: status == Status::Pending,
        is_fulfilled,
        is_rejected,
        is_settled: is_fulfilled || is_rejected,
    }
}

/// Status of a freshly constructed machine.
///
/// A seed error wins over everything, then a seed value; without a seed the
/// machine is pending when it has a unit of work to run.
///
/// # Example
///
/// ```rust
/// use async_state::core::{classify_initial, Seed, Status};
///
/// let seed: Seed<u32, String> = Seed::Data(7);
/// assert_eq!(classify_initial(Some(&seed), true), Status::Fulfilled);
/// assert_eq!(classify_initial::<u32, String>(None, true), Status::Pending);
/// assert_eq!(classify_initial::<u32, String>(None, false), Status::Initial);
/// ```
pub fn classify_initial<T, E>(value: Option<&Seed<T, E>>, has_work: bool) -> Status {
    match value {
        Some(Seed::Error(_)) => Status::Rejected,
        Some(Seed::Data(_)) => Status::Fulfilled,
        None if has_work => Status::Pending,
        None => Status::Initial,
    }
}

/// Status to fall back to when no unit of work is active.
pub fn classify_idle<T, E>(value: Option<&Seed<T, E>>) -> Status {
    classify_initial(value, false)
}
