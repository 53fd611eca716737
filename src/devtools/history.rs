//! Per-engine status history.

use crate::core::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// One observed status change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: Status,
    pub to: Status,
    pub timestamp: DateTime<Utc>,
    /// Invocation counter of the snapshot that carried the new status
    pub counter: u64,
}

/// Ordered record of status changes.
///
/// A history built with [`StatusHistory::with_limit`] keeps only the most
/// recent transitions.
///
/// # Example
///
/// ```rust
/// use async_state::core::Status;
/// use async_state::devtools::{StatusHistory, StatusTransition};
/// use chrono::Utc;
///
/// let mut history = StatusHistory::new();
/// history.record(StatusTransition {
///     from: Status::Initial,
///     to: Status::Pending,
///     timestamp: Utc::now(),
///     counter: 1,
/// });
///
/// assert_eq!(history.get_path(), vec![Status::Initial, Status::Pending]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusHistory {
    transitions: VecDeque<StatusTransition>,
    #[serde(default)]
    limit: Option<usize>,
}

impl StatusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History that drops its oldest transitions beyond `limit`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            transitions: VecDeque::with_capacity(limit.min(64)),
            limit: Some(limit),
        }
    }

    pub fn record(&mut self, transition: StatusTransition) {
        self.transitions.push_back(transition);
        if let Some(limit) = self.limit {
            while self.transitions.len() > limit {
                self.transitions.pop_front();
            }
        }
    }

    /// Statuses visited: the first `from`, then every `to`.
    pub fn get_path(&self) -> Vec<Status> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.front() {
            path.push(first.from);
        }
        path.extend(self.transitions.iter().map(|transition| transition.to));
        path
    }

    /// Time between the first and last recorded change.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.transitions.front()?, self.transitions.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &StatusTransition> {
        self.transitions.iter()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
