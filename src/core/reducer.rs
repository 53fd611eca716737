//! The state reducer.
//!
//! `reduce` is the transition table of the machine. It knows nothing about
//! concurrency: stale settlements are filtered out by the engine before they
//! ever become actions.

use super::action::Action;
use super::state::{AsyncState, Seed, Snapshot};
use super::status::{classify_idle, Status};
use chrono::Utc;
use std::rc::Rc;

/// Compute the next snapshot for an action.
///
/// Custom actions return the very same `Rc`.
///
/// # Example
///
/// ```rust
/// use async_state::core::{reduce, Action, ActionMeta, AsyncState, Status};
/// use std::rc::Rc;
///
/// let state = Rc::new(AsyncState::<String, String>::init(None, false));
/// let started = reduce(&state, &Action::Start { payload: None, meta: ActionMeta { counter: 1, debug_label: None } });
/// assert_eq!(started.status, Status::Pending);
/// assert_eq!(started.counter, 1);
///
/// let done = reduce(&started, &Action::Fulfill { payload: "x".to_string(), meta: ActionMeta::default() });
/// assert_eq!(done.data.as_deref(), Some("x"));
/// assert_eq!(done.counter, 1);
/// ```
pub fn reduce<T: Clone, E: Clone>(state: &Snapshot<T, E>, action: &Action<T, E>) -> Snapshot<T, E> {
    match action {
        Action::Start { meta, .. } => Rc::new(AsyncState {
            started_at: Some(Utc::now()),
            finished_at: None,
            status: Status::Pending,
            counter: meta.counter,
            ..AsyncState::clone(state)
        }),
        Action::Cancel { meta } => {
            let last = match (&state.error, &state.data) {
                (Some(error), _) => Some(Seed::Error(error)),
                (None, Some(data)) => Some(Seed::Data(data)),
                (None, None) => None,
            };
            Rc::new(AsyncState {
                started_at: None,
                finished_at: None,
                status: classify_idle(last.as_ref()),
                counter: meta.counter,
                ..AsyncState::clone(state)
            })
        }
        Action::Fulfill { payload, .. } => Rc::new(AsyncState {
            data: Some(payload.clone()),
            error: None,
            finished_at: Some(Utc::now()),
            status: Status::Fulfilled,
            ..AsyncState::clone(state)
        }),
        Action::Reject { payload, .. } => Rc::new(AsyncState {
            error: Some(payload.clone()),
            finished_at: Some(Utc::now()),
            status: Status::Rejected,
            ..AsyncState::clone(state)
        }),
        Action::Custom { .. } => Rc::clone(state),
    }
}
