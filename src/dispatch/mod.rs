//! Dispatch middleware and interception.
//!
//! Every action travels the same pipeline:
//!
//! 1. an optional external [`Dispatcher`] sees it first and decides if and
//!    when to forward it,
//! 2. the middleware from [`wrap_dispatch`] commits it through the reducer
//!    (optionally wrapped by a user reducer, see [`with_custom_reducer`]),
//! 3. for start actions, the middleware then runs the attached work.
//!
//! Splitting "tell subscribers we started" from "perform the work" is what
//! lets tooling pause an invocation between the two.

use crate::core::{reduce, Action, Snapshot};
use std::rc::Rc;
use tracing::trace;

/// A dispatch function.
pub type Dispatch<T, E> = Rc<dyn Fn(Action<T, E>)>;

/// The reducer signature used by the engine.
pub type ReduceFn<T, E> = Rc<dyn Fn(&Snapshot<T, E>, &Action<T, E>) -> Snapshot<T, E>>;

/// A user reducer, handed the base reducer so it can delegate to it.
pub type CustomReducer<T, E> = Rc<
    dyn Fn(
        &Snapshot<T, E>,
        &Action<T, E>,
        &dyn Fn(&Snapshot<T, E>, &Action<T, E>) -> Snapshot<T, E>,
    ) -> Snapshot<T, E>,
>;

/// External agent receiving every action before it is committed.
///
/// Implementations must eventually call `inner` with a valid action or the
/// visible state will never progress past pending.
pub trait Dispatcher<T, E, P> {
    fn dispatch(&self, action: Action<T, E>, inner: Dispatch<T, E>, props: &P);
}

impl<T, E, P, F> Dispatcher<T, E, P> for F
where
    F: Fn(Action<T, E>, Dispatch<T, E>, &P),
{
    fn dispatch(&self, action: Action<T, E>, inner: Dispatch<T, E>, props: &P) {
        self(action, inner, props)
    }
}

/// Wrap a raw state-setting function so start actions run their work after
/// the raw dispatch returns.
///
/// # Example
///
/// ```rust
/// use async_state::core::{Action, ActionMeta, ActionType};
/// use async_state::dispatch::wrap_dispatch;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let seen = Rc::clone(&log);
/// let dispatch = wrap_dispatch(move |action: Action<(), ()>| {
///     seen.borrow_mut().push(action.action_type().name().to_string())
/// });
///
/// let ran = Rc::clone(&log);
/// dispatch(Action::Start {
///     payload: Some(Box::new(move || ran.borrow_mut().push("work".to_string()))),
///     meta: ActionMeta::default(),
/// });
///
/// assert_eq!(*log.borrow(), vec!["start", "work"]);
/// ```
pub fn wrap_dispatch<T, E, F>(raw: F) -> Dispatch<T, E>
where
    T: 'static,
    E: 'static,
    F: Fn(Action<T, E>) + 'static,
{
    Rc::new(move |mut action: Action<T, E>| {
        let work = action.take_start_payload();
        raw(action);
        if let Some(work) = work {
            trace!("running start payload");
            work();
        }
    })
}

/// Route an action through an optional external dispatcher.
pub fn with_external_dispatcher<T, E, P>(
    action: Action<T, E>,
    inner: Dispatch<T, E>,
    dispatcher: Option<&dyn Dispatcher<T, E, P>>,
    props: &P,
) {
    match dispatcher {
        Some(dispatcher) => dispatcher.dispatch(action, inner, props),
        None => inner(action),
    }
}

/// Compose an optional user reducer in front of the base reducer.
pub fn with_custom_reducer<T, E>(user: Option<CustomReducer<T, E>>) -> ReduceFn<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    match user {
        Some(user) => Rc::new(move |state: &Snapshot<T, E>, action: &Action<T, E>| {
            user(state, action, &reduce::<T, E>)
        }),
        None => Rc::new(reduce::<T, E>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionMeta, AsyncState, Status};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recorder(log: &Log) -> Dispatch<String, String> {
        let log = Rc::clone(log);
        wrap_dispatch(move |action: Action<String, String>| {
            log.borrow_mut().push(action.action_type().to_string())
        })
    }

    fn start_with_work(log: &Log) -> Action<String, String> {
        let log = Rc::clone(log);
        Action::Start {
            payload: Some(Box::new(move || log.borrow_mut().push("work".to_string()))),
            meta: ActionMeta::default(),
        }
    }

    #[test]
    fn middleware_runs_work_after_commit() {
        let log: Log = Rc::default();
        let dispatch = recorder(&log);

        dispatch(start_with_work(&log));
        dispatch(Action::Cancel {
            meta: ActionMeta::default(),
        });

        assert_eq!(*log.borrow(), vec!["start", "work", "cancel"]);
    }

    #[test]
    fn external_dispatcher_can_withhold_work() {
        let log: Log = Rc::default();
        let parked: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::default();
        let park = Rc::clone(&parked);
        let dispatcher = move |mut action: Action<String, String>,
                               inner: Dispatch<String, String>,
                               _props: &()| {
            if let Some(work) = action.take_start_payload() {
                park.borrow_mut().push(work);
            }
            inner(action);
        };

        with_external_dispatcher(
            start_with_work(&log),
            recorder(&log),
            Some(&dispatcher as &dyn Dispatcher<String, String, ()>),
            &(),
        );
        assert_eq!(*log.borrow(), vec!["start"]);

        let work = parked.borrow_mut().pop().unwrap();
        work();
        assert_eq!(*log.borrow(), vec!["start", "work"]);
    }

    #[test]
    fn without_dispatcher_goes_straight_to_inner() {
        let log: Log = Rc::default();
        with_external_dispatcher::<String, String, ()>(
            Action::Reject {
                payload: "e".to_string(),
                meta: ActionMeta::default(),
            },
            recorder(&log),
            None,
            &(),
        );
        assert_eq!(*log.borrow(), vec!["reject"]);
    }

    #[test]
    fn custom_reducer_can_override_payload() {
        type S = Snapshot<String, String>;
        type A = Action<String, String>;
        let user: CustomReducer<String, String> =
            Rc::new(|state: &S, action: &A, base: &dyn Fn(&S, &A) -> S| match action {
            Action::Fulfill { meta, .. } => base(
                state,
                &Action::Fulfill {
                    payload: "forced".to_string(),
                    meta: meta.clone(),
                },
            ),
            other => base(state, other),
        });
        let reducer = with_custom_reducer(Some(user));

        let state = Rc::new(AsyncState::init(None, false));
        let next = reducer(
            &state,
            &Action::Fulfill {
                payload: "real".to_string(),
                meta: ActionMeta::default(),
            },
        );

        assert_eq!(next.data.as_deref(), Some("forced"));
        assert_eq!(next.status, Status::Fulfilled);
    }

    #[test]
    fn default_reducer_is_base_reducer() {
        let reducer = with_custom_reducer::<String, String>(None);
        let state = Rc::new(AsyncState::init(None, false));
        let next = reducer(
            &state,
            &Action::Start {
                payload: None,
                meta: ActionMeta {
                    counter: 1,
                    debug_label: None,
                },
            },
        );
        assert_eq!(next.status, Status::Pending);
        assert_eq!(next.counter, 1);
    }
}
