//! Construction options for the engine.

use super::abort::{AbortScope, AbortSignal, NativeAbort};
use super::guard::RestartGuardConfig;
use super::spawn::{LocalSpawner, Spawner};
use crate::core::{Seed, Snapshot};
use crate::dispatch::{CustomReducer, Dispatcher};
use futures::future::{self, LocalBoxFuture, Shared};
use futures::FutureExt;
use std::future::Future;
use std::rc::Rc;

/// Awaitable result of one invocation.
///
/// Cloneable so any number of dependents can await it.
pub type TrackedResult<T, E> = Shared<LocalBoxFuture<'static, Result<T, E>>>;

/// Eager producer: `(props, signal)`.
pub type PromiseFn<T, E, P> = Rc<dyn Fn(&P, AbortSignal) -> LocalBoxFuture<'static, Result<T, E>>>;

/// Deferred producer: `(args, props, signal)`.
pub type DeferFn<T, E, P, A> =
    Rc<dyn Fn(A, &P, AbortSignal) -> LocalBoxFuture<'static, Result<T, E>>>;

/// Extracts the opaque watch key from props.
pub type WatchKey<P> = Rc<dyn Fn(&P) -> serde_json::Value>;

/// `(current, previous) -> reload?`
pub type WatchFn<P> = Rc<dyn Fn(&P, &P) -> bool>;

pub type ResolveCallback<T> = Rc<dyn Fn(&T)>;
pub type RejectCallback<E> = Rc<dyn Fn(&E)>;
pub type CancelCallback = Rc<dyn Fn()>;

/// Subscriber notified after each committed transition.
pub type Listener<T, E> = Rc<dyn Fn(&Snapshot<T, E>)>;

/// Everything an engine is built from.
///
/// Usually assembled through [`AsyncBuilder`](crate::builder::AsyncBuilder).
pub struct AsyncOptions<T, E, P = (), A = ()> {
    /// Context handed to producers
    pub props: P,
    /// Ready-made awaitable; wins over `promise_fn`
    pub promise: Option<TrackedResult<T, E>>,
    pub promise_fn: Option<PromiseFn<T, E, P>>,
    pub defer_fn: Option<DeferFn<T, E, P, A>>,
    pub initial_value: Option<Seed<T, E>>,
    pub watch: Option<WatchKey<P>>,
    pub watch_fn: Option<WatchFn<P>>,
    pub on_resolve: Option<ResolveCallback<T>>,
    pub on_reject: Option<RejectCallback<E>>,
    pub on_cancel: Option<CancelCallback>,
    pub reducer: Option<CustomReducer<T, E>>,
    pub dispatcher: Option<Rc<dyn Dispatcher<T, E, P>>>,
    pub debug_label: Option<String>,
    pub spawner: Rc<dyn Spawner>,
    pub abort: Box<dyn AbortScope>,
    pub restart_guard: RestartGuardConfig,
}

impl<T, E, P, A> AsyncOptions<T, E, P, A> {
    /// Options with nothing configured but the props.
    pub fn new(props: P) -> Self {
        Self {
            props,
            promise: None,
            promise_fn: None,
            defer_fn: None,
            initial_value: None,
            watch: None,
            watch_fn: None,
            on_resolve: None,
            on_reject: None,
            on_cancel: None,
            reducer: None,
            dispatcher: None,
            debug_label: None,
            spawner: Rc::new(LocalSpawner),
            abort: Box::new(NativeAbort::new()),
            restart_guard: RestartGuardConfig::default(),
        }
    }

    /// Whether `load` has anything to run.
    pub fn has_work(&self) -> bool {
        self.promise.is_some() || self.promise_fn.is_some()
    }

    /// Swap the deferred producer, changing the argument type.
    pub fn with_defer_fn<A2>(self, defer_fn: DeferFn<T, E, P, A2>) -> AsyncOptions<T, E, P, A2> {
        AsyncOptions {
            props: self.props,
            promise: self.promise,
            promise_fn: self.promise_fn,
            defer_fn: Some(defer_fn),
            initial_value: self.initial_value,
            watch: self.watch,
            watch_fn: self.watch_fn,
            on_resolve: self.on_resolve,
            on_reject: self.on_reject,
            on_cancel: self.on_cancel,
            reducer: self.reducer,
            dispatcher: self.dispatcher,
            debug_label: self.debug_label,
            spawner: self.spawner,
            abort: self.abort,
            restart_guard: self.restart_guard,
        }
    }
}

impl<T, E, P: Default, A> Default for AsyncOptions<T, E, P, A> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

/// Box a closure into a [`PromiseFn`].
pub fn promise_fn<T, E, P, F, Fut>(f: F) -> PromiseFn<T, E, P>
where
    T: 'static,
    E: 'static,
    P: 'static,
    F: Fn(&P, AbortSignal) -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    Rc::new(move |props: &P, signal: AbortSignal| f(props, signal).boxed_local())
}

/// Box a closure into a [`DeferFn`].
pub fn defer_fn<T, E, P, A, F, Fut>(f: F) -> DeferFn<T, E, P, A>
where
    T: 'static,
    E: 'static,
    P: 'static,
    A: 'static,
    F: Fn(A, &P, AbortSignal) -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    Rc::new(move |args: A, props: &P, signal: AbortSignal| f(args, props, signal).boxed_local())
}

/// Turn any future into a [`TrackedResult`].
pub fn tracked<T, E, Fut>(fut: Fut) -> TrackedResult<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    fut.boxed_local().shared()
}

/// Placeholder result for an idle engine; awaiting it never completes.
pub fn never_settle<T, E>() -> TrackedResult<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    future::pending().boxed_local().shared()
}
