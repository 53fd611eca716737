//! Builder for constructing engines.

use crate::builder::error::{BuildError, OptionViolation};
use crate::checkpoint::Checkpoint;
use crate::core::{Action, Seed, Snapshot};
use crate::devtools::DevTools;
use crate::dispatch::Dispatcher;
use crate::engine::{
    defer_fn, promise_fn, tracked, AbortScope, AbortSignal, AsyncEngine, AsyncOptions,
    RestartGuardConfig, Spawner,
};
use serde::Serialize;
use std::future::Future;
use std::rc::Rc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use uuid::Uuid;

/// Fluent builder for [`AsyncEngine`].
///
/// # Example
///
/// ```rust
/// use async_state::builder::AsyncBuilder;
/// use async_state::engine::AbortSignal;
///
/// let engine = AsyncBuilder::<String, String>::new(())
///     .promise_fn(|_props: &(), _signal: AbortSignal| async { Ok("hello".to_string()) })
///     .debug_label("greeting")
///     .build()
///     .unwrap();
///
/// assert!(engine.state().is_pending());
/// assert_eq!(engine.debug_label(), Some("greeting"));
/// ```
pub struct AsyncBuilder<T, E, P = (), A = ()> {
    options: AsyncOptions<T, E, P, A>,
    devtools: Option<DevTools>,
}

impl<T, E, P> AsyncBuilder<T, E, P, ()>
where
    T: Clone + 'static,
    E: Clone + 'static,
    P: Clone + 'static,
{
    /// Create a builder around `props`.
    pub fn new(props: P) -> Self {
        Self {
            options: AsyncOptions::new(props),
            devtools: None,
        }
    }
}

impl<T, E, P, A> AsyncBuilder<T, E, P, A>
where
    T: Clone + 'static,
    E: Clone + 'static,
    P: Clone + 'static,
    A: Clone + 'static,
{
    /// Track a ready-made future. Takes precedence over `promise_fn`.
    pub fn promise<Fut>(mut self, fut: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        self.options.promise = Some(tracked(fut));
        self
    }

    /// Set the eager producer, run on mount and on watched changes.
    pub fn promise_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&P, AbortSignal) -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        self.options.promise_fn = Some(promise_fn(f));
        self
    }

    /// Set the deferred producer, run only through [`AsyncEngine::run`].
    pub fn defer_fn<A2, F, Fut>(self, f: F) -> AsyncBuilder<T, E, P, A2>
    where
        A2: Clone + 'static,
        F: Fn(A2, &P, AbortSignal) -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        AsyncBuilder {
            options: self.options.with_defer_fn(defer_fn(f)),
            devtools: self.devtools,
        }
    }

    /// Seed the first snapshot. A seeded engine skips its first load.
    pub fn initial_value(mut self, seed: Seed<T, E>) -> Self {
        self.options.initial_value = Some(seed);
        self
    }

    /// Seed from a stored checkpoint.
    pub fn hydrate(mut self, checkpoint: &Checkpoint<T, E>) -> Self {
        self.options.initial_value = checkpoint.seed();
        self
    }

    /// Reload whenever the key extracted from props changes.
    ///
    /// Keys are compared by their JSON form.
    pub fn watch<K, F>(mut self, key: F) -> Self
    where
        K: Serialize,
        F: Fn(&P) -> K + 'static,
    {
        self.options.watch = Some(Rc::new(move |props: &P| {
            serde_json::to_value(key(props)).unwrap_or_default()
        }));
        self
    }

    /// Reload whenever `f(current, previous)` returns true.
    pub fn watch_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&P, &P) -> bool + 'static,
    {
        self.options.watch_fn = Some(Rc::new(f));
        self
    }

    pub fn on_resolve<F: Fn(&T) + 'static>(mut self, f: F) -> Self {
        self.options.on_resolve = Some(Rc::new(f));
        self
    }

    pub fn on_reject<F: Fn(&E) + 'static>(mut self, f: F) -> Self {
        self.options.on_reject = Some(Rc::new(f));
        self
    }

    pub fn on_cancel<F: Fn() + 'static>(mut self, f: F) -> Self {
        self.options.on_cancel = Some(Rc::new(f));
        self
    }

    /// Wrap the base reducer. `f` receives the base reducer as its third
    /// argument.
    pub fn reducer<F>(mut self, f: F) -> Self
    where
        F: Fn(
                &Snapshot<T, E>,
                &Action<T, E>,
                &dyn Fn(&Snapshot<T, E>, &Action<T, E>) -> Snapshot<T, E>,
            ) -> Snapshot<T, E>
            + 'static,
    {
        self.options.reducer = Some(Rc::new(f));
        self
    }

    /// Route every action through `dispatcher` before it is committed.
    pub fn dispatcher<D>(mut self, dispatcher: D) -> Self
    where
        D: Dispatcher<T, E, P> + 'static,
    {
        self.options.dispatcher = Some(Rc::new(dispatcher));
        self
    }

    /// Attach devtools; they act as the dispatcher and register the engine.
    pub fn devtools(mut self, devtools: DevTools) -> Self {
        self.devtools = Some(devtools);
        self
    }

    pub fn debug_label(mut self, label: impl Into<String>) -> Self {
        self.options.debug_label = Some(label.into());
        self
    }

    pub fn spawner<S: Spawner + 'static>(mut self, spawner: S) -> Self {
        self.options.spawner = Rc::new(spawner);
        self
    }

    /// Replace the cancellation scope, e.g. with
    /// [`NoopAbort`](crate::engine::NoopAbort) on hosts without cancellation.
    pub fn abort<S: AbortScope + 'static>(mut self, scope: S) -> Self {
        self.options.abort = Box::new(scope);
        self
    }

    pub fn restart_guard(mut self, config: RestartGuardConfig) -> Self {
        self.options.restart_guard = config;
        self
    }

    /// Check every option, accumulating ALL violations.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<OptionViolation>> {
        let guard = self.options.restart_guard;
        let checks: Vec<Validation<(), NonEmptyVec<OptionViolation>>> = vec![
            if guard.limit == 0 {
                Validation::fail(OptionViolation::ZeroRestartLimit)
            } else {
                Validation::success(())
            },
            if guard.window.is_zero() {
                Validation::fail(OptionViolation::ZeroRestartWindow(guard.window))
            } else {
                Validation::success(())
            },
            match &self.options.debug_label {
                Some(label) if label.trim().is_empty() => {
                    Validation::fail(OptionViolation::BlankDebugLabel)
                }
                _ => Validation::success(()),
            },
            if self.devtools.is_some() && self.options.dispatcher.is_some() {
                Validation::fail(OptionViolation::DispatcherConflict)
            } else {
                Validation::success(())
            },
        ];

        Validation::all_vec(checks).map(|_| ())
    }

    /// Build the engine. Nothing runs until it is mounted or run.
    pub fn build(self) -> Result<AsyncEngine<T, E, P, A>, BuildError> {
        if let Validation::Failure(errors) = self.validate() {
            return Err(BuildError::Invalid(errors.iter().cloned().collect()));
        }

        let mut options = self.options;
        let Some(devtools) = self.devtools else {
            return Ok(AsyncEngine::new(options));
        };

        if options.debug_label.is_none() {
            options.debug_label = Some(format!("anonymous-{}", Uuid::new_v4()));
        }
        options.dispatcher = Some(Rc::new(devtools.clone()));

        let engine = AsyncEngine::new(options);
        engine.attach_devtools(devtools);
        Ok(engine)
    }
}

impl<T, E> AsyncEngine<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Start building an engine without props.
    pub fn builder() -> AsyncBuilder<T, E> {
        AsyncBuilder::new(())
    }

    /// Engine running `f` on mount, with every other option defaulted.
    pub fn from_promise_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(&(), AbortSignal) -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        let mut options = AsyncOptions::new(());
        options.promise_fn = Some(promise_fn(f));
        AsyncEngine::new(options)
    }
}
