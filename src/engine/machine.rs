//! The execution engine.
//!
//! `AsyncEngine` owns the invocation counter, the cancellation scope and the
//! current snapshot. Each invocation gets the next counter value; a
//! settlement is applied only if its counter is still the current one when
//! it arrives, so the last invocation started always wins.

use super::abort::{AbortScope, AbortSignal};
use super::error::EngineError;
use super::guard::RestartGuard;
use super::options::{
    never_settle, promise_fn, AsyncOptions, CancelCallback, DeferFn, Listener, PromiseFn,
    RejectCallback, ResolveCallback, TrackedResult, WatchFn, WatchKey,
};
use super::spawn::Spawner;
use crate::checkpoint::Checkpoint;
use crate::core::{Action, ActionMeta, AsyncState, Snapshot, StartThunk};
use crate::devtools::{DevTools, StatusReport};
use crate::dispatch::{
    with_custom_reducer, with_external_dispatcher, wrap_dispatch, Dispatch, Dispatcher, ReduceFn,
};
use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tracing::{debug, trace};

/// Runs once the settlement it was queued with is committed.
type SettleHook<T, E> = Box<dyn FnOnce(&AsyncState<T, E>)>;

/// Outcome of one invocation as seen by the engine: `None` when the
/// invocation was dropped before its producer could report back.
type Outcome<T, E> = Shared<LocalBoxFuture<'static, Option<Result<T, E>>>>;

/// Engine-side handle on a started invocation.
type Settlement<T, E> = Option<(Outcome<T, E>, u64)>;

struct Inner<T, E, P, A> {
    props: RefCell<P>,
    promise: Option<TrackedResult<T, E>>,
    promise_fn: RefCell<Option<PromiseFn<T, E, P>>>,
    defer_fn: Option<DeferFn<T, E, P, A>>,
    has_initial_value: bool,
    watch: Option<WatchKey<P>>,
    watch_fn: Option<WatchFn<P>>,
    on_resolve: Option<ResolveCallback<T>>,
    on_reject: Option<RejectCallback<E>>,
    on_cancel: Option<CancelCallback>,
    reducer: ReduceFn<T, E>,
    dispatcher: Option<Rc<dyn Dispatcher<T, E, P>>>,
    debug_label: Option<String>,
    spawner: Rc<dyn Spawner>,
    abort: RefCell<Box<dyn AbortScope>>,
    restart_guard: RefCell<RestartGuard>,
    pipeline: Dispatch<T, E>,

    state: RefCell<Snapshot<T, E>>,
    counter: Cell<u64>,
    live: Cell<bool>,
    last_args: RefCell<Option<A>>,
    last_result: RefCell<TrackedResult<T, E>>,
    listeners: RefCell<Vec<(u64, Listener<T, E>)>>,
    next_listener: Cell<u64>,
    settle_hooks: RefCell<VecDeque<(u64, SettleHook<T, E>)>>,
    devtools: RefCell<Option<DevTools>>,
}

/// Controller for one asynchronous operation.
///
/// Cloning yields another handle to the same engine. All methods must be
/// called from the thread that owns it; spawned work goes through the
/// configured [`Spawner`] (a tokio `LocalSet` by default).
pub struct AsyncEngine<T, E, P = (), A = ()> {
    inner: Rc<Inner<T, E, P, A>>,
}

impl<T, E, P, A> Clone for AsyncEngine<T, E, P, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Handle returned by [`AsyncEngine::subscribe`].
///
/// Dropping it removes the listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl<T, E, P, A> AsyncEngine<T, E, P, A>
where
    T: Clone + 'static,
    E: Clone + 'static,
    P: Clone + 'static,
    A: Clone + 'static,
{
    /// Build an engine from options. Nothing runs until [`mount`](Self::mount),
    /// [`load`](Self::load) or [`run`](Self::run) is called.
    pub fn new(options: AsyncOptions<T, E, P, A>) -> Self {
        let state = Rc::new(AsyncState::init(
            options.initial_value.clone(),
            options.has_work(),
        ));
        let reducer = with_custom_reducer(options.reducer);

        let inner = Rc::new_cyclic(|weak: &Weak<Inner<T, E, P, A>>| {
            let weak = weak.clone();
            let pipeline = wrap_dispatch(move |action: Action<T, E>| {
                if let Some(inner) = weak.upgrade() {
                    AsyncEngine { inner }.commit(action);
                }
            });

            Inner {
                props: RefCell::new(options.props),
                promise: options.promise,
                promise_fn: RefCell::new(options.promise_fn),
                defer_fn: options.defer_fn,
                has_initial_value: options.initial_value.is_some(),
                watch: options.watch,
                watch_fn: options.watch_fn,
                on_resolve: options.on_resolve,
                on_reject: options.on_reject,
                on_cancel: options.on_cancel,
                reducer,
                dispatcher: options.dispatcher,
                debug_label: options.debug_label,
                spawner: options.spawner,
                abort: RefCell::new(options.abort),
                restart_guard: RefCell::new(RestartGuard::new(options.restart_guard)),
                pipeline,
                state: RefCell::new(state),
                counter: Cell::new(0),
                live: Cell::new(true),
                last_args: RefCell::new(None),
                last_result: RefCell::new(never_settle()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                settle_hooks: RefCell::new(VecDeque::new()),
                devtools: RefCell::new(None),
            }
        });

        Self { inner }
    }

    /// Current snapshot.
    pub fn state(&self) -> Snapshot<T, E> {
        Rc::clone(&self.inner.state.borrow())
    }

    /// Result of the latest invocation, or a never-settling placeholder
    /// when nothing is in flight.
    pub fn promise(&self) -> TrackedResult<T, E> {
        self.inner.last_result.borrow().clone()
    }

    /// Identity of the latest invocation.
    pub fn counter(&self) -> u64 {
        self.inner.counter.get()
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.get()
    }

    pub fn debug_label(&self) -> Option<&str> {
        self.inner.debug_label.as_deref()
    }

    pub fn props(&self) -> P {
        self.inner.props.borrow().clone()
    }

    /// Register a listener called synchronously after every committed
    /// transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot<T, E>) + 'static,
    {
        let id = self.add_listener(Rc::new(listener));
        let weak = Rc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.borrow_mut().retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    /// Initial load, as performed when the embedding component mounts.
    pub fn mount(&self) {
        if self.has_work() {
            self.load();
        }
    }

    /// Start one invocation of `producer`.
    ///
    /// The producer is not called here: it runs when the dispatch pipeline
    /// executes the start action's payload. A disposed engine never calls it
    /// and the returned result never settles.
    pub fn start<F>(&self, producer: F) -> TrackedResult<T, E>
    where
        F: FnOnce(AbortSignal) -> LocalBoxFuture<'static, Result<T, E>> + 'static,
    {
        self.begin(producer).0
    }

    /// Run the eager unit of work: `promise` if set, otherwise `promise_fn`.
    ///
    /// A seeded engine skips its very first load.
    pub fn load(&self) {
        let pre_initialized = self.inner.has_initial_value && self.inner.counter.get() == 0;

        if let Some(promise) = self.inner.promise.clone() {
            let (_, settlement) = self.begin(move |_| promise.boxed_local());
            self.settle(settlement);
        } else if !pre_initialized {
            let Some(promise_fn) = self.inner.promise_fn.borrow().clone() else {
                return;
            };
            let props = self.props();
            let (_, settlement) = self.begin(move |signal| promise_fn(&props, signal));
            self.settle(settlement);
        } else {
            trace!(label = ?self.inner.debug_label, "skipping load of pre-initialized state");
        }
    }

    /// Invoke the deferred producer with `args`.
    ///
    /// Returns `None` without doing anything when no deferred producer is
    /// configured.
    pub fn run(&self, args: A) -> Option<TrackedResult<T, E>> {
        let defer_fn = self.inner.defer_fn.clone()?;
        self.inner.last_args.replace(Some(args.clone()));

        let props = self.props();
        let (tracked, settlement) = self.begin(move |signal| defer_fn(args, &props, signal));
        self.settle(settlement);
        Some(tracked)
    }

    /// Replay the last `run` arguments, or `load` when `run` was never called.
    pub fn reload(&self) {
        let last_args = self.inner.last_args.borrow().clone();
        match last_args {
            Some(args) => {
                self.run(args);
            }
            None => self.load(),
        }
    }

    /// Abandon the active invocation.
    ///
    /// Its eventual settlement will be discarded. Safe to call repeatedly.
    pub fn cancel(&self) {
        if let Some(on_cancel) = self.inner.on_cancel.clone() {
            on_cancel();
        }

        let counter = self.inner.counter.get() + 1;
        self.inner.counter.set(counter);
        self.inner.abort.borrow().abort();
        self.inner.last_result.replace(never_settle());
        debug!(counter, label = ?self.inner.debug_label, "invocation cancelled");

        if self.inner.live.get() {
            self.dispatch(Action::Cancel {
                meta: self.meta(counter),
            });
        }
    }

    /// Inject a successful settlement directly.
    pub fn set_data(&self, data: T) {
        self.set_data_with(data, |_| {});
    }

    /// Inject a successful settlement and call `callback` with the committed
    /// data.
    ///
    /// Neither happens on a disposed engine. A dispatcher that delays the
    /// action delays the callback too; one that lets the settlement go stale
    /// drops it.
    pub fn set_data_with<F: FnOnce(&T) + 'static>(&self, data: T, callback: F) {
        if !self.inner.live.get() {
            return;
        }
        let counter = self.inner.counter.get();
        self.queue_hook(
            counter,
            Box::new(move |state: &AsyncState<T, E>| {
                if let Some(data) = &state.data {
                    callback(data);
                }
            }),
        );
        self.dispatch(Action::Fulfill {
            payload: data,
            meta: self.meta(counter),
        });
    }

    /// Inject a failed settlement directly.
    pub fn set_error(&self, error: E) {
        self.set_error_with(error, |_| {});
    }

    /// Inject a failed settlement and call `callback` with the committed
    /// error.
    pub fn set_error_with<F: FnOnce(&E) + 'static>(&self, error: E, callback: F) {
        if !self.inner.live.get() {
            return;
        }
        let counter = self.inner.counter.get();
        self.queue_hook(
            counter,
            Box::new(move |state: &AsyncState<T, E>| {
                if let Some(error) = &state.error {
                    callback(error);
                }
            }),
        );
        self.dispatch(Action::Reject {
            payload: error,
            meta: self.meta(counter),
        });
    }

    /// Settlement gate for fulfilled invocation `counter`.
    ///
    /// The returned closure drops the data if another invocation started
    /// since; otherwise it commits it and calls `on_resolve`.
    pub fn on_resolve(&self, counter: u64) -> impl FnOnce(T) + 'static {
        let weak = Rc::downgrade(&self.inner);
        move |data: T| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let engine = AsyncEngine { inner };
            let current = engine.inner.counter.get();
            if counter != current {
                debug!(counter, current, "discarding stale fulfillment");
                return;
            }
            let callback = engine.inner.on_resolve.clone();
            engine.set_data_with(data, move |data| {
                if let Some(callback) = callback {
                    callback(data);
                }
            });
        }
    }

    /// Settlement gate for rejected invocation `counter`.
    pub fn on_reject(&self, counter: u64) -> impl FnOnce(E) + 'static {
        let weak = Rc::downgrade(&self.inner);
        move |error: E| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let engine = AsyncEngine { inner };
            let current = engine.inner.counter.get();
            if counter != current {
                debug!(counter, current, "discarding stale rejection");
                return;
            }
            let callback = engine.inner.on_reject.clone();
            engine.set_error_with(error, move |error| {
                if let Some(callback) = callback {
                    callback(error);
                }
            });
        }
    }

    /// Accept new props, restarting when the watch key changed or `watch_fn`
    /// asks for it.
    ///
    /// A watch key change cancels the active invocation before loading.
    ///
    /// When the restart guard trips, the props are left unchanged so the same
    /// update can be retried later.
    pub fn update_props(&self, props: P) -> Result<(), EngineError> {
        let previous = self.props();
        let watch_changed = self
            .inner
            .watch
            .as_ref()
            .is_some_and(|key| key(&props) != key(&previous));
        let watch_fn_fired = self
            .inner
            .watch_fn
            .as_ref()
            .is_some_and(|watch_fn| watch_fn(&props, &previous));

        if !watch_changed && !watch_fn_fired {
            self.inner.props.replace(props);
            return Ok(());
        }

        self.inner.restart_guard.borrow_mut().record(Instant::now())?;
        self.inner.props.replace(props);
        if watch_changed && self.inner.counter.get() > 0 {
            self.cancel();
        }
        self.load();
        Ok(())
    }

    /// Swap the eager producer, which counts as a change of its identity:
    /// the active invocation is cancelled and the new producer loaded.
    pub fn replace_promise_fn<F, Fut>(&self, f: F) -> Result<(), EngineError>
    where
        F: Fn(&P, AbortSignal) -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        self.inner.restart_guard.borrow_mut().record(Instant::now())?;
        self.inner.promise_fn.replace(Some(promise_fn(f)));
        if self.inner.counter.get() > 0 {
            self.cancel();
        }
        self.load();
        Ok(())
    }

    /// Tear down: the engine stops dispatching and the active invocation is
    /// cancelled. Calling it again does nothing.
    pub fn dispose(&self) {
        if !self.inner.live.replace(false) {
            return;
        }
        self.cancel();
        if let Some(devtools) = self.inner.devtools.take() {
            devtools.unregister(self.debug_label().unwrap_or_default());
        }
        debug!(label = ?self.inner.debug_label, "engine disposed");
    }

    /// Capture the current snapshot for later hydration.
    pub fn checkpoint(&self) -> Checkpoint<T, E> {
        Checkpoint::capture(&self.state(), self.debug_label())
    }

    pub(crate) fn attach_devtools(&self, devtools: DevTools) {
        let label = self.debug_label().unwrap_or_default().to_string();
        devtools.register(&label, StatusReport::capture(&label, &self.state()));

        let tools = devtools.clone();
        let observed = label.clone();
        self.add_listener(Rc::new(move |snapshot: &Snapshot<T, E>| {
            tools.observe(&observed, StatusReport::capture(&observed, snapshot));
        }));
        self.inner.devtools.replace(Some(devtools));
    }

    fn has_work(&self) -> bool {
        self.inner.promise.is_some() || self.inner.promise_fn.borrow().is_some()
    }

    fn meta(&self, counter: u64) -> ActionMeta {
        ActionMeta {
            counter,
            debug_label: self.inner.debug_label.clone(),
        }
    }

    fn add_listener(&self, listener: Listener<T, E>) -> u64 {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    fn queue_hook(&self, counter: u64, hook: SettleHook<T, E>) {
        self.inner.settle_hooks.borrow_mut().push_back((counter, hook));
    }

    /// Start one invocation.
    ///
    /// Besides the public result, returns the engine-side outcome and counter
    /// of the invocation, or `None` when a disposed engine dropped it.
    fn begin<F>(&self, producer: F) -> (TrackedResult<T, E>, Settlement<T, E>)
    where
        F: FnOnce(AbortSignal) -> LocalBoxFuture<'static, Result<T, E>> + 'static,
    {
        let signal = self.inner.abort.borrow_mut().renew();
        let counter = self.inner.counter.get() + 1;
        self.inner.counter.set(counter);

        let (tx, rx) = oneshot::channel::<Result<T, E>>();
        let outcome: Outcome<T, E> = async move { rx.await.ok() }.boxed_local().shared();
        let tracked = {
            let outcome = outcome.clone();
            async move {
                match outcome.await {
                    Some(result) => result,
                    None => future::pending().await,
                }
            }
            .boxed_local()
            .shared()
        };
        self.inner.last_result.replace(tracked.clone());

        if !self.inner.live.get() {
            debug!(counter, "engine disposed; invocation dropped");
            return (tracked, None);
        }

        let spawner = Rc::clone(&self.inner.spawner);
        let work: StartThunk = Box::new(move || {
            let pending = producer(signal);
            spawner.spawn(
                async move {
                    let _ = tx.send(pending.await);
                }
                .boxed_local(),
            );
        });
        self.dispatch(Action::Start {
            payload: Some(work),
            meta: self.meta(counter),
        });

        (tracked, Some((outcome, counter)))
    }

    /// Route the outcome of invocation `counter` through the settlement gates.
    ///
    /// Finishes without effect when the start work is dropped unrun.
    fn settle(&self, settlement: Settlement<T, E>) {
        let Some((outcome, counter)) = settlement else {
            return;
        };
        let on_resolve = self.on_resolve(counter);
        let on_reject = self.on_reject(counter);
        self.inner.spawner.spawn(
            async move {
                match outcome.await {
                    Some(Ok(data)) => on_resolve(data),
                    Some(Err(error)) => on_reject(error),
                    None => debug!(counter, "start work dropped before it settled"),
                }
            }
            .boxed_local(),
        );
    }

    fn dispatch(&self, action: Action<T, E>) {
        let props = self.props();
        with_external_dispatcher(
            action,
            Rc::clone(&self.inner.pipeline),
            self.inner.dispatcher.as_deref(),
            &props,
        );
    }

    fn commit(&self, action: Action<T, E>) {
        let settlement = match &action {
            Action::Fulfill { meta, .. } | Action::Reject { meta, .. } => Some(meta.counter),
            _ => None,
        };
        if let Some(counter) = settlement {
            let current = self.inner.counter.get();
            if counter != current {
                debug!(
                    counter,
                    current,
                    action = %action.action_type(),
                    "dropping settlement that went stale in the dispatcher"
                );
                self.inner
                    .settle_hooks
                    .borrow_mut()
                    .retain(|(queued, _)| *queued >= current);
                return;
            }
        }

        let next = {
            let current = self.inner.state.borrow();
            (self.inner.reducer)(&*current, &action)
        };
        let previous = self.inner.state.replace(Rc::clone(&next));
        if Rc::ptr_eq(&previous, &next) {
            trace!(action = %action.action_type(), "action left state unchanged");
        } else {
            trace!(
                label = ?self.inner.debug_label,
                action = %action.action_type(),
                status = %next.status,
                counter = next.counter,
                "state committed"
            );

            let listeners: Vec<Listener<T, E>> = self
                .inner
                .listeners
                .borrow()
                .iter()
                .map(|(_, listener)| Rc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&next);
            }
        }

        if let Some(counter) = settlement {
            if let Some(hook) = self.next_hook(counter) {
                hook(&next);
            }
        }
    }

    /// Pop the hook queued for settlement `counter`, discarding older ones.
    fn next_hook(&self, counter: u64) -> Option<SettleHook<T, E>> {
        let mut hooks = self.inner.settle_hooks.borrow_mut();
        while hooks.front().is_some_and(|(queued, _)| *queued < counter) {
            hooks.pop_front();
        }
        if hooks.front().is_some_and(|(queued, _)| *queued == counter) {
            hooks.pop_front().map(|(_, hook)| hook)
        } else {
            None
        }
    }
}

impl<T, E, P, A> fmt::Debug for AsyncEngine<T, E, P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEngine")
            .field("debug_label", &self.inner.debug_label)
            .field("counter", &self.inner.counter.get())
            .field("live", &self.inner.live.get())
            .field("status", &self.inner.state.borrow().status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionType, Seed, Status};
    use crate::engine::abort::NoopAbort;
    use crate::engine::options::defer_fn;
    use tokio::task::LocalSet;

    type Reply = Result<String, String>;
    type Senders = Rc<RefCell<Vec<oneshot::Sender<Reply>>>>;

    async fn flush() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    /// Deferred producer whose settlements the test triggers by hand.
    fn manual(senders: &Senders) -> DeferFn<String, String, (), usize> {
        let senders = Rc::clone(senders);
        defer_fn(move |_args: usize, _props: &(), _signal: AbortSignal| {
            let (tx, rx) = oneshot::channel::<Reply>();
            senders.borrow_mut().push(tx);
            async move { rx.await.unwrap_or_else(|_| Err("dropped".to_string())) }
        })
    }

    fn deferred(senders: &Senders) -> AsyncEngine<String, String, (), usize> {
        AsyncEngine::new(AsyncOptions::<String, String>::new(()).with_defer_fn(manual(senders)))
    }

    fn reply(senders: &Senders, index: usize, value: Reply) {
        let tx = senders.borrow_mut().remove(index);
        tx.send(value).unwrap();
    }

    #[tokio::test]
    async fn stale_settlement_is_discarded() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let engine = deferred(&senders);

                engine.run(1);
                engine.run(2);
                assert_eq!(engine.counter(), 2);

                reply(&senders, 0, Ok("first".to_string()));
                flush().await;
                assert!(engine.state().is_pending());
                assert!(engine.state().data.is_none());

                reply(&senders, 0, Ok("second".to_string()));
                flush().await;
                assert_eq!(engine.state().data.as_deref(), Some("second"));
            })
            .await;
    }

    #[tokio::test]
    async fn rejection_becomes_state() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let engine = deferred(&senders);

                let tracked = engine.run(1).unwrap();
                reply(&senders, 0, Err("nope".to_string()));
                assert_eq!(tracked.await, Err("nope".to_string()));
                flush().await;

                let state = engine.state();
                assert!(state.is_rejected());
                assert_eq!(state.error.as_deref(), Some("nope"));
            })
            .await;
    }

    #[tokio::test]
    async fn run_without_deferred_producer_is_noop() {
        LocalSet::new()
            .run_until(async {
                let engine: AsyncEngine<String, String> = AsyncEngine::new(AsyncOptions::new(()));
                assert!(engine.run(()).is_none());
                engine.load();
                assert_eq!(engine.counter(), 0);
                assert!(engine.state().is_initial());
            })
            .await;
    }

    #[tokio::test]
    async fn reload_replays_last_arguments() {
        LocalSet::new()
            .run_until(async {
                let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
                let record = Rc::clone(&seen);
                let options = AsyncOptions::<usize, String>::new(()).with_defer_fn(defer_fn(
                    move |args: usize, _props: &(), _signal: AbortSignal| {
                        record.borrow_mut().push(args);
                        async move { Ok(args * 10) }
                    },
                ));
                let engine = AsyncEngine::new(options);

                engine.run(4);
                engine.reload();
                flush().await;

                assert_eq!(*seen.borrow(), vec![4, 4]);
                assert_eq!(engine.state().data, Some(40));
            })
            .await;
    }

    #[tokio::test]
    async fn cancel_aborts_signal_and_discards_result() {
        LocalSet::new()
            .run_until(async {
                let signals: Rc<RefCell<Vec<AbortSignal>>> = Rc::default();
                let keep = Rc::clone(&signals);
                let (tx, rx) = oneshot::channel::<Reply>();
                let rx = RefCell::new(Some(rx));
                let options = AsyncOptions::<String, String>::new(()).with_defer_fn(defer_fn(
                    move |_args: (), _props: &(), signal: AbortSignal| {
                        keep.borrow_mut().push(signal);
                        let rx = rx.borrow_mut().take();
                        async move {
                            match rx {
                                Some(rx) => rx.await.unwrap_or_else(|_| Err("dropped".into())),
                                None => Err("no receiver".to_string()),
                            }
                        }
                    },
                ));
                let engine = AsyncEngine::new(options);

                engine.run(());
                engine.cancel();
                assert!(signals.borrow()[0].is_aborted());
                assert!(engine.state().is_initial());

                tx.send(Ok("late".to_string())).unwrap();
                flush().await;
                assert!(engine.state().is_initial());
                assert!(engine.state().data.is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn noop_abort_still_discards_result() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let mut options =
                    AsyncOptions::<String, String>::new(()).with_defer_fn(manual(&senders));
                options.abort = Box::new(NoopAbort);
                let engine = AsyncEngine::new(options);

                engine.run(1);
                engine.cancel();
                reply(&senders, 0, Ok("late".to_string()));
                flush().await;
                assert!(engine.state().is_initial());
            })
            .await;
    }

    #[tokio::test]
    async fn disposed_engine_never_invokes_producer() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let engine = deferred(&senders);
                engine.dispose();
                engine.dispose();

                let before = engine.state();
                engine.run(1);
                engine.set_data("ignored".to_string());
                flush().await;

                assert!(senders.borrow().is_empty());
                assert!(Rc::ptr_eq(&before, &engine.state()));
                assert!(!engine.is_live());
            })
            .await;
    }

    #[tokio::test]
    async fn dispose_mid_flight_suppresses_settlement() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let engine = deferred(&senders);

                engine.run(1);
                engine.dispose();
                reply(&senders, 0, Ok("late".to_string()));
                flush().await;

                assert!(engine.state().is_pending());
                assert!(engine.state().data.is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn seeded_engine_skips_first_load() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let counted = Rc::clone(&calls);
                let mut options = AsyncOptions::<String, String>::new(());
                options.initial_value = Some(Seed::Data("hydrated".to_string()));
                options.promise_fn = Some(promise_fn(move |_props: &(), _signal: AbortSignal| {
                    counted.set(counted.get() + 1);
                    async { Ok("fresh".to_string()) }
                }));
                let engine = AsyncEngine::new(options);

                engine.mount();
                flush().await;
                assert_eq!(calls.get(), 0);
                assert!(engine.state().is_fulfilled());

                engine.cancel();
                engine.load();
                flush().await;
                assert_eq!(calls.get(), 1);
                assert_eq!(engine.state().data.as_deref(), Some("fresh"));
            })
            .await;
    }

    #[tokio::test]
    async fn ready_made_promise_wins_over_promise_fn() {
        LocalSet::new()
            .run_until(async {
                let mut options = AsyncOptions::<String, String>::new(());
                options.promise = Some(crate::engine::options::tracked(async {
                    Ok("from promise".to_string())
                }));
                options.promise_fn = Some(promise_fn(|_props: &(), _signal: AbortSignal| async {
                    Ok("from fn".to_string())
                }));
                let engine = AsyncEngine::new(options);

                engine.mount();
                flush().await;
                assert_eq!(engine.state().data.as_deref(), Some("from promise"));
            })
            .await;
    }

    #[tokio::test]
    async fn listeners_see_every_transition_until_unsubscribed() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let engine = deferred(&senders);
                let statuses: Rc<RefCell<Vec<Status>>> = Rc::default();
                let log = Rc::clone(&statuses);
                let subscription = engine.subscribe(move |state| log.borrow_mut().push(state.status));

                engine.run(1);
                reply(&senders, 0, Ok("a".to_string()));
                flush().await;
                subscription.unsubscribe();
                engine.run(2);

                assert_eq!(*statuses.borrow(), vec![Status::Pending, Status::Fulfilled]);
            })
            .await;
    }

    #[tokio::test]
    async fn settlement_callbacks_fire_for_current_invocation() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let resolved: Rc<RefCell<Vec<String>>> = Rc::default();
                let cancelled = Rc::new(Cell::new(0));
                let sink = Rc::clone(&resolved);
                let tally = Rc::clone(&cancelled);
                let mut options =
                    AsyncOptions::<String, String>::new(()).with_defer_fn(manual(&senders));
                options.on_resolve = Some(Rc::new(move |data: &String| {
                    sink.borrow_mut().push(data.clone())
                }));
                options.on_cancel = Some(Rc::new(move || tally.set(tally.get() + 1)));
                let engine = AsyncEngine::new(options);

                engine.run(1);
                engine.run(2);
                reply(&senders, 0, Ok("stale".to_string()));
                reply(&senders, 0, Ok("fresh".to_string()));
                flush().await;
                engine.cancel();

                assert_eq!(*resolved.borrow(), vec!["fresh".to_string()]);
                assert_eq!(cancelled.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn watch_change_restarts_and_guard_trips() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let counted = Rc::clone(&calls);
                let mut options = AsyncOptions::<u32, String, u32>::new(1);
                options.promise_fn = Some(promise_fn(move |props: &u32, _signal: AbortSignal| {
                    counted.set(counted.get() + 1);
                    let value = *props;
                    async move { Ok(value) }
                }));
                options.watch = Some(Rc::new(|props: &u32| serde_json::json!(props)));
                options.restart_guard = crate::engine::RestartGuardConfig {
                    limit: 2,
                    window: std::time::Duration::from_secs(60),
                };
                let engine = AsyncEngine::new(options);

                engine.mount();
                flush().await;
                assert_eq!(engine.state().data, Some(1));

                engine.update_props(1).unwrap();
                assert_eq!(calls.get(), 1);

                engine.update_props(2).unwrap();
                flush().await;
                assert_eq!(engine.state().data, Some(2));

                engine.update_props(3).unwrap();
                let err = engine.update_props(4).unwrap_err();
                assert!(matches!(err, EngineError::RunawayRestarts { restarts: 3, .. }));
                assert_eq!(calls.get(), 3);
            })
            .await;
    }

    #[tokio::test]
    async fn watch_fn_triggers_reload() {
        LocalSet::new()
            .run_until(async {
                let mut options = AsyncOptions::<u32, String, u32>::new(1);
                options.promise_fn = Some(promise_fn(|props: &u32, _signal: AbortSignal| {
                    let value = *props * 2;
                    async move { Ok(value) }
                }));
                options.watch_fn = Some(Rc::new(|current: &u32, previous: &u32| current > previous));
                let engine = AsyncEngine::new(options);

                engine.mount();
                flush().await;
                engine.update_props(0).unwrap();
                flush().await;
                assert_eq!(engine.state().data, Some(2));

                engine.update_props(5).unwrap();
                flush().await;
                assert_eq!(engine.state().data, Some(10));
            })
            .await;
    }

    #[tokio::test]
    async fn replace_promise_fn_cancels_and_loads() {
        LocalSet::new()
            .run_until(async {
                let mut options = AsyncOptions::<String, String>::new(());
                options.promise_fn = Some(promise_fn(|_props: &(), _signal: AbortSignal| {
                    futures::future::pending::<Result<String, String>>()
                }));
                let engine = AsyncEngine::new(options);

                engine.mount();
                assert_eq!(engine.counter(), 1);
                engine
                    .replace_promise_fn(|_props: &(), _signal: AbortSignal| async {
                        Ok::<_, String>("replaced".to_string())
                    })
                    .unwrap();
                flush().await;

                assert_eq!(engine.counter(), 3);
                assert_eq!(engine.state().data.as_deref(), Some("replaced"));
            })
            .await;
    }

    #[tokio::test]
    async fn optimistic_updates_bypass_producers() {
        LocalSet::new()
            .run_until(async {
                let engine: AsyncEngine<String, String> = AsyncEngine::new(AsyncOptions::new(()));
                let confirmed = Rc::new(Cell::new(false));
                let flag = Rc::clone(&confirmed);

                engine.set_data_with("optimistic".to_string(), move |_| flag.set(true));
                assert!(confirmed.get());
                assert!(engine.state().is_fulfilled());

                engine.set_error("rolled back".to_string());
                let state = engine.state();
                assert!(state.is_rejected());
                assert_eq!(state.data.as_deref(), Some("optimistic"));
            })
            .await;
    }

    /// Spawner that counts tasks still running.
    #[derive(Clone, Default)]
    struct CountingSpawner {
        alive: Rc<Cell<usize>>,
    }

    impl Spawner for CountingSpawner {
        fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
            let alive = Rc::clone(&self.alive);
            alive.set(alive.get() + 1);
            tokio::task::spawn_local(async move {
                task.await;
                alive.set(alive.get() - 1);
            });
        }
    }

    #[tokio::test]
    async fn disposed_engine_leaves_no_tasks_behind() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let spawner = CountingSpawner::default();
                let mut options =
                    AsyncOptions::<String, String>::new(()).with_defer_fn(manual(&senders));
                options.spawner = Rc::new(spawner.clone());
                let engine = AsyncEngine::new(options);

                engine.dispose();
                for index in 0..100 {
                    engine.run(index);
                }
                flush().await;

                assert_eq!(spawner.alive.get(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn dropped_start_work_ends_its_settlement_task() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let spawner = CountingSpawner::default();
                let mut options =
                    AsyncOptions::<String, String>::new(()).with_defer_fn(manual(&senders));
                options.spawner = Rc::new(spawner.clone());
                options.dispatcher = Some(Rc::new(
                    |mut action: Action<String, String>, inner: Dispatch<String, String>, _: &()| {
                        drop(action.take_start_payload());
                        inner(action);
                    },
                ));
                let engine = AsyncEngine::new(options);

                engine.run(1);
                engine.run(2);
                flush().await;

                assert!(senders.borrow().is_empty());
                assert_eq!(spawner.alive.get(), 0);
                assert!(engine.state().is_pending());
            })
            .await;
    }

    #[tokio::test]
    async fn settlement_delayed_past_a_new_start_is_dropped() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let held: Rc<RefCell<Vec<(Action<String, String>, Dispatch<String, String>)>>> =
                    Rc::default();
                let hold = Rc::clone(&held);
                let resolved: Rc<RefCell<Vec<String>>> = Rc::default();
                let sink = Rc::clone(&resolved);

                let mut options =
                    AsyncOptions::<String, String>::new(()).with_defer_fn(manual(&senders));
                options.dispatcher = Some(Rc::new(
                    move |action: Action<String, String>, inner: Dispatch<String, String>, _: &()| {
                        match action.action_type() {
                            ActionType::Fulfill => {
                                hold.borrow_mut().push((action, inner))
                            }
                            _ => inner(action),
                        }
                    },
                ));
                options.on_resolve = Some(Rc::new(move |data: &String| {
                    sink.borrow_mut().push(data.clone())
                }));
                let engine = AsyncEngine::new(options);

                engine.run(1);
                reply(&senders, 0, Ok("first".to_string()));
                flush().await;
                assert_eq!(held.borrow().len(), 1);

                engine.run(2);
                let (action, inner) = held.borrow_mut().remove(0);
                inner(action);

                let state = engine.state();
                assert!(state.is_pending());
                assert_eq!(state.counter, 2);
                assert!(state.data.is_none());
                assert!(resolved.borrow().is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn resolve_callback_waits_for_delayed_commit() {
        LocalSet::new()
            .run_until(async {
                let senders: Senders = Rc::default();
                let held: Rc<RefCell<Vec<(Action<String, String>, Dispatch<String, String>)>>> =
                    Rc::default();
                let hold = Rc::clone(&held);
                let resolved: Rc<RefCell<Vec<String>>> = Rc::default();
                let sink = Rc::clone(&resolved);

                let mut options =
                    AsyncOptions::<String, String>::new(()).with_defer_fn(manual(&senders));
                options.dispatcher = Some(Rc::new(
                    move |action: Action<String, String>, inner: Dispatch<String, String>, _: &()| {
                        match action.action_type() {
                            ActionType::Fulfill => {
                                hold.borrow_mut().push((action, inner))
                            }
                            _ => inner(action),
                        }
                    },
                ));
                options.on_resolve = Some(Rc::new(move |data: &String| {
                    sink.borrow_mut().push(data.clone())
                }));
                let engine = AsyncEngine::new(options);

                engine.run(1);
                reply(&senders, 0, Ok("value".to_string()));
                flush().await;
                assert!(resolved.borrow().is_empty());

                let (action, inner) = held.borrow_mut().remove(0);
                inner(action);
                assert_eq!(*resolved.borrow(), vec!["value".to_string()]);
                assert_eq!(engine.state().data.as_deref(), Some("value"));
            })
            .await;
    }

    #[tokio::test]
    async fn tripped_guard_keeps_previous_props() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let counted = Rc::clone(&calls);
                let mut options = AsyncOptions::<u32, String, u32>::new(0);
                options.promise_fn = Some(promise_fn(move |props: &u32, _signal: AbortSignal| {
                    counted.set(counted.get() + 1);
                    let value = *props;
                    async move { Ok(value) }
                }));
                options.watch = Some(Rc::new(|props: &u32| serde_json::json!(props)));
                options.restart_guard = crate::engine::RestartGuardConfig {
                    limit: 1,
                    window: std::time::Duration::from_millis(20),
                };
                let engine = AsyncEngine::new(options);

                engine.mount();
                engine.update_props(1).unwrap();
                flush().await;
                assert_eq!(engine.state().data, Some(1));

                assert!(engine.update_props(2).is_err());
                assert_eq!(engine.props(), 1);

                tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                engine.update_props(2).unwrap();
                flush().await;

                assert_eq!(engine.props(), 2);
                assert_eq!(engine.state().data, Some(2));
                assert_eq!(calls.get(), 3);
            })
            .await;
    }
}
