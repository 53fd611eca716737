//! Execution engine.
//!
//! The imperative shell around the pure reducer: it starts producers,
//! tracks which invocation is current, gates settlements and drives
//! cancellation.

pub mod abort;
pub mod error;
pub mod guard;
pub mod machine;
pub mod options;
pub mod spawn;

pub use abort::{AbortController, AbortScope, AbortSignal, NativeAbort, NoopAbort};
pub use error::EngineError;
pub use guard::{RestartGuard, RestartGuardConfig};
pub use machine::{AsyncEngine, Subscription};
pub use options::{
    defer_fn, never_settle, promise_fn, tracked, AsyncOptions, DeferFn, Listener, PromiseFn,
    TrackedResult, WatchFn, WatchKey,
};
pub use spawn::{LocalSpawner, Spawner};
