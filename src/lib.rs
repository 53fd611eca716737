//! async-state: a state machine for asynchronous operations
//!
//! The crate follows a "pure core, imperative shell" split. The core is an
//! immutable snapshot and a pure reducer; the shell is an engine that runs
//! producers, decides which invocation is current and feeds settlements back
//! through the reducer.
//!
//! # Core Concepts
//!
//! - **Status**: one of initial, pending, fulfilled or rejected, with the
//!   boolean flags derived from it
//! - **Reducer**: the pure transition function over actions
//! - **Engine**: run/load/reload/cancel with last-start-wins settlement
//! - **Dispatch**: an interception pipeline between actions and the reducer
//!
//! # Example
//!
//! ```rust
//! use async_state::core::{Action, ActionMeta, AsyncState, Status, reduce};
//! use std::rc::Rc;
//!
//! let state = Rc::new(AsyncState::<String, String>::init(None, false));
//! let started = reduce(&state, &Action::Start {
//!     payload: None,
//!     meta: ActionMeta { counter: 1, debug_label: None },
//! });
//! let done = reduce(&started, &Action::Fulfill {
//!     payload: "ok".to_string(),
//!     meta: ActionMeta { counter: 1, debug_label: None },
//! });
//!
//! assert_eq!(started.status, Status::Pending);
//! assert_eq!(done.data.as_deref(), Some("ok"));
//! ```
//!
//! Engines need a tokio `LocalSet` to spawn their work:
//!
//! ```rust
//! use async_state::engine::{AbortSignal, AsyncEngine};
//! use tokio::task::LocalSet;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! LocalSet::new()
//!     .run_until(async {
//!         let engine = AsyncEngine::<u32, String>::builder()
//!             .defer_fn(|n: u32, _props: &(), _signal: AbortSignal| async move { Ok(n * 2) })
//!             .build()
//!             .unwrap();
//!
//!         let result = engine.run(21).unwrap();
//!         assert_eq!(result.await, Ok(42));
//!     })
//!     .await;
//! # }
//! ```

pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod devtools;
pub mod dispatch;
pub mod engine;

// Re-export commonly used types
pub use builder::{AsyncBuilder, BuildError};
pub use checkpoint::{Checkpoint, CheckpointError, Encoding};
pub use crate::core::{Action, ActionType, AsyncState, Seed, Snapshot, Status, StatusFlags};
pub use devtools::{DevTools, DevToolsConfig};
pub use dispatch::Dispatcher;
pub use engine::{AbortSignal, AsyncEngine, EngineError, Subscription};
