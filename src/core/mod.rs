//! Core state machine types and logic.
//!
//! This module contains the pure functional core:
//! - The four-state status model and its flags
//! - Immutable snapshots
//! - Actions and the reducer that applies them
//!
//! Nothing in this module performs I/O, spawns work, or keeps mutable
//! state; the engine owns all of that.

mod action;
mod reducer;
mod state;
mod status;

pub use action::{Action, ActionMeta, ActionType, StartThunk};
pub use reducer::reduce;
pub use state::{AsyncState, Seed, Snapshot};
pub use status::{classify_idle, classify_initial, derive_flags, Status, StatusFlags};
