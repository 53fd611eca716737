//! Builder API for engine construction.
//!
//! Options are checked as a whole when [`AsyncBuilder::build`] is called, so
//! one failed build reports every problem at once.

pub mod error;
pub mod machine;

pub use error::{BuildError, OptionViolation};
pub use machine::AsyncBuilder;
