//! Call tracking engine
//!
//! The engine numbers every tracked call, matches it against the record
//! stored at the same position, and either replays the stored result or
//! executes the real function and appends to the log. A mismatch
//! truncates all history from the diverging position forward.

mod engine;
mod matcher;
mod preview;

pub use engine::{CallError, TrackedFn, TrackedObject, TrackedObjectBuilder, Tracker};
pub use matcher::Decision;
