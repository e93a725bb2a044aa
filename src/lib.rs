pub mod config;
pub mod store;
pub mod tracker;
pub mod value;

pub use config::{StoreLocation, TrackerConfig, IN_MEMORY};
pub use store::{CallLog, CallRecord, Database, StoreError};
pub use tracker::{
    CallError, Decision, TrackedFn, TrackedObject, TrackedObjectBuilder, Tracker,
};
pub use value::{opaque, Arg, SerializationError, Value};
