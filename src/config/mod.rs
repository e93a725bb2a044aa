mod settings;

pub use settings::{StoreLocation, TrackerConfig, IN_MEMORY};
