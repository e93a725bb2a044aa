//! Tracker configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Special store marker meaning "ephemeral, not shared across processes"
pub const IN_MEMORY: &str = ":memory:";

const DEFAULT_STORE_PATH: &str = "./retrace.sqlite3";

/// Where the call log lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite file on disk, shared across sequential runs
    Path(PathBuf),
    /// Ephemeral in-memory store, gone when the process exits
    InMemory,
}

impl StoreLocation {
    /// Parse a raw location string, recognizing the in-memory marker
    pub fn parse(raw: &str) -> Self {
        if raw == IN_MEMORY {
            StoreLocation::InMemory
        } else {
            StoreLocation::Path(PathBuf::from(raw))
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self, StoreLocation::InMemory)
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Emit a human-readable trace of reuse/execute/diverge decisions
    pub verbose: bool,
    /// Where the call log lives
    pub store_location: StoreLocation,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            store_location: StoreLocation::Path(PathBuf::from(DEFAULT_STORE_PATH)),
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    /// Decision trace toggle
    verbose: Option<bool>,
    /// Store path or the ":memory:" marker
    store: Option<String>,
}

impl TrackerConfig {
    /// Load configuration from a TOML file, merging with defaults.
    /// A missing or unparsable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = TrackerConfig::default();

        if let Ok(contents) = fs::read_to_string(path) {
            if let Ok(toml_config) = toml::from_str::<TomlConfig>(&contents) {
                config.apply(toml_config);
            }
        }

        config
    }

    fn apply(&mut self, toml_config: TomlConfig) {
        if let Some(verbose) = toml_config.verbose {
            self.verbose = verbose;
        }
        if let Some(store) = toml_config.store {
            self.store_location = StoreLocation::parse(&store);
        }
    }

    /// Convenience for tests and throwaway runs
    pub fn in_memory() -> Self {
        TrackerConfig::default().with_store_location(StoreLocation::InMemory)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_store_location(mut self, location: StoreLocation) -> Self {
        self.store_location = location;
        self
    }
}
