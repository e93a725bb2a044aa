//! Data model for recorded calls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded call: a single position in the tracked sequence.
///
/// `args` and `result` hold the canonical encoded text produced by the
/// value codec, not live values. `recorded_at` is diagnostics only and
/// never takes part in matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    /// Position of the call in the tracked sequence (zero-based)
    pub call_number: u64,
    /// Caller-supplied name of the wrapped function
    pub function_name: String,
    /// Encoded argument list (ordered JSON array, opaque-unwrapped)
    pub args: String,
    /// Encoded result (opaque fields stored as sentinels)
    pub result: String,
    /// When the record was written
    pub recorded_at: DateTime<Utc>,
}

impl CallRecord {
    /// Create a record stamped with the current time
    pub fn new(
        call_number: u64,
        function_name: impl Into<String>,
        args: String,
        result: String,
    ) -> Self {
        Self {
            call_number,
            function_name: function_name.into(),
            args,
            result,
            recorded_at: Utc::now(),
        }
    }
}
