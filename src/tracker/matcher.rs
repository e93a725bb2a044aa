//! History matching
//!
//! Decides what an instrumented call should do given the record stored at
//! its position. Matching is positional: the record at position `n` is
//! only ever compared against the live call currently being made at
//! position `n`.

use crate::store::CallRecord;
use crate::value::{decode, encode, Arg, SerializationError, Value};

/// Outcome of matching a live call against history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The stored record matches the live call; replay its result
    Reuse,
    /// The position is beyond recorded history; run the function fresh
    Execute,
    /// The stored record disagrees with the live call; truncate from here
    /// and run the function fresh
    Diverge,
}

/// Decide between REUSE and DIVERGE for a position inside recorded
/// history. A missing record, a function-name mismatch, and an argument
/// mismatch are all treated the same way: the history past this point is
/// no longer trusted.
pub fn decide(
    record: Option<&CallRecord>,
    function_name: &str,
    args: &[Arg],
) -> Result<Decision, SerializationError> {
    let Some(record) = record else {
        return Ok(Decision::Diverge);
    };

    if record.function_name != function_name {
        return Ok(Decision::Diverge);
    }

    if args_match(&record.args, args)? {
        Ok(Decision::Reuse)
    } else {
        Ok(Decision::Diverge)
    }
}

/// Compare stored arguments against live ones, element by element.
///
/// A live opaque argument matches whatever is stored at its position.
/// Comparison is encoded-form string equality, so map key order matters.
/// Stored text that no longer decodes is treated as a mismatch rather
/// than an error; untrustworthy history is what divergence is for.
fn args_match(stored: &str, live: &[Arg]) -> Result<bool, SerializationError> {
    let stored = match decode(stored) {
        Ok(Value::List(items)) => items,
        Ok(_) => {
            tracing::warn!("stored arguments are not a list; treating as divergence");
            return Ok(false);
        }
        Err(error) => {
            tracing::warn!(%error, "stored arguments failed to decode; treating as divergence");
            return Ok(false);
        }
    };

    if stored.len() != live.len() {
        return Ok(false);
    }

    for (stored_arg, live_arg) in stored.iter().zip(live) {
        if live_arg.is_opaque() {
            continue;
        }
        if encode(stored_arg)? != encode(live_arg.value())? {
            return Ok(false);
        }
    }

    Ok(true)
}
