//! Compact payload previews for the decision trace

use crate::value::{Arg, Value};

const MAX_VALUE_PREVIEW: usize = 120;
const MAX_ARG_PREVIEW: usize = 40;

/// Render a value as a single truncated line
pub fn value(value: &Value) -> String {
    truncate(&value.to_string(), MAX_VALUE_PREVIEW)
}

/// Render an argument list as `(a, b, ...)` with each element truncated
pub fn args(args: &[Arg]) -> String {
    let rendered: Vec<String> = args
        .iter()
        .map(|arg| truncate(&arg.value().to_string(), MAX_ARG_PREVIEW))
        .collect();
    format!("({})", rendered.join(", "))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{head}\u{2026}")
}
