//! Input scrubbing
//!
//! Many operations reject explicit nulls and empty strings, while the call
//! sites expose every parameter as optional. Nulls are dropped silently; empty
//! strings are dropped with one warning each.

use crate::sink::{CdpWarning, WarningSink};
use serde_json::{Map, Value};

/// Remove null and empty-string arguments from a payload
pub fn scrub(payload: Map<String, Value>, warnings: &dyn WarningSink) -> Map<String, Value> {
    payload
        .into_iter()
        .filter(|(key, value)| match value {
            Value::Null => false,
            Value::String(s) if s.is_empty() => {
                warnings.warn(CdpWarning::new(format!(
                    "Removing empty string arg {} from submission",
                    key
                )));
                false
            },
            _ => true,
        })
        .collect()
}

/// Scrub redirect headers and render the survivors as header strings
pub fn scrub_headers(headers: Map<String, Value>, warnings: &dyn WarningSink) -> Vec<(String, String)> {
    scrub(headers, warnings)
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}
