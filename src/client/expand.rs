//! Client-side positional placeholder expansion.
//!
//! Rewrites a SQL template using `?` markers and a parameter list into the
//! driver-native form: sequence parameters fan out to one marker per
//! element (for `IN (?)`), mapping parameters fan out to `key = ?`
//! fragments (for `SET ?`), and scalars pass through untouched.

use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};

/// Result of expanding one SQL template. Transient; produced per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    /// SQL with every placeholder rewritten to its driver-native run.
    pub sql: String,
    /// Flattened scalar parameters matching the expanded markers
    /// one-to-one, in order.
    pub params: Vec<Value>,
}

/// Expand `?` placeholders left to right against `params`.
///
/// Each marker consumes the next unused parameter. Running out of
/// parameters before markers fails with
/// [`BridgeError::ParameterCountMismatch`] without anything crossing the
/// wire; surplus parameters are ignored. An empty sequence parameter
/// expands to zero markers, leaving a syntactically empty `IN ()` to the
/// caller.
pub fn expand(sql: &str, params: &[Value]) -> BridgeResult<Expansion> {
    let mut out = String::with_capacity(sql.len());
    let mut flat = Vec::with_capacity(params.len());
    let mut used = 0usize;

    for ch in sql.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        let Some(param) = params.get(used) else {
            return Err(BridgeError::ParameterCountMismatch {
                placeholders: used + 1,
                params: params.len(),
            });
        };
        used += 1;
        match param {
            Value::Array(items) => {
                out.push_str(&vec!["?"; items.len()].join(","));
                flat.extend(items.iter().cloned());
            }
            Value::Object(map) => {
                let mut fragments = Vec::with_capacity(map.len());
                for (key, value) in map {
                    fragments.push(format!("{} = ?", key));
                    flat.push(value.clone());
                }
                out.push_str(&fragments.join(","));
            }
            scalar => {
                out.push('?');
                flat.push(scalar.clone());
            }
        }
    }

    Ok(Expansion { sql: out, params: flat })
}
