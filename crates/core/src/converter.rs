//! Path slot converters and scalar stringification.
//!
//! Converters mirror the router's slot syntax (`{id:int}`), so a value that
//! materializes cleanly is one the receiving route will match again.

use core::str::FromStr;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{MaterializeError, MaterializeResult, SchemaError};

/// Converter attached to a path slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PathConverter {
    /// One non-empty segment, no `/`.
    #[default]
    Str,
    /// Any string, `/` allowed.
    Path,
    /// Non-negative integer.
    Int,
    /// Non-negative finite float.
    Float,
    /// UUID, rendered hyphenated.
    Uuid,
}

impl PathConverter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathConverter::Str => "str",
            PathConverter::Path => "path",
            PathConverter::Int => "int",
            PathConverter::Float => "float",
            PathConverter::Uuid => "uuid",
        }
    }

    /// Render `value` as the concrete text of the slot.
    pub fn convert(&self, name: &str, value: &Value) -> MaterializeResult<String> {
        let invalid = || MaterializeError::invalid_type(name, self.as_str());

        match self {
            PathConverter::Str => {
                let s = scalar_to_string(value).ok_or_else(invalid)?;
                if s.is_empty() || s.contains('/') {
                    return Err(invalid());
                }
                Ok(s)
            }
            PathConverter::Path => scalar_to_string(value).ok_or_else(invalid),
            PathConverter::Int => {
                let n = match value {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.trim().parse::<u64>().ok(),
                    _ => None,
                };
                n.map(|n| n.to_string()).ok_or_else(invalid)
            }
            PathConverter::Float => {
                let f = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match f {
                    Some(f) if f.is_finite() && f >= 0.0 => Ok(format_float(f)),
                    _ => Err(invalid()),
                }
            }
            PathConverter::Uuid => match value {
                Value::String(s) => Uuid::parse_str(s)
                    .map(|u| u.hyphenated().to_string())
                    .map_err(|_| invalid()),
                _ => Err(invalid()),
            },
        }
    }
}

impl core::fmt::Display for PathConverter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathConverter {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(PathConverter::Str),
            "path" => Ok(PathConverter::Path),
            "int" => Ok(PathConverter::Int),
            "float" => Ok(PathConverter::Float),
            "uuid" => Ok(PathConverter::Uuid),
            other => Err(SchemaError::malformed(
                format!("{{:{other}}}"),
                format!("unknown converter `{other}`"),
            )),
        }
    }
}

/// Fixed-point rendering with trailing zeros removed (`2.50` -> `2.5`, `3.0` -> `3`).
fn format_float(f: f64) -> String {
    let fixed = format!("{f:.20}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Text form of a scalar JSON value. Compound values and null have none.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
