//! # Resource Metadata
//!
//! Arbitrary key/value metadata attached to resources in the registry. Keys
//! are strings; values are loosely-typed scalars. On update, a `Null` value
//! deletes the key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered metadata mapping.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// JSON `null`. Deletes the key when sent in an update.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// String.
    String(String),
}

impl MetadataValue {
    /// Interpret a command-line literal.
    ///
    /// Booleans (`true`/`True`), null (`null`/`None`), integers, and floats
    /// become typed values; quoted text has its quotes removed; anything else
    /// is kept as a string.
    pub fn parse_literal(raw: &str) -> Self {
        let s = raw.trim();
        match s {
            "true" | "True" => return Self::Bool(true),
            "false" | "False" => return Self::Bool(false),
            "null" | "None" => return Self::Null,
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        for quote in ['"', '\''] {
            if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
                return Self::String(s[1..s.len() - 1].to_string());
            }
        }
        Self::String(raw.to_string())
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Parse a `key=value` argument into a metadata entry.
///
/// Exactly one `=` is required.
pub fn parse_key_value(arg: &str) -> Result<(String, MetadataValue), String> {
    if arg.matches('=').count() != 1 {
        return Err(format!("{arg:?} is badly formed; needs key=value"));
    }
    let (key, value) = arg.split_once('=').unwrap_or((arg, ""));
    if key.is_empty() {
        return Err(format!("{arg:?} has an empty key"));
    }
    Ok((key.to_string(), MetadataValue::parse_literal(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_typed() {
        assert_eq!(MetadataValue::parse_literal("10"), MetadataValue::Integer(10));
        assert_eq!(MetadataValue::parse_literal("2.5"), MetadataValue::Float(2.5));
        assert_eq!(MetadataValue::parse_literal("True"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::parse_literal("None"), MetadataValue::Null);
        assert_eq!(
            MetadataValue::parse_literal("'quoted'"),
            MetadataValue::String("quoted".into())
        );
        assert_eq!(
            MetadataValue::parse_literal("dmeliza"),
            MetadataValue::String("dmeliza".into())
        );
    }

    #[test]
    fn key_value_requires_single_equals() {
        assert_eq!(
            parse_key_value("experimenter=dmeliza").unwrap(),
            ("experimenter".into(), MetadataValue::String("dmeliza".into()))
        );
        assert!(parse_key_value("noequals").is_err());
        assert!(parse_key_value("a=b=c").is_err());
        assert!(parse_key_value("=b").is_err());
    }

    #[test]
    fn metadata_serializes_as_plain_json() {
        let mut m = Metadata::new();
        m.insert("a".into(), MetadataValue::Integer(1));
        m.insert("b".into(), MetadataValue::Null);
        m.insert("c".into(), MetadataValue::String("x".into()));
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            serde_json::json!({"a": 1, "b": null, "c": "x"})
        );
        let back: Metadata = serde_json::from_value(serde_json::json!({"a": 1, "b": null, "c": "x"})).unwrap();
        assert_eq!(back, m);
    }
}
