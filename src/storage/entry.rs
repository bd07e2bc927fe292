use serde::{Deserialize, Serialize};
use std::fmt;

/// Advisory type tag attached to every stored value.
///
/// The tag is inferred from the first character of the value and is never
/// validated against the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Json,
}

impl ValueType {
    /// Infer the tag from the first character of `value`.
    pub fn infer(value: &str) -> Self {
        match value.as_bytes().first() {
            Some(b'{' | b'[' | b'"') => ValueType::Json,
            Some(b) if b.is_ascii_digit() => ValueType::Number,
            _ => ValueType::String,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Number => write!(f, "number"),
            ValueType::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
}

impl Entry {
    pub fn new(key: String, value: String) -> Self {
        let value_type = ValueType::infer(&value);
        Self {
            key,
            value,
            value_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_number() {
        assert_eq!(ValueType::infer("42"), ValueType::Number);
        assert_eq!(ValueType::infer("7 dwarves"), ValueType::Number);
    }

    #[test]
    fn test_infer_json() {
        assert_eq!(ValueType::infer("{\"a\":1}"), ValueType::Json);
        assert_eq!(ValueType::infer("[1, 2]"), ValueType::Json);
        assert_eq!(ValueType::infer("\"quoted\""), ValueType::Json);
    }

    #[test]
    fn test_infer_string() {
        assert_eq!(ValueType::infer("hello"), ValueType::String);
        assert_eq!(ValueType::infer("-1"), ValueType::String);
        assert_eq!(ValueType::infer(""), ValueType::String);
    }

    #[test]
    fn test_entry_carries_inferred_type() {
        let entry = Entry::new("k".to_string(), "{broken".to_string());
        assert_eq!(entry.value_type, ValueType::Json);
        assert_eq!(entry.value_type.to_string(), "json");
    }
}
