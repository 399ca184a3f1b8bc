use std::fmt;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

/// Parses a raw cell. Empty (or whitespace-only) input is null.
pub fn parse_typed_value(value: &str, ty: ColumnType) -> Result<Option<Value>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::Text(value.to_string()),
        ColumnType::Integer => match trimmed.parse::<i64>() {
            Ok(parsed) => Value::Integer(parsed),
            Err(_) => {
                // Years exported by spreadsheet tools sometimes arrive as `2020.0`.
                let float: f64 = trimmed
                    .parse()
                    .with_context(|| format!("Failed to parse '{value}' as integer"))?;
                if float.fract() != 0.0 || !float.is_finite() {
                    bail!("Failed to parse '{value}' as integer");
                }
                Value::Integer(float as i64)
            }
        },
        ColumnType::Float => {
            let parsed: f64 = trimmed
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            if parsed.is_nan() {
                return Ok(None);
            }
            Value::Float(parsed)
        }
    };
    Ok(Some(parsed))
}

/// Converts an already-typed cell, used when a reshaper needs a numeric view
/// of a column that was read as text.
pub fn coerce_value(value: &Value, ty: ColumnType) -> Result<Option<Value>> {
    match (value, ty) {
        (Value::Text(s), _) => parse_typed_value(s, ty),
        (Value::Integer(i), ColumnType::Float) => Ok(Some(Value::Float(*i as f64))),
        (Value::Float(f), ColumnType::Integer) => {
            if f.fract() != 0.0 {
                bail!("Cannot convert {f} to integer without loss");
            }
            Ok(Some(Value::Integer(*f as i64)))
        }
        (other, ColumnType::String) => Ok(Some(Value::Text(other.as_display()))),
        (other, _) => Ok(Some(other.clone())),
    }
}

/// Truncates to at most `width` characters, counting Unicode scalar values.
pub fn truncate_chars(value: &str, width: usize) -> String {
    match value.char_indices().nth(width) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typed_value_handles_empty_and_whitespace() {
        assert_eq!(parse_typed_value("", ColumnType::Integer).unwrap(), None);
        assert_eq!(parse_typed_value("  ", ColumnType::Float).unwrap(), None);
        assert_eq!(parse_typed_value("", ColumnType::String).unwrap(), None);
    }

    #[test]
    fn parse_typed_value_accepts_integral_floats_as_integers() {
        assert_eq!(
            parse_typed_value("2020.0", ColumnType::Integer).unwrap(),
            Some(Value::Integer(2020))
        );
        assert!(parse_typed_value("2020.5", ColumnType::Integer).is_err());
        assert!(parse_typed_value("abc", ColumnType::Integer).is_err());
    }

    #[test]
    fn parse_typed_value_treats_nan_as_null() {
        assert_eq!(parse_typed_value("NaN", ColumnType::Float).unwrap(), None);
        assert_eq!(
            parse_typed_value("1.5e3", ColumnType::Float).unwrap(),
            Some(Value::Float(1500.0))
        );
    }

    #[test]
    fn float_display_is_shortest_round_trip() {
        assert_eq!(Value::Float(5.0).as_display(), "5");
        assert_eq!(Value::Float(0.1).as_display(), "0.1");
        assert_eq!(Value::Integer(210_500_000).as_display(), "210500000");
    }

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("Côte d'Ivoire", 4), "Côte");
        assert_eq!(truncate_chars("BRA", 4), "BRA");
        assert_eq!(truncate_chars("", 4), "");
    }

    #[test]
    fn coerce_value_parses_text_cells() {
        let cell = Value::Text("42".to_string());
        assert_eq!(
            coerce_value(&cell, ColumnType::Float).unwrap(),
            Some(Value::Float(42.0))
        );
        assert_eq!(
            coerce_value(&Value::Float(3.0), ColumnType::Integer).unwrap(),
            Some(Value::Integer(3))
        );
    }
}
