use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical type of a tracked field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Number,
    Text,
}

/// A single cell value as delivered by the table provider.
///
/// Serialized untagged so that persisted change logs read like the provider's
/// JSON (`null`, `11`, `"Hanwa Qcell"`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ScalarValue::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coerce into the canonical representation for `kind`.
    ///
    /// - numeric fields parse numeric text (`" 15 "` becomes `15`); text that
    ///   does not parse is kept, trimmed, so the change is still visible
    /// - text fields trim and render numbers without a trailing `.0`
    /// - blank text is [`ScalarValue::Empty`] for both kinds
    pub fn canonical(&self, kind: FieldKind) -> ScalarValue {
        match (self, kind) {
            (ScalarValue::Empty, _) => ScalarValue::Empty,
            (ScalarValue::Number(n), FieldKind::Number) => ScalarValue::Number(*n),
            (ScalarValue::Number(n), FieldKind::Text) => ScalarValue::Text(format_number(*n)),
            (ScalarValue::Text(s), kind) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return ScalarValue::Empty;
                }
                if kind == FieldKind::Number {
                    if let Some(n) = parse_number(trimmed) {
                        return ScalarValue::Number(n);
                    }
                }
                ScalarValue::Text(trimmed.to_string())
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Empty => Ok(()),
            ScalarValue::Number(n) => f.write_str(&format_number(*n)),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Number(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Number(value as f64)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

fn parse_number(s: &str) -> Option<f64> {
    // Sheets exports thousands separators for large counts ("1,200").
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
