use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single scalar cell of an uploaded sheet.
///
/// Equality is exact and typed: `Int(1)` and `Text("1")` are different
/// values, and no coercion happens after the loader has produced a cell.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// True for null cells and for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text form used for template variables and email addresses.
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    /// Guess a typed value from raw text (csv cells, form input).
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return CellValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return CellValue::from_float(f);
            }
        }
        match raw {
            "true" | "TRUE" | "True" => CellValue::Bool(true),
            "false" | "FALSE" | "False" => CellValue::Bool(false),
            _ => CellValue::Text(raw.to_string()),
        }
    }

    /// Whole floats collapse to `Int` so that a numeric column reads the
    /// same whichever sheet format it came from.
    pub fn from_float(f: f64) -> Self {
        if f.is_nan() {
            CellValue::Null
        } else if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            CellValue::Int(f as i64)
        } else {
            CellValue::Float(f)
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => true,
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::Int(a), CellValue::Int(b)) => a == b,
            (CellValue::Float(a), CellValue::Float(b)) => a.to_bits() == b.to_bits(),
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Null => {}
            CellValue::Bool(b) => b.hash(state),
            CellValue::Int(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}
