use std::fmt;

use serde::{Deserialize, Serialize};

use super::Record;

/// A single field value inside a [`Record`].
///
/// Integers of every width are widened to `i64` on the way in, floats to
/// `f64`. Anything else a collector wants to report is either a bool, a
/// string, or a list of nested records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Record>),
}

/// Column type used by the columnar writer and by readers when rebuilding a
/// record from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Str,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Int => "int64",
            ValueKind::Float => "float64",
            ValueKind::Bool => "bool",
            ValueKind::Str => "string",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Scalar kind of this value. Lists are stored as their JSON text.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Str(_) | Value::List(_) => ValueKind::Str,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view: ints are converted, floats returned as is.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Converts a decoded JSON value. `null` has no counterpart and yields `None`;
    /// arrays and objects are kept as their JSON text.
    pub fn from_json(value: serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::Str(s)),
            other => Some(Value::Str(other.to_string())),
        }
    }

    /// Parses one cell of delimited text: int, then finite float, then bool,
    /// else string. Empty cells are absent; `nan` and `inf` stay strings.
    pub fn parse_cell(cell: &str) -> Option<Value> {
        if cell.is_empty() {
            return None;
        }
        if let Ok(v) = cell.parse::<i64>() {
            return Some(Value::Int(v));
        }
        if let Ok(v) = cell.parse::<f64>()
            && v.is_finite()
        {
            return Some(Value::Float(v));
        }
        match cell {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => Some(Value::Str(cell.to_string())),
        }
    }
}

/// Text form used by the delimited writer: integers without a decimal point,
/// floats in their shortest round-trip form, `true`/`false`, nested lists as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::List(v) => match serde_json::to_string(v) {
                Ok(s) => f.write_str(&s),
                Err(_) => f.write_str("[]"),
            },
        }
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64, isize);
impl_from_unsigned!(u8, u16, u32, u64, usize);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<Record>> for Value {
    fn from(v: Vec<Record>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_widening_saturates() {
        assert_eq!(Value::from(u64::MAX), Value::Int(i64::MAX));
        assert_eq!(Value::from(42u32), Value::Int(42));
        assert_eq!(Value::from(-3i8), Value::Int(-3));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(Value::Int(12).to_string(), "12");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Str("gpu0".into()).to_string(), "gpu0");
    }

    #[test]
    fn test_parse_cell_order() {
        assert_eq!(Value::parse_cell("7"), Some(Value::Int(7)));
        assert_eq!(Value::parse_cell("7.5"), Some(Value::Float(7.5)));
        assert_eq!(Value::parse_cell("false"), Some(Value::Bool(false)));
        assert_eq!(Value::parse_cell("eth0"), Some(Value::Str("eth0".into())));
        assert_eq!(Value::parse_cell(""), None);
    }

    #[test]
    fn test_parse_cell_non_finite_is_text() {
        for cell in ["nan", "NaN", "inf", "-inf", "infinity", "+Infinity"] {
            assert_eq!(Value::parse_cell(cell), Some(Value::Str(cell.into())), "{cell}");
        }
        assert_eq!(Value::parse_cell("1e3"), Some(Value::Float(1000.0)));
    }

    #[test]
    fn test_json_float_stays_float() {
        let v: Value = serde_json::from_str("2.0").unwrap();
        assert_eq!(v, Value::Float(2.0));
        let v: Value = serde_json::from_str("2").unwrap();
        assert_eq!(v, Value::Int(2));
    }

    #[test]
    fn test_from_json_null_is_absent() {
        assert_eq!(Value::from_json(serde_json::Value::Null), None);
        assert_eq!(
            Value::from_json(serde_json::json!([1, 2])),
            Some(Value::Str("[1,2]".into()))
        );
    }
}
