//! Typed cell values.
//!
//! A cell is an `Option<Value>`; `None` is the "missing" marker produced by
//! failed coercion, empty source fields, and outer-shaped operations such as
//! pivot.

use crate::date_key::{DateFormat, DateKey};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Integer,
    Float,
    Date,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Date => "date",
        }
    }

    /// Coerces a raw source field to this type.
    ///
    /// Returns `None` (missing) for empty fields and for values that do not
    /// parse; coercion never fails the row. Decimal text coerced to an
    /// integer is truncated toward zero, as an integer cast does.
    pub fn coerce(&self, raw: &str) -> Option<Value> {
        if raw.trim().is_empty() {
            return None;
        }

        match self {
            ValueType::Text => Some(Value::Text(raw.to_string())),
            ValueType::Integer => {
                let trimmed = raw.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| {
                        trimmed
                            .parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
                            .map(|v| v.trunc() as i64)
                    })
                    .map(Value::Integer)
            }
            ValueType::Float => {
                let trimmed = raw.trim();
                if trimmed.eq_ignore_ascii_case("nan") {
                    return None;
                }
                trimmed.parse::<f64>().ok().map(Value::float)
            }
            ValueType::Date => DateFormat::YearMonthDay
                .parse(raw)
                .or_else(|| DateFormat::YearMonth.parse(raw))
                .map(Value::Date),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A present cell value.
///
/// The derived ordering compares the variant first, then the payload; within
/// one column all values share a variant, so column sorts are by payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(OrderedFloat<f64>),
    Date(DateKey),
}

impl Value {
    pub fn float(value: f64) -> Self {
        Value::Float(OrderedFloat(value))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Text(_) => ValueType::Text,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Date(_) => ValueType::Date,
        }
    }

    /// Numeric view of integer and float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateKey> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(v) => f.write_str(v),
            Value::Integer(v) => write!(f, "{}", v),
            // Debug keeps a trailing `.0` on whole numbers
            Value::Float(v) => write!(f, "{:?}", v.0),
            Value::Date(v) => write!(f, "{}", v),
        }
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
        Value::float(value)
    }
}

impl From<DateKey> for Value {
    fn from(value: DateKey) -> Self {
        Value::Date(value)
    }
}
