//! Per-variable metadata carried from source containers into archives.
//!
//! Missing data is represented as `NaN` throughout. The source fill value and
//! valid range are kept explicitly so that masking is never implicit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FILL_VALUE_ATTR: &str = "_FillValue";

/// Metadata of one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableMeta {
    pub name: String,
    pub units: Option<String>,
    pub long_name: Option<String>,
    pub fill_value: Option<f64>,
    pub valid_min: Option<f64>,
    pub valid_max: Option<f64>,
    /// All source attributes, verbatim.
    pub attributes: BTreeMap<String, Value>,
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(values) if values.len() == 1 => as_number(&values[0]),
        _ => None,
    }
}

impl VariableMeta {
    /// Interpret the conventional CF attributes.
    pub fn from_attributes(name: impl Into<String>, attributes: BTreeMap<String, Value>) -> Self {
        let text = |key: &str| attributes.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| attributes.get(key).and_then(as_number);

        let (mut valid_min, mut valid_max) = (number("valid_min"), number("valid_max"));
        if let Some(Value::Array(range)) = attributes.get("valid_range") {
            if range.len() == 2 {
                valid_min = valid_min.or_else(|| as_number(&range[0]));
                valid_max = valid_max.or_else(|| as_number(&range[1]));
            }
        }

        Self {
            name: name.into(),
            units: text("units"),
            long_name: text("long_name"),
            fill_value: number(FILL_VALUE_ATTR),
            valid_min,
            valid_max,
            attributes,
        }
    }

    /// Same metadata under a new output name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// True for non-finite values, the fill value, and values outside the valid range.
    pub fn is_missing(&self, value: f64) -> bool {
        !value.is_finite()
            || self.fill_value == Some(value)
            || self.valid_min.is_some_and(|min| value < min)
            || self.valid_max.is_some_and(|max| value > max)
    }

    /// Replace missing values with `NaN`.
    pub fn mask(&self, value: f64) -> f64 {
        if self.is_missing(value) {
            f64::NAN
        } else {
            value
        }
    }
}
