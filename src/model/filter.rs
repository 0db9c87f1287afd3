//! Caller-supplied row filters and bound parameter values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{type_family, TypeFamily};

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Convert raw query-string text using the column's database type.
    ///
    /// Falls back to text when the value does not parse as the type
    /// suggests.
    pub fn cast(raw: &str, database_type: &str) -> Self {
        let raw = raw.trim();
        match type_family(database_type) {
            TypeFamily::Integer => {
                if let Ok(n) = raw.parse::<i64>() {
                    return ParamValue::Int(n);
                }
            }
            TypeFamily::Float => {
                if let Ok(f) = raw.parse::<f64>() {
                    if f.is_finite() {
                        return ParamValue::Float(f);
                    }
                }
            }
            TypeFamily::Boolean => {
                return ParamValue::Bool(matches!(
                    raw.to_ascii_lowercase().as_str(),
                    "true" | "1" | "yes"
                ));
            }
            TypeFamily::Datetime | TypeFamily::Other => {}
        }
        ParamValue::Text(raw.to_string())
    }
}

impl From<&ParamValue> for serde_json::Value {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Null => serde_json::Value::Null,
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Int(n) => serde_json::Value::from(*n),
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ParamValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Comparison applied by a dynamic filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(FilterOp::Eq),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "in" => Some(FilterOp::In),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed row filter applied before aggregation.
///
/// `values` holds exactly one entry for scalar ops and any number for
/// `in`. Values are always bound, never rendered into SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicFilter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<ParamValue>,
}

impl DynamicFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: ParamValue) -> Self {
        Self {
            field: field.into(),
            op,
            values: vec![value],
        }
    }

    pub fn in_list(field: impl Into<String>, values: Vec<ParamValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In,
            values,
        }
    }

    /// Split a `field__op` query parameter name.
    ///
    /// Returns `None` for parameters that are not filters.
    pub fn split_param(name: &str) -> Option<(&str, FilterOp)> {
        let (field, op) = name.split_once("__")?;
        if field.is_empty() || op.contains("__") {
            return None;
        }
        Some((field, FilterOp::parse(op)?))
    }

    /// The non-blank items of a comma-separated `in` value.
    pub fn list_items(raw: &str) -> impl Iterator<Item = &str> {
        raw.split(',').map(str::trim).filter(|v| !v.is_empty())
    }

    /// Whether a raw parameter value selects anything: an `in` list needs at
    /// least one non-blank item.
    pub fn has_values(op: FilterOp, raw: &str) -> bool {
        match op {
            FilterOp::In => Self::list_items(raw).next().is_some(),
            _ => true,
        }
    }

    /// Build a filter from one query parameter, casting values by the
    /// column's database type. `in` takes a comma-separated list.
    pub fn from_param(field: &str, op: FilterOp, raw: &str, database_type: &str) -> Self {
        match op {
            FilterOp::In => Self::in_list(
                field,
                Self::list_items(raw)
                    .map(|v| ParamValue::cast(v, database_type))
                    .collect(),
            ),
            _ => Self::new(field, op, ParamValue::cast(raw, database_type)),
        }
    }
}

/// A field a template lets viewers filter on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterField {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Filter fields declared on a dashboard template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterableFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<FilterField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categorical: Vec<FilterField>,
}

impl FilterableFields {
    pub fn is_empty(&self) -> bool {
        self.temporal.is_none() && self.categorical.is_empty()
    }

    pub fn allows(&self, field: &str) -> bool {
        self.temporal.as_ref().is_some_and(|t| t.field == field)
            || self.categorical.iter().any(|c| c.field == field)
    }
}
