//! Response payloads for dashboard and block renders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ChartKind, DashboardBlock, FilterOp, Unit};
use crate::normalize::ChartPayload;

use super::error::EngineError;

/// `{kind, message}` reported for a failed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutBody {
    pub col_span: u16,
    pub row_span: u16,
}

/// One block of a rendered dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub id: String,
    pub title: String,
    pub chart: Map<String, Value>,
    pub layout: LayoutBody,
    pub data: Option<ChartPayload>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl BlockEntry {
    pub fn new(block: &DashboardBlock, outcome: &Result<ChartPayload, EngineError>) -> Self {
        let (data, error) = match outcome {
            Ok(payload) => (Some(payload.clone()), None),
            Err(err) => (None, Some(ErrorBody::from(err))),
        };
        Self {
            id: block.id.clone(),
            title: block.title.clone(),
            chart: chart_body(block),
            layout: LayoutBody {
                col_span: block.layout.col_span,
                row_span: block.layout.row_span,
            },
            success: error.is_none(),
            data,
            error,
        }
    }
}

/// `{type, ...config, ...options, metricPrefix?, metricSuffix?, metricDecimalPlaces?}`
fn chart_body(block: &DashboardBlock) -> Map<String, Value> {
    let mut chart = Map::new();
    chart.insert("type".into(), Value::String(block.chart.chart_type.clone()));
    if let Ok(Value::Object(config)) = serde_json::to_value(&block.chart) {
        for (key, value) in config {
            if key != "chart_type" && !value.is_null() {
                chart.insert(key, value);
            }
        }
    }
    for (key, value) in &block.chart_options {
        chart.entry(key.clone()).or_insert_with(|| value.clone());
    }

    if ChartKind::parse(&block.chart.chart_type) == Some(ChartKind::Metric) {
        let format = &block.metric_format;
        if let Some(prefix) = &format.prefix {
            chart.insert("metricPrefix".into(), Value::String(prefix.clone()));
        }
        if let Some(suffix) = &format.suffix {
            chart.insert("metricSuffix".into(), Value::String(suffix.clone()));
        }
        if let Some(places) = format.decimal_places {
            chart.insert("metricDecimalPlaces".into(), Value::from(places));
        }
    }
    chart
}

/// A filter parsed from request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedFilter {
    pub field: String,
    pub op: FilterOp,
    /// As sent; cast per dataset column type at compile time.
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Temporal,
    Categorical,
}

/// A filter a viewer may apply, with its choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableFilter {
    pub field: String,
    pub label: String,
    pub kind: FilterKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiltersBody {
    pub available: Vec<AvailableFilter>,
    pub applied: Vec<RequestedFilter>,
}

/// A fully rendered dashboard instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub id: String,
    pub template_name: String,
    pub unit: Unit,
    pub schema: Value,
    /// Payload per block id; `null` for failed blocks.
    pub data: BTreeMap<String, Option<ChartPayload>>,
    pub blocks: Vec<BlockEntry>,
    pub filters: FiltersBody,
}
