//! Chart intents: what a dashboard block wants to see.
//!
//! An intent is authored outside the engine and is immutable at query
//! time. The engine only reads it. [`ChartIntent`] is a closed set of
//! kind-tagged variants so that per-kind field rules are carried by the
//! type rather than checked against a bag of optional fields.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Chart kinds
// =============================================================================

/// Every chart kind a block may render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Area,
    Pie,
    Table,
    Metric,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Area => "area",
            ChartKind::Pie => "pie",
            ChartKind::Table => "table",
            ChartKind::Metric => "metric",
        }
    }

    /// Parse a chart kind, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "area" => Some(ChartKind::Area),
            "pie" => Some(ChartKind::Pie),
            "table" => Some(ChartKind::Table),
            "metric" => Some(ChartKind::Metric),
            _ => None,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart kinds drawn against an x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    Bar,
    Line,
    Area,
    Pie,
}

impl AxisKind {
    pub fn chart_kind(self) -> ChartKind {
        match self {
            AxisKind::Bar => ChartKind::Bar,
            AxisKind::Line => ChartKind::Line,
            AxisKind::Area => ChartKind::Area,
            AxisKind::Pie => ChartKind::Pie,
        }
    }
}

// =============================================================================
// Aggregations and time units
// =============================================================================

/// The closed set of aggregation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationVerb {
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
    Median,
}

impl AggregationVerb {
    pub const ALL: [AggregationVerb; 7] = [
        AggregationVerb::Sum,
        AggregationVerb::Avg,
        AggregationVerb::Count,
        AggregationVerb::CountDistinct,
        AggregationVerb::Min,
        AggregationVerb::Max,
        AggregationVerb::Median,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationVerb::Sum => "sum",
            AggregationVerb::Avg => "avg",
            AggregationVerb::Count => "count",
            AggregationVerb::CountDistinct => "count_distinct",
            AggregationVerb::Min => "min",
            AggregationVerb::Max => "max",
            AggregationVerb::Median => "median",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for AggregationVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time bucket applied to a datetime axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which vertical axis a series is drawn against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YAxis {
    #[default]
    Y1,
    Y2,
}

impl YAxis {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y1" => Some(YAxis::Y1),
            "y2" => Some(YAxis::Y2),
            _ => None,
        }
    }
}

/// One aggregated measure requested by a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Source column in the dataset.
    pub field: String,
    pub verb: AggregationVerb,
    /// Display label. Never becomes SQL text.
    pub label: String,
    #[serde(default)]
    pub axis: YAxis,
}

impl AggregationSpec {
    pub fn new(field: impl Into<String>, verb: AggregationVerb, label: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            verb,
            label: label.into(),
            axis: YAxis::Y1,
        }
    }

    #[must_use]
    pub fn on_axis(mut self, axis: YAxis) -> Self {
        self.axis = axis;
        self
    }
}

// =============================================================================
// Chart intent
// =============================================================================

/// A validated-shape visualization request.
///
/// Field names inside are still unchecked strings; the compiler runs
/// them through the identifier validator against the dataset metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartIntent {
    /// Single row of totals, no axis and no grouping.
    Metric { aggregations: Vec<AggregationSpec> },

    /// One row per distinct `series` value.
    Table {
        series: String,
        aggregations: Vec<AggregationSpec>,
    },

    /// Values plotted against an x axis, optionally split by series.
    Axis {
        kind: AxisKind,
        axis: String,
        granularity: Option<Granularity>,
        series: Option<String>,
        aggregations: Vec<AggregationSpec>,
    },
}

impl ChartIntent {
    pub fn metric(aggregations: Vec<AggregationSpec>) -> Self {
        ChartIntent::Metric { aggregations }
    }

    pub fn table(series: impl Into<String>, aggregations: Vec<AggregationSpec>) -> Self {
        ChartIntent::Table {
            series: series.into(),
            aggregations,
        }
    }

    pub fn axis(kind: AxisKind, axis: impl Into<String>, aggregations: Vec<AggregationSpec>) -> Self {
        ChartIntent::Axis {
            kind,
            axis: axis.into(),
            granularity: None,
            series: None,
            aggregations,
        }
    }

    /// Set the time bucket. Ignored for non-axis intents.
    #[must_use]
    pub fn with_granularity(mut self, unit: Granularity) -> Self {
        if let ChartIntent::Axis { granularity, .. } = &mut self {
            *granularity = Some(unit);
        }
        self
    }

    /// Split an axis chart by a series field. Ignored for non-axis intents.
    #[must_use]
    pub fn with_series(mut self, field: impl Into<String>) -> Self {
        if let ChartIntent::Axis { series, .. } = &mut self {
            *series = Some(field.into());
        }
        self
    }

    pub fn kind(&self) -> ChartKind {
        match self {
            ChartIntent::Metric { .. } => ChartKind::Metric,
            ChartIntent::Table { .. } => ChartKind::Table,
            ChartIntent::Axis { kind, .. } => kind.chart_kind(),
        }
    }

    pub fn aggregations(&self) -> &[AggregationSpec] {
        match self {
            ChartIntent::Metric { aggregations }
            | ChartIntent::Table { aggregations, .. }
            | ChartIntent::Axis { aggregations, .. } => aggregations,
        }
    }

    pub fn axis_field(&self) -> Option<&str> {
        match self {
            ChartIntent::Axis { axis, .. } => Some(axis),
            _ => None,
        }
    }

    pub fn series_field(&self) -> Option<&str> {
        match self {
            ChartIntent::Table { series, .. } => Some(series),
            ChartIntent::Axis { series, .. } => series.as_deref(),
            ChartIntent::Metric { .. } => None,
        }
    }

    pub fn granularity(&self) -> Option<Granularity> {
        match self {
            ChartIntent::Axis { granularity, .. } => *granularity,
            _ => None,
        }
    }
}

// =============================================================================
// Authored block configuration
// =============================================================================

/// A block's chart configuration as authored, before any checking.
///
/// Converted into a [`ChartIntent`] by `compile::resolve_intent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub chart_type: String,
    #[serde(default)]
    pub x_axis_field: Option<String>,
    #[serde(default)]
    pub x_axis_granularity: Option<String>,
    #[serde(default)]
    pub series_field: Option<String>,
    #[serde(default)]
    pub y_axis_fields: Vec<RawAggregation>,
}

/// One authored `y_axis_fields` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAggregation {
    pub field: String,
    pub aggregation: String,
    pub label: String,
    #[serde(default)]
    pub axis: Option<String>,
}
