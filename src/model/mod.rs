//! Domain model: datasets, chart intents, column metadata, dashboards.

pub mod column;
pub mod dashboard;
pub mod dataset;
pub mod filter;
pub mod intent;

pub use column::{ColumnMetadata, DatasetMetadata, SemanticType};
pub use dashboard::{DashboardBlock, DashboardInstance, DashboardTemplate, Layout, MetricFormat, Unit};
pub use dataset::Dataset;
pub use filter::{DynamicFilter, FilterField, FilterOp, FilterableFields, ParamValue};
pub use intent::{
    AggregationSpec, AggregationVerb, AxisKind, BlockConfig, ChartIntent, ChartKind, Granularity,
    RawAggregation, YAxis,
};
