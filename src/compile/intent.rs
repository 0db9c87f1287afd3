//! Converting authored block configuration into a [`ChartIntent`].
//!
//! Field requirements per chart kind:
//!
//! | Kind             | Axis      | Series    | Granularity | Aggregations |
//! |------------------|-----------|-----------|-------------|--------------|
//! | `metric`         | forbidden | forbidden | ignored     | at least one |
//! | `table`          | ignored   | required  | ignored     | at least one |
//! | `bar/line/area`  | required  | optional  | allowed     | at least one |
//! | `pie`            | required  | forbidden | forbidden   | at least one |

use crate::model::{
    AggregationSpec, AxisKind, BlockConfig, ChartIntent, ChartKind, RawAggregation, YAxis,
};
use crate::validation::{validate_granularity, validate_verb_name};

use super::{CompileError, CompileResult};

fn invalid(kind: &str, field: &str, reason: &str) -> CompileError {
    CompileError::InvalidChartConfiguration {
        kind: kind.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Treat blank authored strings as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_aggregation(kind: &str, raw: &RawAggregation) -> CompileResult<AggregationSpec> {
    let field = raw.field.trim();
    if field.is_empty() {
        return Err(invalid(kind, "y_axis_fields.field", "is required"));
    }
    let verb = validate_verb_name(&raw.aggregation)?;
    let axis = match present(&raw.axis) {
        Some(axis) => YAxis::parse(axis)
            .ok_or_else(|| invalid(kind, "y_axis_fields.axis", "must be y1 or y2"))?,
        None => YAxis::default(),
    };
    let label = match raw.label.trim() {
        "" => field.to_string(),
        label => label.to_string(),
    };
    Ok(AggregationSpec::new(field, verb, label).on_axis(axis))
}

/// Build a [`ChartIntent`] from a block's authored configuration.
///
/// Fails with `InvalidChartConfiguration` naming the first missing or
/// forbidden field. Unknown verbs and granularities fail validation.
pub fn resolve_intent(config: &BlockConfig) -> CompileResult<ChartIntent> {
    let kind_name = config.chart_type.trim();
    let kind = ChartKind::parse(kind_name)
        .ok_or_else(|| invalid(kind_name, "chart_type", "is not a known chart kind"))?;
    let kind_name = kind.as_str();

    let aggregations = config
        .y_axis_fields
        .iter()
        .map(|raw| resolve_aggregation(kind_name, raw))
        .collect::<CompileResult<Vec<_>>>()?;

    let axis = present(&config.x_axis_field);
    let series = present(&config.series_field);
    let granularity = present(&config.x_axis_granularity);

    let intent = match kind {
        ChartKind::Metric => {
            if axis.is_some() {
                return Err(invalid(kind_name, "x_axis_field", "is not allowed"));
            }
            if series.is_some() {
                return Err(invalid(kind_name, "series_field", "is not allowed"));
            }
            ChartIntent::metric(aggregations)
        }
        ChartKind::Table => {
            let series =
                series.ok_or_else(|| invalid(kind_name, "series_field", "is required"))?;
            ChartIntent::table(series, aggregations)
        }
        ChartKind::Bar | ChartKind::Line | ChartKind::Area | ChartKind::Pie => {
            let axis_kind = match kind {
                ChartKind::Bar => AxisKind::Bar,
                ChartKind::Line => AxisKind::Line,
                ChartKind::Area => AxisKind::Area,
                _ => AxisKind::Pie,
            };
            let axis = axis.ok_or_else(|| invalid(kind_name, "x_axis_field", "is required"))?;
            let mut intent = ChartIntent::axis(axis_kind, axis, aggregations);
            if let Some(series) = series {
                intent = intent.with_series(series);
            }
            if let Some(unit) = granularity {
                intent = intent.with_granularity(validate_granularity(unit)?);
            }
            intent
        }
    };

    check_shape(&intent)?;
    Ok(intent)
}

/// Enforce the per-kind rules the variant types alone do not carry.
pub fn check_shape(intent: &ChartIntent) -> CompileResult<()> {
    let kind = intent.kind();
    if intent.aggregations().is_empty() {
        return Err(invalid(
            kind.as_str(),
            "y_axis_fields",
            "requires at least one aggregation",
        ));
    }
    if kind == ChartKind::Pie {
        if intent.series_field().is_some() {
            return Err(invalid(kind.as_str(), "series_field", "is not allowed"));
        }
        if intent.granularity().is_some() {
            return Err(invalid(kind.as_str(), "x_axis_granularity", "is not allowed"));
        }
    }
    Ok(())
}
