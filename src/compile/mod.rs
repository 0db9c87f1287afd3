//! Semantic compilation from chart intents to SQL.
//!
//! ```text
//! BlockConfig → resolve_intent → ChartIntent ─┐
//! Dataset + TenantScope → BaseRelation ───────┼→ compile → CompiledChart
//! DatasetMetadata ────────────────────────────┘
//! ```
//!
//! Every field, verb and unit is checked through [`crate::validation`]
//! before any SQL is built; a failure anywhere aborts the whole compile.
//! Output columns get fixed aliases (`__x`, `__s`, `__m0`, ...) and the
//! display labels travel separately in the [`ColumnPlan`], so label text
//! never becomes an SQL identifier.
//!
//! # Example
//!
//! ```ignore
//! use painel::compile::{compile, BaseRelation, CompileOptions, TenantScope};
//! use painel::model::{AggregationSpec, AggregationVerb, AxisKind, ChartIntent, Granularity};
//!
//! let base = BaseRelation::new(&dataset, TenantScope::predicate("loja_id = 3"))?;
//! let intent = ChartIntent::axis(
//!     AxisKind::Bar,
//!     "data_venda",
//!     vec![AggregationSpec::new("valor", AggregationVerb::Sum, "Total")],
//! )
//! .with_granularity(Granularity::Month);
//!
//! let chart = compile(&base, &metadata, &intent, &[], &CompileOptions::default())?;
//! println!("{}", chart.query.sql);
//! ```

mod base;
mod intent;

pub use base::{BaseRelation, TenantScope, BASE};
pub use intent::{check_shape, resolve_intent};

use crate::model::{
    AggregationVerb, ChartIntent, ChartKind, DatasetMetadata, DynamicFilter, FilterOp, ParamValue,
    YAxis,
};
use crate::sql::{col, param, CompareOp, Dialect, Expr, FromSource, Query, Sort};
use crate::validation::{
    validate_aggregated_field, validate_field, validate_granularity_for, ValidationError,
};

/// Output alias of the axis column.
pub const AXIS_ALIAS: &str = "__x";
/// Output alias of the series column.
pub const SERIES_ALIAS: &str = "__s";
/// Output alias of the value column in filter-option queries.
pub const OPTION_ALIAS: &str = "__v";

/// Output alias of the `i`th aggregation.
pub fn measure_alias(i: usize) -> String {
    format!("__m{}", i)
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Invalid {kind} chart configuration: '{field}' {reason}")]
    InvalidChartConfiguration {
        kind: String,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid filter on '{field}': {reason}")]
    InvalidFilter { field: String, reason: String },

    #[error("Dataset '{0}' is inactive")]
    DatasetInactive(String),
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,
    /// Adds a `LIMIT` to the aggregated statement.
    pub row_limit: Option<u64>,
}

impl CompileOptions {
    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Cap the number of rows the statement may return.
    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// A complete statement and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    /// Values for placeholders `1..=params.len()`, in order.
    pub params: Vec<ParamValue>,
    pub dialect: Dialect,
}

/// A non-aggregated output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedColumn {
    pub alias: String,
    pub field: String,
}

/// An aggregated output column and how to present it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMeasure {
    pub alias: String,
    pub field: String,
    pub verb: AggregationVerb,
    pub label: String,
    pub axis: YAxis,
}

/// What each output column of a chart statement means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    pub kind: ChartKind,
    pub axis: Option<PlannedColumn>,
    pub series: Option<PlannedColumn>,
    pub measures: Vec<PlannedMeasure>,
}

/// Result of compiling one chart.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledChart {
    pub query: CompiledQuery,
    pub plan: ColumnPlan,
}

// ============================================================================
// Compilation Functions
// ============================================================================

fn bind(params: &mut Vec<ParamValue>, value: &ParamValue) -> Expr {
    params.push(value.clone());
    param(params.len())
}

/// Bind each filter's values and build its condition.
fn filter_conditions(
    filters: &[DynamicFilter],
    metadata: &DatasetMetadata,
    params: &mut Vec<ParamValue>,
) -> CompileResult<Vec<Expr>> {
    let mut conditions = Vec::with_capacity(filters.len());

    for filter in filters {
        let column = validate_field(&filter.field, metadata)?.column();

        let op = match filter.op {
            FilterOp::In => {
                if filter.values.is_empty() {
                    return Err(CompileError::InvalidFilter {
                        field: filter.field.clone(),
                        reason: "'in' needs at least one value".into(),
                    });
                }
                let values = filter.values.iter().map(|v| bind(params, v)).collect();
                conditions.push(column.in_list(values));
                continue;
            }
            FilterOp::Eq => CompareOp::Eq,
            FilterOp::Gt => CompareOp::Gt,
            FilterOp::Gte => CompareOp::Gte,
            FilterOp::Lt => CompareOp::Lt,
            FilterOp::Lte => CompareOp::Lte,
        };

        let [value] = filter.values.as_slice() else {
            return Err(CompileError::InvalidFilter {
                field: filter.field.clone(),
                reason: format!("'{}' takes exactly one value", filter.op),
            });
        };
        conditions.push(column.compare(op, bind(params, value)));
    }

    Ok(conditions)
}

/// Compile a chart intent against a scoped dataset.
///
/// `filters` are applied to `base` rows before aggregation, next to the
/// tenant scope. Their values are always bound parameters.
pub fn compile(
    base: &BaseRelation,
    metadata: &DatasetMetadata,
    intent: &ChartIntent,
    filters: &[DynamicFilter],
    options: &CompileOptions,
) -> CompileResult<CompiledChart> {
    check_shape(intent)?;

    let axis = intent
        .axis_field()
        .map(|name| validate_field(name, metadata))
        .transpose()?;
    let granularity = intent.granularity();
    if let (Some(field), Some(_)) = (&axis, granularity) {
        validate_granularity_for(field)?;
    }
    let series = intent
        .series_field()
        .map(|name| validate_field(name, metadata))
        .transpose()?;
    let measures = intent
        .aggregations()
        .iter()
        .map(|agg| {
            validate_aggregated_field(&agg.field, agg.verb, metadata).map(|field| (agg, field))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut params = Vec::new();
    let conditions = filter_conditions(filters, metadata, &mut params)?;

    let mut select = Vec::new();
    let mut group_by = Vec::new();
    let mut plan = ColumnPlan {
        kind: intent.kind(),
        axis: None,
        series: None,
        measures: Vec::with_capacity(measures.len()),
    };

    if let Some(field) = &axis {
        let expr = match granularity {
            Some(unit) => Expr::bucket(unit, field.column()),
            None => field.column(),
        };
        select.push(expr.clone().alias(AXIS_ALIAS));
        group_by.push(expr);
        plan.axis = Some(PlannedColumn {
            alias: AXIS_ALIAS.into(),
            field: field.name().into(),
        });
    }

    if let Some(field) = &series {
        select.push(field.column().alias(SERIES_ALIAS));
        group_by.push(field.column());
        plan.series = Some(PlannedColumn {
            alias: SERIES_ALIAS.into(),
            field: field.name().into(),
        });
    }

    for (i, (agg, field)) in measures.iter().enumerate() {
        let alias = measure_alias(i);
        select.push(Expr::aggregate(agg.verb, field.column()).alias(&alias));
        plan.measures.push(PlannedMeasure {
            alias,
            field: field.name().into(),
            verb: agg.verb,
            label: agg.label.clone(),
            axis: agg.axis,
        });
    }

    let order_by = match plan.kind {
        ChartKind::Metric => Vec::new(),
        ChartKind::Pie => vec![Sort::desc(col(&measure_alias(0))).nulls_last()],
        ChartKind::Table => vec![Sort::asc(col(SERIES_ALIAS)).nulls_last()],
        ChartKind::Bar | ChartKind::Line | ChartKind::Area => {
            let mut order = vec![Sort::asc(col(AXIS_ALIAS)).nulls_last()];
            if series.is_some() {
                order.push(Sort::asc(col(SERIES_ALIAS)).nulls_last());
            }
            order
        }
    };

    let mut query = Query::new()
        .with_cte(base.to_cte(conditions))
        .select(select)
        .from(FromSource::table(BASE))
        .group_by(group_by)
        .order_by(order_by);
    if let Some(limit) = options.row_limit {
        query = query.limit(limit);
    }

    Ok(CompiledChart {
        query: CompiledQuery {
            sql: query.to_sql(options.dialect),
            params,
            dialect: options.dialect,
        },
        plan,
    })
}

/// Distinct non-null values of `field` under the base scope, for filter
/// pickers.
pub fn compile_filter_options(
    base: &BaseRelation,
    metadata: &DatasetMetadata,
    field: &str,
    limit: u64,
    dialect: Dialect,
) -> CompileResult<CompiledQuery> {
    let field = validate_field(field, metadata)?;
    let query = Query::new()
        .with_cte(base.to_cte(Vec::new()))
        .select(vec![field.column().alias(OPTION_ALIAS)])
        .distinct()
        .from(FromSource::table(BASE))
        .filter(field.column().is_not_null())
        .order_by(vec![Sort::asc(col(OPTION_ALIAS))])
        .limit(limit);

    Ok(CompiledQuery {
        sql: query.to_sql(dialect),
        params: Vec::new(),
        dialect,
    })
}

/// The first `limit` scoped rows of the dataset, unaggregated.
pub fn compile_preview(base: &BaseRelation, limit: u64, dialect: Dialect) -> CompiledQuery {
    let query = Query::new()
        .with_cte(base.to_cte(Vec::new()))
        .select_star()
        .from(FromSource::table(BASE))
        .limit(limit);

    CompiledQuery {
        sql: query.to_sql(dialect),
        params: Vec::new(),
        dialect,
    }
}
