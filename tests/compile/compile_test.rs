//! Integration tests for block configuration → scoped SQL compilation.
//!
//! These tests go through `resolve_intent` and `compile` the way the engine
//! does, and check the statement shape per dialect:
//! - `base` CTE wraps the raw dataset and carries every row restriction
//! - identifiers are quoted, values are bound parameters
//! - placeholders follow the dialect (`$n` or `?n`)

use painel::compile::{
    compile, compile_filter_options, resolve_intent, BaseRelation, CompileError, CompileOptions,
    TenantScope,
};
use painel::model::{
    BlockConfig, ColumnMetadata, Dataset, DatasetMetadata, DynamicFilter, FilterOp, ParamValue,
    RawAggregation, SemanticType,
};
use painel::sql::Dialect;
use painel::validation::ValidationError;
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

fn vendas() -> Dataset {
    Dataset::new(
        "vendas",
        "Vendas",
        "SELECT data_venda, produto, valor, loja_id FROM vendas",
        "local",
    )
}

fn metadata() -> DatasetMetadata {
    DatasetMetadata::new(vec![
        ColumnMetadata::new("data_venda", SemanticType::Datetime, "date"),
        ColumnMetadata::new("produto", SemanticType::Dimension, "text"),
        ColumnMetadata::new("valor", SemanticType::Measure, "real"),
        ColumnMetadata::new("loja_id", SemanticType::Identifier, "integer"),
    ])
}

fn agg(field: &str, aggregation: &str, label: &str) -> RawAggregation {
    RawAggregation {
        field: field.into(),
        aggregation: aggregation.into(),
        label: label.into(),
        axis: None,
    }
}

fn monthly_bar() -> BlockConfig {
    BlockConfig {
        chart_type: "bar".into(),
        x_axis_field: Some("data_venda".into()),
        x_axis_granularity: Some("month".into()),
        y_axis_fields: vec![agg("valor", "sum", "Total")],
        ..Default::default()
    }
}

fn compile_block(
    config: &BlockConfig,
    scope: TenantScope,
    filters: &[DynamicFilter],
    dialect: Dialect,
) -> Result<painel::compile::CompiledChart, CompileError> {
    let intent = resolve_intent(config)?;
    let base = BaseRelation::new(&vendas(), scope)?;
    let options = CompileOptions::default()
        .with_dialect(dialect)
        .with_row_limit(5001);
    compile(&base, &metadata(), &intent, filters, &options)
}

// ============================================================================
// Statement Shape
// ============================================================================

#[test]
fn test_monthly_bar_postgres() {
    let chart = compile_block(
        &monthly_bar(),
        TenantScope::unrestricted(),
        &[],
        Dialect::Postgres,
    )
    .unwrap();
    let sql = &chart.query.sql;
    println!("Generated SQL:\n{}", sql);

    assert!(sql.starts_with("WITH \"base\" AS"), "{}", sql);
    assert!(sql.contains("SELECT data_venda, produto, valor, loja_id FROM vendas"));
    assert!(sql.contains(") AS \"__source\""));
    assert!(sql.contains("DATE_TRUNC('month', \"data_venda\") AS \"__x\""));
    assert!(sql.contains("SUM(\"valor\") AS \"__m0\""));
    assert!(sql.contains("FROM \"base\""));
    assert!(sql.contains("GROUP BY DATE_TRUNC('month', \"data_venda\")"));
    assert!(sql.contains("ORDER BY \"__x\" ASC NULLS LAST"));
    assert!(sql.ends_with("LIMIT 5001"));
    assert!(chart.query.params.is_empty());
}

#[test]
fn test_monthly_bar_sqlite_uses_strftime() {
    let chart = compile_block(
        &monthly_bar(),
        TenantScope::unrestricted(),
        &[],
        Dialect::Sqlite,
    )
    .unwrap();
    assert!(
        chart
            .query
            .sql
            .contains("STRFTIME('%Y-%m-01', \"data_venda\") AS \"__x\""),
        "{}",
        chart.query.sql
    );
}

#[test]
fn test_tenant_scope_is_inside_base() {
    let chart = compile_block(
        &monthly_bar(),
        TenantScope::predicate("loja_id = 3"),
        &[],
        Dialect::Postgres,
    )
    .unwrap();
    let sql = &chart.query.sql;

    let scope_at = sql.find("(loja_id = 3)").expect("scope predicate present");
    let outer_from = sql.rfind("FROM \"base\"").expect("outer select present");
    assert!(scope_at < outer_from, "{}", sql);
}

#[test]
fn test_filters_are_parameters_per_dialect() {
    let filters = vec![
        DynamicFilter::from_param("data_venda", FilterOp::Gte, "2024-01-01", "date"),
        DynamicFilter::from_param("loja_id", FilterOp::In, "1, 2", "integer"),
    ];

    let pg = compile_block(
        &monthly_bar(),
        TenantScope::predicate("loja_id <> 9"),
        &filters,
        Dialect::Postgres,
    )
    .unwrap();
    assert!(
        pg.query
            .sql
            .contains("WHERE (loja_id <> 9) AND \"data_venda\" >= $1 AND \"loja_id\" IN ($2, $3)"),
        "{}",
        pg.query.sql
    );
    assert_eq!(
        pg.query.params,
        vec![
            ParamValue::Text("2024-01-01".into()),
            ParamValue::Int(1),
            ParamValue::Int(2)
        ]
    );

    let lite = compile_block(
        &monthly_bar(),
        TenantScope::unrestricted(),
        &filters,
        Dialect::Sqlite,
    )
    .unwrap();
    assert!(lite.query.sql.contains("\"loja_id\" IN (?2, ?3)"), "{}", lite.query.sql);
    assert!(!lite.query.sql.contains("2024-01-01"));
}

#[test]
fn test_hostile_filter_value_stays_a_parameter() {
    let filters = vec![DynamicFilter::from_param(
        "produto",
        FilterOp::Eq,
        "x' OR 1=1 --",
        "text",
    )];
    let chart = compile_block(
        &monthly_bar(),
        TenantScope::unrestricted(),
        &filters,
        Dialect::Postgres,
    )
    .unwrap();
    assert!(!chart.query.sql.contains("OR 1=1"));
    assert_eq!(
        chart.query.params,
        vec![ParamValue::Text("x' OR 1=1 --".into())]
    );
}

#[test]
fn test_series_and_median_postgres() {
    let config = BlockConfig {
        chart_type: "line".into(),
        x_axis_field: Some("data_venda".into()),
        series_field: Some("produto".into()),
        y_axis_fields: vec![agg("valor", "median", "Mediana")],
        ..Default::default()
    };
    let chart = compile_block(&config, TenantScope::unrestricted(), &[], Dialect::Postgres)
        .unwrap();
    let sql = &chart.query.sql;
    assert!(sql.contains("\"produto\" AS \"__s\""), "{}", sql);
    assert!(sql.contains("PERCENTILE_CONT(0.5) WITHIN GROUP ("), "{}", sql);
    assert!(sql.contains("ORDER BY \"__x\" ASC NULLS LAST, \"__s\" ASC NULLS LAST"));
    assert_eq!(chart.plan.series.as_ref().unwrap().field, "produto");
}

#[test]
fn test_filter_options_query() {
    let base = BaseRelation::new(&vendas(), TenantScope::predicate("loja_id = 3")).unwrap();
    let query = compile_filter_options(&base, &metadata(), "produto", 200, Dialect::Sqlite).unwrap();
    assert!(query.sql.contains("SELECT DISTINCT"));
    assert!(query.sql.contains("(loja_id = 3)"));
    assert!(query.sql.ends_with("LIMIT 200"));
    assert!(query.params.is_empty());
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_unknown_field_is_rejected() {
    let mut config = monthly_bar();
    config.x_axis_field = Some("data\"; DROP TABLE vendas; --".into());
    let err = compile_block(&config, TenantScope::unrestricted(), &[], Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Validation(ValidationError::FieldNotFound { .. })
    ));
}

#[test]
fn test_identifier_cannot_be_summed() {
    let config = BlockConfig {
        chart_type: "metric".into(),
        y_axis_fields: vec![agg("loja_id", "sum", "Lojas")],
        ..Default::default()
    };
    let err = compile_block(&config, TenantScope::unrestricted(), &[], Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Validation(ValidationError::AggregationNotAllowed { .. })
    ));
}

#[test]
fn test_granularity_needs_datetime_axis() {
    let mut config = monthly_bar();
    config.x_axis_field = Some("produto".into());
    let err = compile_block(&config, TenantScope::unrestricted(), &[], Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Validation(ValidationError::GranularityNotApplicable { .. })
    ));
}

#[test]
fn test_shape_errors_name_the_field() {
    let config = BlockConfig {
        chart_type: "pie".into(),
        x_axis_field: Some("produto".into()),
        series_field: Some("loja_id".into()),
        y_axis_fields: vec![agg("valor", "sum", "Total")],
        ..Default::default()
    };
    match compile_block(&config, TenantScope::unrestricted(), &[], Dialect::Postgres) {
        Err(CompileError::InvalidChartConfiguration { field, .. }) => {
            assert_eq!(field, "series_field")
        }
        other => panic!("expected a configuration error, got {:?}", other),
    }

    let no_measures = BlockConfig {
        chart_type: "bar".into(),
        x_axis_field: Some("produto".into()),
        ..Default::default()
    };
    assert!(matches!(
        compile_block(&no_measures, TenantScope::unrestricted(), &[], Dialect::Postgres),
        Err(CompileError::InvalidChartConfiguration { .. })
    ));
}

#[test]
fn test_inactive_dataset() {
    let mut dataset = vendas();
    dataset.active = false;
    assert!(matches!(
        BaseRelation::new(&dataset, TenantScope::unrestricted()),
        Err(CompileError::DatasetInactive(_))
    ));
}

#[test]
fn test_compile_is_idempotent() {
    let filters = vec![DynamicFilter::from_param("produto", FilterOp::In, "cafe,pao", "text")];
    let scope = TenantScope::predicate("loja_id = 3");
    let a = compile_block(&monthly_bar(), scope.clone(), &filters, Dialect::Postgres).unwrap();
    let b = compile_block(&monthly_bar(), scope, &filters, Dialect::Postgres).unwrap();
    assert_eq!(a.query.sql, b.query.sql);
    assert_eq!(a.query.params, b.query.params);
}

// ============================================================================
// Properties
// ============================================================================

const COLUMNS: [&str; 4] = ["data_venda", "produto", "valor", "loja_id"];

proptest! {
    /// Any field name outside the dataset's columns is rejected, wherever it
    /// appears in the block, and so never reaches statement text.
    #[test]
    fn prop_unknown_field_names_never_compile(
        name in "[a-z_\"';() =*-]{1,24}",
        slot in 0usize..3,
    ) {
        let trimmed = name.trim();
        prop_assume!(!trimmed.is_empty() && !COLUMNS.contains(&trimmed));

        let mut config = BlockConfig {
            chart_type: "bar".into(),
            x_axis_field: Some("produto".into()),
            series_field: Some("loja_id".into()),
            y_axis_fields: vec![agg("valor", "sum", "Total")],
            ..Default::default()
        };
        match slot {
            0 => config.x_axis_field = Some(name.clone()),
            1 => config.series_field = Some(name.clone()),
            _ => config.y_axis_fields[0].field = name.clone(),
        }

        let result = compile_block(&config, TenantScope::unrestricted(), &[], Dialect::Postgres);
        prop_assert!(result.is_err(), "compiled with field {:?}", name);
    }

    /// Filter values only ever travel as parameters.
    #[test]
    fn prop_filter_values_stay_out_of_sql(value in "[a-zA-Z0-9][a-zA-Z0-9' ;-]{2,23}") {
        let filters = vec![DynamicFilter::from_param("produto", FilterOp::Eq, &value, "text")];
        let chart = compile_block(
            &monthly_bar(),
            TenantScope::predicate("loja_id = 3"),
            &filters,
            Dialect::Sqlite,
        )
        .unwrap();

        prop_assert!(chart.query.sql.contains("(loja_id = 3)"));
        prop_assert!(chart.query.sql.contains("\"produto\" = ?1"));
        prop_assert_eq!(chart.query.params, vec![ParamValue::Text(value.trim().to_string())]);
    }
}
