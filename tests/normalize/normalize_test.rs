//! Integration tests for reshaping compiled result rows into chart payloads.
//!
//! Each test compiles a block configuration to get its column plan, then
//! feeds hand-built rows (as a backend would return them) through
//! `normalize`.

use painel::compile::{compile, resolve_intent, BaseRelation, ColumnPlan, CompileOptions, TenantScope};
use painel::executor::{ColumnInfo, RowSet};
use painel::model::{
    BlockConfig, ColumnMetadata, Dataset, DatasetMetadata, RawAggregation, SemanticType,
};
use painel::normalize::{normalize, ChartPayload, NULL_LABEL};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn metadata() -> DatasetMetadata {
    DatasetMetadata::new(vec![
        ColumnMetadata::new("mes", SemanticType::Dimension, "text"),
        ColumnMetadata::new("produto", SemanticType::Dimension, "text"),
        ColumnMetadata::new("valor", SemanticType::Measure, "real"),
        ColumnMetadata::new("quantidade", SemanticType::Measure, "integer"),
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

fn plan_for(config: BlockConfig) -> ColumnPlan {
    let dataset = Dataset::new("vendas", "Vendas", "SELECT * FROM vendas", "local");
    let base = BaseRelation::new(&dataset, TenantScope::unrestricted()).unwrap();
    let intent = resolve_intent(&config).unwrap();
    compile(&base, &metadata(), &intent, &[], &CompileOptions::default())
        .unwrap()
        .plan
}

fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> RowSet {
    RowSet {
        columns: columns.iter().map(|c| ColumnInfo::new(*c, "")).collect(),
        rows: data,
    }
}

fn bar(series: Option<&str>, measures: Vec<RawAggregation>) -> BlockConfig {
    BlockConfig {
        chart_type: "bar".into(),
        x_axis_field: Some("mes".into()),
        series_field: series.map(str::to_string),
        y_axis_fields: measures,
        ..Default::default()
    }
}

// ============================================================================
// Axis charts
// ============================================================================

#[test]
fn test_series_are_aligned_and_gaps_are_null() {
    let plan = plan_for(bar(Some("produto"), vec![agg("valor", "sum", "Total")]));
    let result = rows(
        &["__x", "__s", "__m0"],
        vec![
            vec![json!("2024-01"), json!("cafe"), json!(10)],
            vec![json!("2024-01"), json!("pao"), json!(4)],
            vec![json!("2024-02"), json!("pao"), json!(6)],
        ],
    );

    let payload = normalize(&result, &plan).unwrap();
    insta::assert_snapshot!(
        serde_json::to_string(&payload).unwrap(),
        @r#"{"x":["2024-01","2024-02"],"series":[{"axis":"y1","label":"cafe","values":[10,null],"series_value":"cafe"},{"axis":"y1","label":"pao","values":[4,6],"series_value":"pao"}]}"#
    );
}

#[test]
fn test_multiple_measures_with_series_are_prefixed_by_label() {
    let plan = plan_for(bar(
        Some("produto"),
        vec![agg("valor", "sum", "Total"), agg("quantidade", "sum", "Itens")],
    ));
    let result = rows(
        &["__x", "__s", "__m0", "__m1"],
        vec![
            vec![json!("2024-01"), json!("cafe"), json!(10), json!(2)],
            vec![json!("2024-01"), Value::Null, json!(3), json!(1)],
        ],
    );

    let ChartPayload::Axis { x, series } = normalize(&result, &plan).unwrap() else {
        panic!("expected an axis payload");
    };
    assert_eq!(x, vec!["2024-01"]);
    let labels: Vec<_> = series.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Total - cafe",
            &format!("Total - {}", NULL_LABEL),
            "Itens - cafe",
            &format!("Itens - {}", NULL_LABEL),
        ]
    );
    assert_eq!(series[3].values, vec![json!(1)]);
}

#[test]
fn test_axis_keeps_row_order_and_parses_numeric_text() {
    let plan = plan_for(bar(None, vec![agg("valor", "sum", "Total")]));
    let result = rows(
        &["__x", "__m0"],
        vec![
            vec![json!("2024-03"), json!("12.50")],
            vec![json!("2024-01"), json!(7)],
        ],
    );

    let ChartPayload::Axis { x, series } = normalize(&result, &plan).unwrap() else {
        panic!("expected an axis payload");
    };
    assert_eq!(x, vec!["2024-03", "2024-01"]);
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].values, vec![json!(12.5), json!(7)]);
    assert!(series[0].series_value.is_none());
}

#[test]
fn test_null_and_null_looking_text_stay_apart() {
    let plan = plan_for(bar(Some("produto"), vec![agg("valor", "sum", "Total")]));
    let result = rows(
        &["__x", "__s", "__m0"],
        vec![
            vec![json!("2024-01"), Value::Null, json!(3)],
            vec![json!("2024-01"), json!(NULL_LABEL), json!(8)],
            vec![json!(NULL_LABEL), json!("cafe"), json!(1)],
            vec![Value::Null, json!("cafe"), json!(2)],
        ],
    );

    let ChartPayload::Axis { x, series } = normalize(&result, &plan).unwrap() else {
        panic!("expected an axis payload");
    };
    assert_eq!(x, vec!["2024-01", NULL_LABEL, NULL_LABEL]);
    assert_eq!(series.len(), 3);
    assert_eq!(series[0].values, vec![json!(3), Value::Null, Value::Null]);
    assert_eq!(series[1].values, vec![json!(8), Value::Null, Value::Null]);
    assert_eq!(series[2].values, vec![Value::Null, json!(1), json!(2)]);
}

#[test]
fn test_empty_result_gives_empty_axis() {
    let plan = plan_for(bar(None, vec![agg("valor", "sum", "Total")]));
    let payload = normalize(&rows(&["__x", "__m0"], vec![]), &plan).unwrap();
    assert_eq!(
        serde_json::to_value(payload).unwrap(),
        json!({"x": [], "series": []})
    );
}

// ============================================================================
// Metric and table
// ============================================================================

#[test]
fn test_metric_bundles_measures_by_slug() {
    let plan = plan_for(BlockConfig {
        chart_type: "metric".into(),
        y_axis_fields: vec![
            agg("valor", "sum", "Receita Total"),
            agg("valor", "avg", "Receita total"),
        ],
        ..Default::default()
    });
    let result = rows(&["__m0", "__m1"], vec![vec![json!(100), json!(25.5)]]);

    let payload = normalize(&result, &plan).unwrap();
    assert_eq!(
        serde_json::to_value(payload).unwrap(),
        json!({"data": [{"receita_total": 100, "receita_total_2": 25.5}]})
    );

    let empty = normalize(&rows(&["__m0", "__m1"], vec![]), &plan).unwrap();
    assert_eq!(
        serde_json::to_value(empty).unwrap(),
        json!({"data": [{"receita_total": null, "receita_total_2": null}]})
    );
}

#[test]
fn test_table_rows_are_keyed_by_field_and_label() {
    let plan = plan_for(BlockConfig {
        chart_type: "table".into(),
        series_field: Some("produto".into()),
        y_axis_fields: vec![agg("valor", "sum", "Total"), agg("quantidade", "count", "")],
        ..Default::default()
    });
    let result = rows(
        &["__s", "__m0", "__m1"],
        vec![
            vec![json!("cafe"), json!(10), json!(2)],
            vec![json!("pao"), Value::Null, json!(0)],
        ],
    );

    let payload = normalize(&result, &plan).unwrap();
    assert_eq!(
        serde_json::to_value(payload).unwrap(),
        json!({"rows": [
            {"produto": "cafe", "Total": 10, "quantidade": 2},
            {"produto": "pao", "Total": null, "quantidade": 0}
        ]})
    );
}

#[test]
fn test_missing_measure_column_is_an_error() {
    let plan = plan_for(bar(None, vec![agg("valor", "sum", "Total")]));
    let result = rows(&["__x"], vec![vec![json!("2024-01")]]);
    assert!(normalize(&result, &plan).is_err());
}

// ============================================================================
// Properties
// ============================================================================

const MONTHS: [&str; 4] = ["2024-01", "2024-02", NULL_LABEL, "2024-03"];
const PRODUCTS: [&str; 3] = ["cafe", "pao", NULL_LABEL];

fn cell(labels: &[&str], pick: Option<usize>) -> Value {
    pick.map_or(Value::Null, |i| json!(labels[i]))
}

/// Distinct picks in order of first appearance.
fn first_seen(picks: impl Iterator<Item = Option<usize>>) -> Vec<Option<usize>> {
    let mut seen = Vec::new();
    for pick in picks {
        if !seen.contains(&pick) {
            seen.push(pick);
        }
    }
    seen
}

proptest! {
    /// Every series is as long as `x`, absent cells are null and `x`
    /// follows the order values first appear in the result.
    #[test]
    fn prop_series_align_to_axis(
        picks in prop::collection::vec(
            (prop::option::of(0usize..4), prop::option::of(0usize..3), 1i64..100),
            0..24,
        ),
    ) {
        let plan = plan_for(bar(Some("produto"), vec![agg("valor", "sum", "Total")]));
        let result = rows(
            &["__x", "__s", "__m0"],
            picks
                .iter()
                .map(|(m, p, v)| vec![cell(&MONTHS, *m), cell(&PRODUCTS, *p), json!(v)])
                .collect(),
        );

        let ChartPayload::Axis { x, series } = normalize(&result, &plan).unwrap() else {
            panic!("expected an axis payload");
        };

        let months = first_seen(picks.iter().map(|(m, _, _)| *m));
        let products = first_seen(picks.iter().map(|(_, p, _)| *p));
        let expected_x: Vec<String> = months
            .iter()
            .map(|m| m.map_or(NULL_LABEL, |i| MONTHS[i]).to_string())
            .collect();
        prop_assert_eq!(&x, &expected_x);
        prop_assert_eq!(series.len(), products.len());

        for (si, product) in products.iter().enumerate() {
            prop_assert_eq!(series[si].values.len(), x.len());
            for (xi, month) in months.iter().enumerate() {
                let last = picks
                    .iter()
                    .filter(|(m, p, _)| m == month && p == product)
                    .last();
                match last {
                    Some((_, _, v)) => prop_assert_eq!(&series[si].values[xi], &json!(v)),
                    None => prop_assert!(series[si].values[xi].is_null()),
                }
            }
        }
    }
}
