//! Reshaping raw rows into chart payloads.
//!
//! The compiler's [`ColumnPlan`] says which output column holds the axis,
//! the series and each measure. Display labels live only in the plan and
//! are applied here.
//!
//! | Kind             | Payload                                   |
//! |------------------|-------------------------------------------|
//! | `bar/line/area`  | `{x: [...], series: [{axis, label, values}]}` |
//! | `pie`            | same as above                             |
//! | `metric`         | `{data: [{slug: value}]}`                 |
//! | `table`          | `{rows: [{label: value}]}`                |

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::compile::{ColumnPlan, PlannedMeasure};
use crate::executor::RowSet;
use crate::model::{ChartKind, YAxis};

/// Label used for a `NULL` axis or series value.
pub const NULL_LABEL: &str = "(null)";

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Result is missing column '{0}'")]
    MissingColumn(String),
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// One named series aligned to the `x` labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub axis: YAxis,
    pub label: String,
    /// Same length as `x`; gaps are `null`.
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_value: Option<String>,
}

/// Chart-ready data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartPayload {
    Axis { x: Vec<String>, series: Vec<Series> },
    Metric { data: Vec<Map<String, Value>> },
    Table { rows: Vec<Map<String, Value>> },
}

impl ChartPayload {
    pub fn empty_axis() -> Self {
        ChartPayload::Axis {
            x: Vec::new(),
            series: Vec::new(),
        }
    }
}

// ============================================================================
// Value rendering
// ============================================================================

/// Render an axis or series value as a label.
pub fn label_of(value: &Value) -> String {
    match value {
        Value::Null => NULL_LABEL.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => {
                let mut buffer = ryu::Buffer::new();
                buffer.format(f).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Grouping key for an axis or series value. `NULL` keeps its own key so
/// it never merges with a literal [`NULL_LABEL`] string.
fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(label_of(other)),
    }
}

/// Coerce a measure value to a JSON number or `null`.
///
/// Numeric strings (e.g. PostgreSQL `NUMERIC` sent as text) are parsed.
pub fn numeric_value(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Lower-case a label and collapse runs of non-alphanumerics into `_`.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for ch in label.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("value");
    }
    slug
}

/// Suffix repeated keys with `_2`, `_3`, ...
fn unique_keys<I: IntoIterator<Item = String>>(keys: I) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    keys.into_iter()
        .map(|key| {
            let mut candidate = key.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", key, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

// ============================================================================
// Normalization
// ============================================================================

fn index_of(rows: &RowSet, alias: &str) -> NormalizeResult<usize> {
    rows.column_index(alias)
        .ok_or_else(|| NormalizeError::MissingColumn(alias.to_string()))
}

fn measure_indices(rows: &RowSet, plan: &ColumnPlan) -> NormalizeResult<Vec<usize>> {
    plan.measures
        .iter()
        .map(|m| index_of(rows, &m.alias))
        .collect()
}

/// Reshape `rows` according to `plan`.
pub fn normalize(rows: &RowSet, plan: &ColumnPlan) -> NormalizeResult<ChartPayload> {
    match plan.kind {
        ChartKind::Metric => normalize_metric(rows, plan),
        ChartKind::Table => normalize_table(rows, plan),
        ChartKind::Bar | ChartKind::Line | ChartKind::Area | ChartKind::Pie => {
            normalize_axis(rows, plan)
        }
    }
}

fn normalize_metric(rows: &RowSet, plan: &ColumnPlan) -> NormalizeResult<ChartPayload> {
    let keys = unique_keys(plan.measures.iter().map(|m| slugify(&m.label)));
    let first = rows.rows.first();
    let indices = match first {
        Some(_) => measure_indices(rows, plan)?,
        None => Vec::new(),
    };

    let mut bundle = Map::new();
    for (i, key) in keys.into_iter().enumerate() {
        let value = match (first, indices.get(i)) {
            (Some(row), Some(&idx)) => row.get(idx).map(numeric_value).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        bundle.insert(key, value);
    }
    Ok(ChartPayload::Metric { data: vec![bundle] })
}

fn normalize_table(rows: &RowSet, plan: &ColumnPlan) -> NormalizeResult<ChartPayload> {
    let series = plan
        .series
        .as_ref()
        .map(|s| Ok::<_, NormalizeError>((s.field.clone(), index_of(rows, &s.alias)?)))
        .transpose()?;
    let indices = measure_indices(rows, plan)?;

    let keys = unique_keys(
        series
            .iter()
            .map(|(field, _)| field.clone())
            .chain(plan.measures.iter().map(|m| m.label.clone())),
    );
    let (series_key, measure_keys) = match series {
        Some(_) => (keys.first().cloned(), &keys[1..]),
        None => (None, &keys[..]),
    };

    let mut out = Vec::with_capacity(rows.row_count());
    for row in &rows.rows {
        let mut entry = Map::new();
        if let (Some(key), Some((_, idx))) = (&series_key, &series) {
            entry.insert(key.clone(), row.get(*idx).cloned().unwrap_or(Value::Null));
        }
        for (key, &idx) in measure_keys.iter().zip(&indices) {
            entry.insert(
                key.clone(),
                row.get(idx).map(numeric_value).unwrap_or(Value::Null),
            );
        }
        out.push(entry);
    }
    Ok(ChartPayload::Table { rows: out })
}

fn normalize_axis(rows: &RowSet, plan: &ColumnPlan) -> NormalizeResult<ChartPayload> {
    if rows.rows.is_empty() {
        return Ok(ChartPayload::empty_axis());
    }
    let Some(axis) = &plan.axis else {
        return Err(NormalizeError::MissingColumn("axis".to_string()));
    };
    let x_idx = index_of(rows, &axis.alias)?;
    let series_idx = plan
        .series
        .as_ref()
        .map(|s| index_of(rows, &s.alias))
        .transpose()?;
    let indices = measure_indices(rows, plan)?;

    // Distinct keys in row order.
    let mut x: Vec<String> = Vec::new();
    let mut x_pos: HashMap<Option<String>, usize> = HashMap::new();
    let mut keys: Vec<String> = Vec::new();
    let mut key_pos: HashMap<Option<String>, usize> = HashMap::new();
    let mut cells: Vec<(usize, usize, &Vec<Value>)> = Vec::with_capacity(rows.row_count());

    for row in &rows.rows {
        let x_value = row.get(x_idx).unwrap_or(&Value::Null);
        let xi = *x_pos.entry(group_key(x_value)).or_insert_with(|| {
            x.push(label_of(x_value));
            x.len() - 1
        });
        let si = match series_idx {
            Some(idx) => {
                let value = row.get(idx).unwrap_or(&Value::Null);
                *key_pos.entry(group_key(value)).or_insert_with(|| {
                    keys.push(label_of(value));
                    keys.len() - 1
                })
            }
            None => 0,
        };
        cells.push((xi, si, row));
    }

    let series = match series_idx {
        None => plan
            .measures
            .iter()
            .zip(&indices)
            .map(|(measure, &idx)| {
                let mut values = vec![Value::Null; x.len()];
                for (xi, _, row) in &cells {
                    values[*xi] = row.get(idx).map(numeric_value).unwrap_or(Value::Null);
                }
                Series {
                    axis: measure.axis,
                    label: measure.label.clone(),
                    values,
                    series_value: None,
                }
            })
            .collect(),
        Some(_) => {
            let mut out = Vec::with_capacity(plan.measures.len() * keys.len());
            for (measure, &idx) in plan.measures.iter().zip(&indices) {
                let mut grid = vec![vec![Value::Null; x.len()]; keys.len()];
                for (xi, si, row) in &cells {
                    grid[*si][*xi] = row.get(idx).map(numeric_value).unwrap_or(Value::Null);
                }
                for (key, values) in keys.iter().zip(grid) {
                    out.push(Series {
                        axis: measure.axis,
                        label: series_label(plan, measure, key),
                        values,
                        series_value: Some(key.clone()),
                    });
                }
            }
            out
        }
    };

    Ok(ChartPayload::Axis { x, series })
}

fn series_label(plan: &ColumnPlan, measure: &PlannedMeasure, series_value: &str) -> String {
    if plan.measures.len() == 1 {
        series_value.to_string()
    } else {
        format!("{} - {}", measure.label, series_value)
    }
}
