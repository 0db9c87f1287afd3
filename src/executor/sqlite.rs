//! Embedded SQLite backend.
//!
//! Connections are opened read-only and get a `MEDIAN` aggregate
//! registered. Statements run on the blocking pool; dropping the future
//! interrupts the running statement.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, InterruptHandle, OpenFlags, ToSql};

use super::{ColumnInfo, ExecutionError, ExecutionResult, QueryBackend, RowSet};
use crate::model::ParamValue;

impl ToSql for ParamValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ParamValue::Null => ToSqlOutput::Owned(Value::Null),
            ParamValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            ParamValue::Int(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            ParamValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            ParamValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

// ============================================================================
// MEDIAN aggregate
// ============================================================================

struct Median;

impl Aggregate<Vec<f64>, Option<f64>> for Median {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<Vec<f64>> {
        Ok(Vec::new())
    }

    fn step(&self, ctx: &mut Context<'_>, values: &mut Vec<f64>) -> rusqlite::Result<()> {
        let value = match ctx.get_raw(0) {
            ValueRef::Integer(n) => Some(n as f64),
            ValueRef::Real(f) => Some(f),
            ValueRef::Text(t) => std::str::from_utf8(t)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok()),
            ValueRef::Null | ValueRef::Blob(_) => None,
        };
        if let Some(v) = value.filter(|v| v.is_finite()) {
            values.push(v);
        }
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        values: Option<Vec<f64>>,
    ) -> rusqlite::Result<Option<f64>> {
        Ok(values.and_then(median_of))
    }
}

fn median_of(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Register painel's SQL functions on a connection.
pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_aggregate_function(
        "MEDIAN",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        Median,
    )
}

// ============================================================================
// Statement execution
// ============================================================================

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => serde_json::Value::Null,
        ValueRef::Integer(n) => serde_json::Value::from(n),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

fn storage_class(value: ValueRef<'_>) -> Option<&'static str> {
    match value {
        ValueRef::Integer(_) => Some("integer"),
        ValueRef::Real(_) => Some("real"),
        ValueRef::Text(_) => Some("text"),
        ValueRef::Blob(_) => Some("blob"),
        ValueRef::Null => None,
    }
}

fn run(
    conn: &Connection,
    sql: &str,
    params: &[ParamValue],
    row_cap: usize,
) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let mut columns: Vec<ColumnInfo> = stmt
        .columns()
        .iter()
        .map(|c| {
            ColumnInfo::new(
                c.name(),
                c.decl_type().map(str::to_ascii_lowercase).unwrap_or_default(),
            )
        })
        .collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(params.iter()))?;
    while rows.len() < row_cap {
        let Some(row) = cursor.next()? else { break };
        let mut values = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter_mut().enumerate() {
            let value = row.get_ref(i)?;
            // Expression columns have no declared type; use the first
            // row's storage class instead.
            if column.database_type.is_empty() {
                if let Some(class) = storage_class(value) {
                    column.database_type = class.to_string();
                }
            }
            values.push(to_json(value));
        }
        rows.push(values);
    }

    Ok(RowSet { columns, rows })
}

/// Interrupts the statement unless disarmed first.
struct InterruptOnDrop(Option<InterruptHandle>);

impl InterruptOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.interrupt();
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// A read-only SQLite database file.
pub struct SqliteBackend {
    connection_id: String,
    path: String,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl SqliteBackend {
    /// Accepts a plain path or a `sqlite://` URL.
    pub fn new(connection_id: &str, connection_string: &str, max_idle: usize) -> Self {
        let path = connection_string
            .strip_prefix("sqlite://")
            .unwrap_or(connection_string)
            .to_string();
        Self {
            connection_id: connection_id.to_string(),
            path,
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn open(&self) -> ExecutionResult<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|e| ExecutionError::unavailable(&self.connection_id, e))?;
        register_functions(&conn)
            .map_err(|e| ExecutionError::unavailable(&self.connection_id, e))?;
        Ok(conn)
    }

    fn checkout(&self) -> ExecutionResult<Connection> {
        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        match reused {
            Some(conn) => Ok(conn),
            None => self.open(),
        }
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(conn);
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    async fn execute(
        &self,
        sql: &str,
        params: &[ParamValue],
        row_cap: usize,
    ) -> ExecutionResult<RowSet> {
        let conn = self.checkout()?;
        let guard = InterruptOnDrop(Some(conn.get_interrupt_handle()));

        let sql = sql.to_string();
        let params = params.to_vec();
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = run(&conn, &sql, &params, row_cap);
            (conn, result)
        })
        .await
        .map_err(|e| ExecutionError::QueryFailed(format!("sqlite task failed: {}", e)))?;
        guard.disarm();

        let rows = result.map_err(|e| ExecutionError::QueryFailed(e.to_string()));
        self.checkin(conn);
        rows
    }
}
