//! End-to-end tests for dashboard rendering against a real SQLite file.
//!
//! Each test builds a small `vendas` database in a temp dir, loads a TOML
//! catalog over it and renders through the `Engine`. A counting wrapper
//! around the SQLite backend records every database round-trip.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use painel::cache::MetadataCache;
use painel::config::{ConnectionRecord, Driver, ExecutorSettings};
use painel::dashboard::{DashboardResponse, Engine, EngineError, StaticCatalog};
use painel::executor::{ExecutionResult, Executor, QueryBackend, RowSet, SqliteBackend};
use painel::model::ParamValue;
use painel::normalize::ChartPayload;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

const CATALOG: &str = r#"
admins = ["operacao"]

[[datasets]]
id = "vendas"
name = "Vendas"
connection = "local"
query = "SELECT data_venda, produto, valor, loja_id FROM vendas"

[[datasets]]
id = "quebrado"
name = "Quebrado"
connection = "local"
query = "SELECT produto, valor FROM tabela_inexistente"

[[templates]]
id = "comercial"
name = "Comercial"
filterable_fields = { temporal = { field = "data_venda", label = "Data" }, categorical = [{ field = "produto", label = "Produto" }] }

[[templates.blocks]]
id = "mensal"
title = "Vendas por mês"
order = 1
dataset = "vendas"
layout = { col_span = 8 }
chart = { chart_type = "bar", x_axis_field = "data_venda", x_axis_granularity = "month", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }

[[templates.blocks]]
id = "total"
title = "Total"
order = 0
dataset = "vendas"
chart = { chart_type = "metric", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }
metric_format = { prefix = "R$ ", decimal_places = 2 }

[[templates.blocks]]
id = "falho"
title = "Falho"
order = 2
dataset = "quebrado"
chart = { chart_type = "metric", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }

[[templates.blocks]]
id = "lucro"
title = "Lucro"
order = 3
dataset = "vendas"
active = false
chart = { chart_type = "metric", y_axis_fields = [{ field = "lucro", aggregation = "sum", label = "Lucro" }] }

[[instances]]
id = "comercial-geral"
template = "comercial"
unit = { id = "geral", name = "Geral" }

[[instances]]
id = "comercial-loja1"
template = "comercial"
unit = { id = "loja1", name = "Loja 1", code = "L1" }
tenant_filter = "loja_id = 1"
users = ["ana"]
"#;

/// Wraps the SQLite backend and counts statements sent to it.
struct CountingBackend {
    inner: SqliteBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryBackend for CountingBackend {
    async fn execute(
        &self,
        sql: &str,
        params: &[ParamValue],
        row_cap: usize,
    ) -> ExecutionResult<RowSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql, params, row_cap).await
    }
}

struct Fixture {
    _dir: TempDir,
    db_path: String,
    executor: Arc<Executor>,
    cache: Arc<MetadataCache>,
    backend: Arc<CountingBackend>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("vendas.db").to_string_lossy().into_owned();

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE vendas (
                id INTEGER PRIMARY KEY,
                data_venda DATE,
                produto TEXT,
                valor REAL,
                loja_id INTEGER
            );
            INSERT INTO vendas (data_venda, produto, valor, loja_id) VALUES
                ('2024-01-05', 'cafe', 10.0, 1),
                ('2024-01-20', 'pao', 4.0, 2),
                ('2024-02-03', 'cafe', 6.0, 1),
                ('2024-02-15', 'pao', 5.0, 2),
                ('2024-03-01', 'cafe', 20.0, 2);",
        )
        .unwrap();
        drop(conn);

        let executor = Arc::new(Executor::new(ExecutorSettings::default()));
        let backend = Arc::new(CountingBackend {
            inner: SqliteBackend::new("local", &db_path, 2),
            calls: AtomicUsize::new(0),
        });
        executor.register_backend("local", backend.clone());

        Self {
            _dir: dir,
            db_path,
            executor,
            cache: Arc::new(MetadataCache::in_memory()),
            backend,
        }
    }

    fn engine_with(&self, catalog_toml: &str) -> Engine {
        let connections = vec![ConnectionRecord::new("local", Driver::Sqlite, &self.db_path)];
        let catalog = StaticCatalog::from_toml_str(catalog_toml, connections).unwrap();
        Engine::new(Arc::new(catalog), self.executor.clone(), self.cache.clone())
    }

    fn engine(&self) -> Engine {
        self.engine_with(CATALOG)
    }
}

fn block_data<'a>(response: &'a DashboardResponse, id: &str) -> &'a ChartPayload {
    response.data[id]
        .as_ref()
        .unwrap_or_else(|| panic!("block '{}' has no data", id))
}

// ============================================================================
// Dashboard rendering
// ============================================================================

#[tokio::test]
async fn test_render_dashboard() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let response = engine
        .render_dashboard("comercial-geral", None, &[])
        .await
        .unwrap();

    assert_eq!(response.template_name, "Comercial");
    assert_eq!(response.unit.name, "Geral");

    let ids: Vec<_> = response.blocks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["total", "mensal", "falho"]);

    assert_eq!(
        serde_json::to_value(block_data(&response, "mensal")).unwrap(),
        json!({
            "x": ["2024-01-01", "2024-02-01", "2024-03-01"],
            "series": [{"axis": "y1", "label": "Total", "values": [14.0, 11.0, 20.0]}]
        })
    );
    assert_eq!(
        serde_json::to_value(block_data(&response, "total")).unwrap(),
        json!({"data": [{"total": 45.0}]})
    );

    let total = &response.blocks[0];
    assert_eq!(total.chart["type"], "metric");
    assert_eq!(total.chart["metricPrefix"], "R$ ");
    assert_eq!(response.blocks[1].layout.col_span, 8);
}

#[tokio::test]
async fn test_failing_block_is_isolated() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let response = engine
        .render_dashboard("comercial-geral", None, &[])
        .await
        .unwrap();

    let failed = response.blocks.iter().find(|b| b.id == "falho").unwrap();
    assert!(!failed.success);
    assert!(failed.data.is_none());
    assert_eq!(failed.error.as_ref().unwrap().kind, "introspection_error");
    assert_eq!(response.data["falho"], None);

    assert!(response
        .blocks
        .iter()
        .filter(|b| b.id != "falho")
        .all(|b| b.success));
}

#[tokio::test]
async fn test_tenant_scope_restricts_rows() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let response = engine
        .render_dashboard("comercial-loja1", Some("ana"), &[])
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(block_data(&response, "total")).unwrap(),
        json!({"data": [{"total": 16.0}]})
    );
    let ChartPayload::Axis { x, .. } = block_data(&response, "mensal") else {
        panic!("expected an axis payload");
    };
    assert_eq!(x, &vec!["2024-01-01".to_string(), "2024-02-01".to_string()]);
}

#[tokio::test]
async fn test_invisible_instance_is_not_found() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    for principal in [None, Some("bruno")] {
        let err = engine
            .render_dashboard("comercial-loja1", principal, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert_eq!(err.status(), 404);
    }
    assert_eq!(fixture.backend.calls(), 0);
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_only_filterable_fields_are_applied() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let params = vec![
        ("produto__eq".to_string(), "cafe".to_string()),
        ("valor__gt".to_string(), "1000".to_string()),
        ("page".to_string(), "2".to_string()),
    ];
    let response = engine
        .render_dashboard("comercial-geral", None, &params)
        .await
        .unwrap();

    assert_eq!(response.filters.applied.len(), 1);
    assert_eq!(response.filters.applied[0].field, "produto");
    assert_eq!(
        serde_json::to_value(block_data(&response, "total")).unwrap(),
        json!({"data": [{"total": 36.0}]})
    );

    let available = &response.filters.available;
    assert_eq!(available.len(), 2);
    assert_eq!(available[0].field, "data_venda");
    assert_eq!(available[1].label, "Produto");
    assert_eq!(available[1].values, vec![json!("cafe"), json!("pao")]);
}

#[tokio::test]
async fn test_hostile_filter_value_matches_nothing() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let params = vec![("produto__eq".to_string(), "x' OR '1'='1".to_string())];
    let response = engine
        .render_dashboard("comercial-geral", None, &params)
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(block_data(&response, "mensal")).unwrap(),
        json!({"x": [], "series": []})
    );
    assert_eq!(
        serde_json::to_value(block_data(&response, "total")).unwrap(),
        json!({"data": [{"total": null}]})
    );
}

#[tokio::test]
async fn test_blank_in_list_is_ignored() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    for raw in [",", "", " , "] {
        let params = vec![("produto__in".to_string(), raw.to_string())];
        let response = engine
            .render_dashboard("comercial-geral", None, &params)
            .await
            .unwrap();

        assert!(response.filters.applied.is_empty(), "{:?}", raw);
        assert!(response.blocks.iter().filter(|b| b.id != "falho").all(|b| b.success));
        assert_eq!(
            serde_json::to_value(block_data(&response, "total")).unwrap(),
            json!({"data": [{"total": 45.0}]})
        );
    }
}

#[tokio::test]
async fn test_date_range_filter() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let params = vec![
        ("data_venda__gte".to_string(), "2024-02-01".to_string()),
        ("data_venda__lt".to_string(), "2024-03-01".to_string()),
    ];
    let response = engine
        .render_dashboard("comercial-geral", None, &params)
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(block_data(&response, "total")).unwrap(),
        json!({"data": [{"total": 11.0}]})
    );
}

// ============================================================================
// Single blocks and metadata
// ============================================================================

#[tokio::test]
async fn test_unknown_field_fails_without_round_trip() {
    let fixture = Fixture::new();
    let toml = CATALOG.replace(
        "id = \"lucro\"\ntitle = \"Lucro\"\norder = 3\ndataset = \"vendas\"\nactive = false",
        "id = \"lucro\"\ntitle = \"Lucro\"\norder = 3\ndataset = \"vendas\"",
    );
    let engine = fixture.engine_with(&toml);

    engine.dataset_metadata("vendas", false).await.unwrap();
    let before = fixture.backend.calls();

    let err = engine
        .render_block("lucro", None, Some("operacao"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(err.status(), 400);
    assert_eq!(fixture.backend.calls(), before);
}

#[tokio::test]
async fn test_inactive_block_is_not_found() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let err = engine.render_block("lucro", None, None).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_unscoped_block_requires_admin() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    for principal in [None, Some("ana")] {
        let err = engine
            .render_block("total", None, principal)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.status(), 404);
    }
    assert_eq!(fixture.backend.calls(), 0);

    let payload = engine
        .render_block("total", None, Some("operacao"))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(payload).unwrap(),
        json!({"data": [{"total": 45.0}]})
    );
}

#[tokio::test]
async fn test_compile_block_without_instance_needs_no_principal() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let compiled = engine.compile_block("total", None, None).await.unwrap();
    assert!(compiled.query.sql.contains("SUM(\"valor\")"));
}

#[tokio::test]
async fn test_render_block_with_instance_scope() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let payload = engine
        .render_block("total", Some("comercial-loja1"), Some("ana"))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(payload).unwrap(),
        json!({"data": [{"total": 16.0}]})
    );
}

#[tokio::test]
async fn test_block_filter_applies_with_tenant_scope() {
    let fixture = Fixture::new();
    let engine = fixture.engine_with(&CATALOG.replace(
        "metric_format = { prefix = \"R$ \", decimal_places = 2 }",
        "metric_format = { prefix = \"R$ \", decimal_places = 2 }\nblock_filter = \"produto = 'pao'\"",
    ));

    let unscoped = engine
        .render_block("total", None, Some("operacao"))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(unscoped).unwrap(),
        json!({"data": [{"total": 9.0}]})
    );

    let scoped = engine
        .render_block("total", Some("comercial-loja1"), Some("ana"))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(scoped).unwrap(),
        json!({"data": [{"total": null}]})
    );
}

#[tokio::test]
async fn test_metadata_is_classified_and_cached() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let metadata = engine.dataset_metadata("vendas", false).await.unwrap();
    let names: Vec<_> = metadata
        .sorted()
        .into_iter()
        .map(|c| (c.name, c.semantic_type.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("data_venda".to_string(), "datetime"),
            ("valor".to_string(), "measure"),
            ("loja_id".to_string(), "identifier"),
            ("produto".to_string(), "dimension"),
        ]
    );

    let calls = fixture.backend.calls();
    engine.dataset_metadata("vendas", false).await.unwrap();
    assert_eq!(fixture.backend.calls(), calls);

    engine.dataset_metadata("vendas", true).await.unwrap();
    assert!(fixture.backend.calls() > calls);
}

#[tokio::test]
async fn test_cache_entry_replaced_when_query_changes() {
    let fixture = Fixture::new();

    let before = fixture.engine();
    let metadata = before.dataset_metadata("vendas", false).await.unwrap();
    assert_eq!(metadata.columns.len(), 4);

    let after = fixture.engine_with(&CATALOG.replace(
        "SELECT data_venda, produto, valor, loja_id FROM vendas",
        "SELECT produto, valor FROM vendas",
    ));
    let metadata = after.dataset_metadata("vendas", false).await.unwrap();
    assert_eq!(metadata.columns.len(), 2);
    assert!(!metadata.contains("data_venda"));
    assert_eq!(fixture.cache.len(), 1);
}

#[tokio::test]
async fn test_compile_block_does_not_execute_chart() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let compiled = engine
        .compile_block("mensal", Some("comercial-geral"), None)
        .await
        .unwrap();
    assert!(!compiled.query.sql.contains("loja_id ="));
    assert!(compiled.query.sql.contains("STRFTIME('%Y-%m-01'"));
    assert!(compiled.query.sql.ends_with("LIMIT 5001"));
    assert_eq!(fixture.backend.calls(), 1);
}

// ============================================================================
// Preview
// ============================================================================

#[tokio::test]
async fn test_preview_dataset_is_scoped_and_limited() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let rows = engine
        .preview_dataset("vendas", Some("comercial-loja1"), Some("ana"), 10)
        .await
        .unwrap();
    let names: Vec<_> = rows.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["data_venda", "produto", "valor", "loja_id"]);
    assert_eq!(rows.row_count(), 2);
    assert!(rows.rows.iter().all(|row| row[3] == json!(1)));

    let first = engine
        .preview_dataset("vendas", None, Some("operacao"), 1)
        .await
        .unwrap();
    assert_eq!(first.row_count(), 1);

    for principal in [None, Some("ana")] {
        let refused = engine.preview_dataset("vendas", None, principal, 10).await;
        assert!(matches!(refused, Err(EngineError::NotFound { kind: "Dataset", .. })));
    }

    let hidden = engine
        .preview_dataset("vendas", Some("comercial-loja1"), None, 10)
        .await;
    assert!(matches!(hidden, Err(EngineError::NotFound { .. })));
}

// ============================================================================
// Render deadline
// ============================================================================

/// Delays chart statements; metadata probes pass straight through.
struct SlowBackend {
    inner: SqliteBackend,
    delay: Duration,
}

#[async_trait]
impl QueryBackend for SlowBackend {
    async fn execute(
        &self,
        sql: &str,
        params: &[ParamValue],
        row_cap: usize,
    ) -> ExecutionResult<RowSet> {
        if !sql.contains("__probe") {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.execute(sql, params, row_cap).await
    }
}

const DEADLINE_CATALOG: &str = r#"
[[datasets]]
id = "vendas"
name = "Vendas"
connection = "local"
query = "SELECT produto, valor FROM vendas"

[[datasets]]
id = "vendas-lentas"
name = "Vendas (réplica lenta)"
connection = "lenta"
query = "SELECT produto, valor FROM vendas"

[[templates]]
id = "misto"
name = "Misto"

[[templates.blocks]]
id = "rapido"
title = "Rápido"
order = 0
dataset = "vendas"
chart = { chart_type = "metric", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }

[[templates.blocks]]
id = "lento"
title = "Lento"
order = 1
dataset = "vendas-lentas"
chart = { chart_type = "pie", x_axis_field = "produto", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }

[[instances]]
id = "misto-geral"
template = "misto"
unit = { id = "geral", name = "Geral" }
"#;

#[tokio::test]
async fn test_slow_block_reports_render_deadline() {
    let fixture = Fixture::new();
    let settings = ExecutorSettings {
        render_timeout_ms: 500,
        ..ExecutorSettings::default()
    };
    let executor = Arc::new(Executor::new(settings));
    executor.register_backend("local", fixture.backend.clone());
    executor.register_backend(
        "lenta",
        Arc::new(SlowBackend {
            inner: SqliteBackend::new("lenta", &fixture.db_path, 1),
            delay: Duration::from_secs(10),
        }),
    );

    let connections = vec![
        ConnectionRecord::new("local", Driver::Sqlite, &fixture.db_path),
        ConnectionRecord::new("lenta", Driver::Sqlite, &fixture.db_path),
    ];
    let catalog = StaticCatalog::from_toml_str(DEADLINE_CATALOG, connections).unwrap();
    let engine = Engine::new(
        Arc::new(catalog),
        executor,
        Arc::new(MetadataCache::in_memory()),
    );

    let started = Instant::now();
    let response = engine
        .render_dashboard("misto-geral", None, &[])
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());

    let fast = &response.blocks[0];
    assert_eq!(fast.id, "rapido");
    assert!(fast.success);
    assert_eq!(
        serde_json::to_value(block_data(&response, "rapido")).unwrap(),
        json!({"data": [{"total": 45.0}]})
    );

    let slow = &response.blocks[1];
    assert_eq!(slow.id, "lento");
    assert!(!slow.success);
    assert_eq!(slow.error.as_ref().unwrap().kind, "render_deadline_exceeded");
    assert!(response.data["lento"].is_none());
}
