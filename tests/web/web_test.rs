//! HTTP tests for the axum router, driven with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use painel::cache::MetadataCache;
use painel::config::{ConnectionRecord, Driver, ExecutorSettings};
use painel::dashboard::{Engine, StaticCatalog};
use painel::executor::Executor;
use painel::web::{router, AppState, PRINCIPAL_HEADER};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const CATALOG: &str = r#"
admins = ["operacao"]

[[datasets]]
id = "vendas"
name = "Vendas"
connection = "local"
query = "SELECT produto, valor, loja_id FROM vendas"

[[templates]]
id = "comercial"
name = "Comercial"

[[templates.blocks]]
id = "por-produto"
title = "Por produto"
dataset = "vendas"
chart = { chart_type = "pie", x_axis_field = "produto", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }

[[instances]]
id = "comercial-loja2"
template = "comercial"
unit = { id = "loja2", name = "Loja 2" }
tenant_filter = "loja_id = 2"
users = ["ana"]
"#;

fn app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("vendas.db").to_string_lossy().into_owned();
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE vendas (produto TEXT, valor REAL, loja_id INTEGER);
         INSERT INTO vendas VALUES ('cafe', 10.0, 1), ('pao', 4.0, 2), ('cafe', 3.0, 2), ('pao', 5.0, 2);",
    )
    .unwrap();
    drop(conn);

    let connections = vec![ConnectionRecord::new("local", Driver::Sqlite, db_path)];
    let catalog = StaticCatalog::from_toml_str(CATALOG, connections).unwrap();
    let engine = Engine::new(
        Arc::new(catalog),
        Arc::new(Executor::new(ExecutorSettings::default())),
        Arc::new(MetadataCache::in_memory()),
    );
    (dir, router(Arc::new(AppState { engine })))
}

async fn get(app: Router, uri: &str, principal: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(principal) = principal {
        request = request.header(PRINCIPAL_HEADER, principal);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = app();
    let (status, body) = get(app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_dashboard_data() {
    let (_dir, app) = app();
    let (status, body) = get(app, "/dashboards/comercial-loja2/data/", Some("ana")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["template_name"], "Comercial");
    assert_eq!(
        body["data"]["por-produto"],
        json!({"x": ["pao", "cafe"], "series": [{"axis": "y1", "label": "Total", "values": [9.0, 3.0]}]})
    );
    assert_eq!(body["blocks"][0]["success"], true);
    assert_eq!(body["blocks"][0]["layout"], json!({"colSpan": 1, "rowSpan": 1}));
}

#[tokio::test]
async fn test_invisible_instance_is_404() {
    let (_dir, app) = app();
    let (status, body) = get(app.clone(), "/dashboards/comercial-loja2/data/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "not_found");

    let (status, _) = get(app, "/dashboards/nao-existe/data", Some("ana")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_block_data() {
    let (_dir, app) = app();
    let (status, body) = get(app, "/dashboard-blocks/por-produto/data/", Some("operacao")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["x"], json!(["cafe", "pao"]));
    assert_eq!(body["data"]["series"][0]["values"], json!([13.0, 9.0]));
}

#[tokio::test]
async fn test_block_data_without_instance_requires_admin() {
    for principal in [None, Some("ana")] {
        let (_dir, app) = app();
        let (status, body) = get(app, "/dashboard-blocks/por-produto/data/", principal).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{:?}: {}", principal, body);
        assert_eq!(body["error"]["kind"], "not_found");
        assert!(body.get("data").map_or(true, |d| d.is_null()));
    }
}

#[tokio::test]
async fn test_block_data_scoped_by_instance() {
    let (_dir, app) = app();
    let (status, body) = get(
        app,
        "/dashboard-blocks/por-produto/data/?instance=comercial-loja2",
        Some("ana"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["series"][0]["values"], json!([9.0, 3.0]));
}

#[tokio::test]
async fn test_dataset_metadata() {
    let (_dir, app) = app();
    let (status, body) = get(app, "/datasources/vendas/metadata/?refresh=true", None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let columns = body["columns"].as_array().unwrap();
    let names: Vec<_> = columns.iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["valor", "loja_id", "produto"]);
    assert_eq!(columns[0]["semantic_type"], "measure");
}

#[tokio::test]
async fn test_unknown_dataset_metadata_is_404() {
    let (_dir, app) = app();
    let (status, body) = get(app, "/datasources/nada/metadata/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
}
