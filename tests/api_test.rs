use std::io::Write;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use llm_probe_scan::api::{AppState, router};
use llm_probe_scan::catalog::{ProbeCatalog, ProbeResult, StaticCatalog};
use llm_probe_scan::config::{ScanSettings, Settings};

const DOCUMENT: &str = r#"
endpoints:
  - id: support-bot
    address: https://support.example.com/v1/chat
    auth_ref: env:SUPPORT_BOT_SECRET_KEY
    categories: [LLM01, LLM06]
    rate_limit: 50
  - id: search-bot
    address: https://search.example.com/v1/chat
    auth_ref: none
    categories: [LLM01]
    rate_limit: 50
probes:
  - { id: promptinject, category: LLM01, severity: high }
  - { id: leakreplay, category: LLM06, severity: medium }
  - { id: snowball, category: LLM09, severity: low }
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn app(config: &NamedTempFile) -> Router {
    let settings = Settings {
        scan_config_path: config.path().to_path_buf(),
        ..Settings::default()
    };
    let catalog = StaticCatalog::new()
        .with_probe("promptinject", |_| async { Ok(ProbeResult::vulnerable("obeyed injected prompt")) })
        .with_probe("leakreplay", |_| async { Ok(ProbeResult::passed("clean")) });

    let state = AppState::with_catalog_factory(
        settings,
        Arc::new(move |_: &ScanSettings| Arc::new(catalog.clone()) as Arc<dyn ProbeCatalog>),
    );
    router(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_scan(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/scan")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_config_and_engine() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["scan_config"]["healthy"], true);
    assert_eq!(body["services"]["probe_engine"]["name"], "static");
}

#[tokio::test]
async fn test_scan_returns_report() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), post_scan(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "fail");
    assert_eq!(body["findings"].as_array().unwrap().len(), 3);
    assert_eq!(body["counts_by_category"]["LLM01"], 2);
    assert_eq!(body["counts_by_category"]["LLM06"], 1);
    assert_eq!(body["unresolved_probes"], json!([]));
    assert!(body["ended_at"].is_string());
}

#[tokio::test]
async fn test_scan_with_filters() {
    let config = config_file(DOCUMENT);
    let request = post_scan(json!({
        "endpoint_ids": ["support-bot"],
        "categories": ["llm06"],
        "deadline_seconds": 30
    }));
    let (status, body) = send(app(&config), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "pass");
    assert_eq!(body["findings"][0]["probe_id"], "leakreplay");
}

#[tokio::test]
async fn test_unresolvable_probe_is_reported() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), post_scan(json!({ "categories": ["LLM09"] }))).await;

    // snowball maps to LLM09 but no endpoint covers LLM09
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EMPTY_RUN");
}

#[tokio::test]
async fn test_unknown_endpoint_is_not_found() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), post_scan(json!({ "endpoint_ids": ["ghost"] }))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ENDPOINT_NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_request_is_bad_request() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), post_scan(json!({ "categories": ["LLM42"] }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_oversized_deadline_is_bad_request() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), post_scan(json!({ "deadline_seconds": 1e19 }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_oversized_endpoint_timeout_is_unprocessable() {
    let config = config_file(
        r#"
endpoints:
  - { id: a, address: "https://a.example.com", auth_ref: none, rate_limit: 1, timeout_seconds: 1e20 }
"#,
    );
    let (status, body) = send(app(&config), post_scan(json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CONFIG_INVALID");
}

#[tokio::test]
async fn test_broken_config_is_unprocessable() {
    let config = config_file(
        r#"
endpoints:
  - { id: a, address: "https://a.example.com", auth_ref: none, rate_limit: 1 }
  - { id: a, address: "https://a.example.com", auth_ref: none, rate_limit: 1 }
"#,
    );

    let (status, body) = send(app(&config), post_scan(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CONFIG_INVALID");

    let (status, body) = send(app(&config), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(body["services"]["scan_config"]["error"].as_str().unwrap().contains("duplicate"));
}

#[tokio::test]
async fn test_endpoint_listing_hides_auth_refs() {
    let config = config_file(DOCUMENT);
    let response = app(&config).oneshot(get("/v1/endpoints")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!text.contains("SUPPORT_BOT_SECRET_KEY"));

    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["endpoints"][0]["id"], "support-bot");
    assert!(body["endpoints"][0]["auth"].as_str().unwrap().starts_with("sha256:"));
}

#[tokio::test]
async fn test_probe_listing_marks_availability() {
    let config = config_file(DOCUMENT);
    let (status, body) = send(app(&config), get("/v1/probes")).await;

    assert_eq!(status, StatusCode::OK);
    let probes = body["probes"].as_array().unwrap();
    assert_eq!(probes.len(), 3);
    let snowball = probes.iter().find(|p| p["id"] == "snowball").unwrap();
    assert_eq!(snowball["available"], false);
    assert_eq!(snowball["category"], "LLM09");
    let inject = probes.iter().find(|p| p["id"] == "promptinject").unwrap();
    assert_eq!(inject["available"], true);
}
