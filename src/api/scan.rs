use axum::{Json, extract::State};
use serde::Serialize;

use super::{ApiError, AppState, api_error};
use crate::models::{OwaspCategory, RunReport, Severity};
use crate::scan::ScanRequest;

// ============================================
// Response Types
// ============================================

#[derive(Debug, Serialize)]
pub struct ProbeListResponse {
    pub catalog: String,
    pub probes: Vec<ProbeInfoItem>,
}

#[derive(Debug, Serialize)]
pub struct ProbeInfoItem {
    pub id: String,
    pub category: OwaspCategory,
    pub category_title: &'static str,
    pub severity: Severity,
    pub idempotent: bool,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the probe engine can resolve this probe
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct EndpointListResponse {
    pub endpoints: Vec<EndpointInfoItem>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfoItem {
    pub id: String,
    pub address: String,
    /// Fingerprint of the auth reference, never the reference itself
    pub auth: String,
    pub categories: Vec<OwaspCategory>,
    pub requests_per_second: f64,
    pub burst: u32,
    pub timeout_seconds: f64,
    pub enabled: bool,
    pub generator: String,
}

// ============================================
// Handlers
// ============================================

/// POST /v1/scan: run a scan synchronously and return its report
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let scanner = state.load_scanner().map_err(api_error)?;
    let report = scanner.run_scan(&request).await.map_err(api_error)?;
    Ok(Json(report))
}

/// GET /v1/probes
pub async fn list_probes(State(state): State<AppState>) -> Result<Json<ProbeListResponse>, ApiError> {
    let scanner = state.load_scanner().map_err(api_error)?;
    let catalog = scanner.catalog();

    let probes = scanner
        .probe_specs()
        .iter()
        .map(|spec| ProbeInfoItem {
            id: spec.id.clone(),
            category: spec.category,
            category_title: spec.category.title(),
            severity: spec.severity,
            idempotent: spec.idempotent,
            enabled: spec.enabled,
            description: spec.description.clone(),
            available: catalog.resolve(&spec.id).is_ok(),
        })
        .collect();

    Ok(Json(ProbeListResponse {
        catalog: catalog.name().to_string(),
        probes,
    }))
}

/// GET /v1/endpoints
pub async fn list_endpoints(State(state): State<AppState>) -> Result<Json<EndpointListResponse>, ApiError> {
    let scanner = state.load_scanner().map_err(api_error)?;

    let endpoints = scanner
        .registry()
        .iter()
        .map(|endpoint| EndpointInfoItem {
            id: endpoint.id.clone(),
            address: endpoint.address.clone(),
            auth: endpoint.auth_fingerprint(),
            categories: endpoint.categories.iter().copied().collect(),
            requests_per_second: endpoint.rate_limit.requests_per_second,
            burst: endpoint.rate_limit.burst,
            timeout_seconds: endpoint.timeout.as_secs_f64(),
            enabled: endpoint.enabled,
            generator: endpoint.generator.clone(),
        })
        .collect();

    Ok(Json(EndpointListResponse { endpoints }))
}
