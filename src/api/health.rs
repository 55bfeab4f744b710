use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;
use crate::config::ScanDocument;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceStatus,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub scan_config: ScanConfigStatus,
    pub probe_engine: ProbeEngineStatus,
}

#[derive(Serialize)]
pub struct ScanConfigStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ProbeEngineStatus {
    pub name: String,
    pub healthy: bool,
}

#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
}

/// Liveness probe; touches nothing.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { status: "ok" })
}

/// Validates the scan document and asks the probe engine whether it runs.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (scan_settings, scan_config) = match state.load_scanner() {
        Ok(scanner) => (
            scanner.settings().clone(),
            ScanConfigStatus {
                healthy: true,
                error: None,
            },
        ),
        Err(e) => (
            ScanDocument::from_path(&state.settings.scan_config_path)
                .map(|d| d.scan_settings)
                .unwrap_or_default(),
            ScanConfigStatus {
                healthy: false,
                error: Some(e.to_string()),
            },
        ),
    };

    let catalog = state.catalog(&scan_settings);
    let probe_engine = ProbeEngineStatus {
        name: catalog.name().to_string(),
        healthy: catalog.health_check().await,
    };

    let all_healthy = scan_config.healthy && probe_engine.healthy;

    Json(HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceStatus {
            scan_config,
            probe_engine,
        },
    })
}
