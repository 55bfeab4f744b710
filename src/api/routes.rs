use axum::{
    Router,
    routing::{get, post},
};

use super::AppState;
use super::scan;

/// V1 API routes
///
/// - GET  /endpoints - Configured endpoints (auth references fingerprinted)
/// - GET  /probes    - Probe specs with their OWASP mapping and availability
/// - POST /scan      - Run a scan and return the finalized report
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        .route("/endpoints", get(scan::list_endpoints))
        .route("/probes", get(scan::list_probes))
        .route("/scan", post(scan::start_scan))
}
