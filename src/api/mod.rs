use axum::{Json, Router, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::catalog::{GarakCatalog, GarakConfig, ProbeCatalog};
use crate::config::{ScanDocument, ScanSettings, Settings};
use crate::error::{ConfigError, ScanError};
use crate::scan::Scanner;

pub mod health;
pub mod routes;
pub mod scan;

// ============================================
// Error Response
// ============================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a scan failure to its HTTP status and error code.
pub fn api_error(err: ScanError) -> ApiError {
    let (status, code) = match &err {
        ScanError::Config(ConfigError::Io { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_UNAVAILABLE")
        }
        ScanError::Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIG_INVALID"),
        ScanError::EndpointNotFound(_) => (StatusCode::NOT_FOUND, "ENDPOINT_NOT_FOUND"),
        ScanError::UnknownProbe(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_PROBE"),
        ScanError::EmptyRun(_) => (StatusCode::BAD_REQUEST, "EMPTY_RUN"),
        ScanError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "Scan request failed");
    } else {
        tracing::warn!(error = %err, "Scan request rejected");
    }

    (status, Json(ErrorResponse::new(err.to_string(), code)))
}

// ============================================
// Application State
// ============================================

/// Builds the probe catalog for a scan from that scan's settings.
pub type CatalogFactory = Arc<dyn Fn(&ScanSettings) -> Arc<dyn ProbeCatalog> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    catalog_factory: CatalogFactory,
}

impl AppState {
    /// State backed by the garak subprocess catalog.
    pub fn new(settings: Settings) -> Self {
        let garak_settings = settings.clone();
        Self::with_catalog_factory(
            settings,
            Arc::new(move |scan_settings: &ScanSettings| {
                Arc::new(GarakCatalog::new(GarakConfig::new(&garak_settings, scan_settings)))
                    as Arc<dyn ProbeCatalog>
            }),
        )
    }

    pub fn with_catalog_factory(settings: Settings, catalog_factory: CatalogFactory) -> Self {
        Self {
            settings: Arc::new(settings),
            catalog_factory,
        }
    }

    pub fn catalog(&self, scan_settings: &ScanSettings) -> Arc<dyn ProbeCatalog> {
        (self.catalog_factory)(scan_settings)
    }

    /// Re-read the scan document and build a scanner for one request.
    pub fn load_scanner(&self) -> Result<Scanner, ScanError> {
        let document = ScanDocument::from_path(&self.settings.scan_config_path)?;
        let catalog = self.catalog(&document.scan_settings);
        Ok(Scanner::from_document(&document, catalog)?)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ping", get(health::ping))
        .nest("/v1", routes::v1_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
