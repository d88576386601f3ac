//! Liveness probe

use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::routes::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    /// "demo" when running on the in-memory store
    pub mode: &'static str,
    pub cache_enabled: bool,
    pub timestamp: String,
}

/// GET /health
pub fn health_check(state: &AppState) -> Response<FullBody> {
    let body = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
        mode: if state.db.is_demo() { "demo" } else { "mongodb" },
        cache_enabled: state.cache.is_enabled(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &body)
}
