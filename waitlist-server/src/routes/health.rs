//! Healthcheck routes.

use crate::{app_state::AppState, error::AppResult, extract::json::Json, setups::ServerSetup};
use axum::{self, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Minimal liveness response
#[derive(ToSchema, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    status: String,
}

/// A healthcheck response containing diagnostic information for the service
#[derive(ToSchema, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct HealthcheckResponse {
    store_reachable: bool,
    pending_notifications: usize,
}

impl HealthcheckResponse {
    /// Whether the service is healthy
    pub fn is_healthy(&self) -> bool {
        self.store_reachable
    }

    /// The status code for the healthcheck response
    pub fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET handler for API liveness
#[utoipa::path(
    get,
    path = "/health",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Service up", body = HealthResponse),
        (status = 401, description = "Missing or wrong API key", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
    )
)]
pub async fn health() -> AppResult<(StatusCode, Json<HealthResponse>)> {
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    ))
}

/// GET handler for checking service health.
#[utoipa::path(
    get,
    path = "/healthcheck",
    responses(
        (status = 200, description = "waitlist-server healthy", body = HealthcheckResponse),
        (status = 503, description = "waitlist-server not healthy", body = HealthcheckResponse)
    )
)]
pub async fn healthcheck<S: ServerSetup>(
    State(state): State<AppState<S>>,
) -> AppResult<(StatusCode, Json<HealthcheckResponse>)> {
    let store_reachable = match state.registrar.ping_store().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(?err, "participant store unreachable");
            false
        }
    };

    let response = HealthcheckResponse {
        store_reachable,
        pending_notifications: state.registrar.pending_notifications(),
    };

    Ok((response.status_code(), Json(response)))
}
