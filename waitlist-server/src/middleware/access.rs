//! Admission and API-key gates in front of the API routes.

use crate::{
    app_state::AppState, error::AppError, registration::RegistrationError, setups::ServerSetup,
};
use axum::{
    extract::{ConnectInfo, State},
    middleware::Next,
    response::Response,
};
use http::{HeaderName, Request, StatusCode};
use std::net::SocketAddr;

/// Header carrying the API key
pub static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Reject clients over their admission budget with `429 Too Many Requests`.
///
/// Clients are keyed by the IP of the peer socket.
pub async fn admit<S: ServerSetup, B>(
    State(state): State<AppState<S>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let client = addr.ip().to_string();

    if !state.limiter.allow(&client) {
        tracing::debug!(%client, "admission refused");
        metrics::increment_counter!("waitlist_admission_rejections_total");
        return Err(RegistrationError::Throttled.into());
    }

    Ok(next.run(request).await)
}

/// Reject requests without the configured API key with `401 Unauthorized`.
pub async fn require_api_key<S: ServerSetup, B>(
    State(state): State<AppState<S>>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(&API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if key == &*state.api_key => Ok(next.run(request).await),
        _ => Err(AppError::bare(StatusCode::UNAUTHORIZED)),
    }
}
