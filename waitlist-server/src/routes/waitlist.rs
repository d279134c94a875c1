//! Waitlist registration, activation and presence routes

use crate::{
    app_state::AppState,
    error::AppResult,
    extract::json::Json,
    models::participant::Participant,
    settings::AppEnvironment,
    setups::ServerSetup,
};
use axum::{
    self,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use waitlist_core::claims::Claims;

/// Response to a registration
#[derive(ToSchema, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegisterResponse {
    /// Fingerprint of the mailed token, required to activate
    #[schema(example = "5719B140ABEFF9FD44DD610C4C0673A10FCEDCEB3A14F09FC69D90C93D63EAAF37A36E735290679C1E531FA3C5C08B8924FF738DA0D5F384493899CDDD1CF597")]
    pub fingerprint: String,
    /// The token itself, only echoed in the local environment
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token: Option<String>,
}

/// Whether an identity is a participant
#[derive(ToSchema, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PresenceResponse {
    /// `true` if the identity has been activated
    pub registered: bool,
}

/// POST handler registering a candidate
#[utoipa::path(
    post,
    path = "/register",
    request_body = Claims,
    security(("api_key" = [])),
    responses(
        (status = 202, description = "Activation link on its way", body = RegisterResponse),
        (status = 400, description = "Invalid claims", body = ErrorResponse),
        (status = 401, description = "Missing or wrong API key", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
    )
)]
pub async fn register<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Json(claims): Json<Claims>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let registration = state.registrar.register(claims)?;

    let token = (state.environment == AppEnvironment::Local).then_some(registration.token);

    Ok((
        StatusCode::ACCEPTED,
        Json(RegisterResponse {
            fingerprint: registration.fingerprint,
            token,
        }),
    ))
}

/// POST handler activating the holder of a token
#[utoipa::path(
    post,
    path = "/activate/{token}/{fingerprint}",
    params(
        ("token" = String, Path, description = "Token from the activation link"),
        ("fingerprint" = String, Path, description = "Fingerprint returned at registration"),
    ),
    security(("api_key" = [])),
    responses(
        (status = 201, description = "Participant created", body = Participant),
        (status = 401, description = "Bad token, fingerprint or API key", body = ErrorResponse),
        (status = 409, description = "Identity already a participant", body = ErrorResponse),
        (status = 412, description = "Referrer is not a participant", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
    )
)]
pub async fn activate<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Path((token, fingerprint)): Path<(String, String)>,
) -> AppResult<(StatusCode, Json<Participant>)> {
    let participant = state.registrar.activate(&token, &fingerprint).await?;

    Ok((StatusCode::CREATED, Json(participant)))
}

/// GET handler telling whether an identity is a participant
#[utoipa::path(
    get,
    path = "/check-wallet/{address}",
    params(("address" = String, Path, description = "Identity to look up")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Participant", body = PresenceResponse),
        (status = 404, description = "Not a participant", body = PresenceResponse),
    )
)]
pub async fn check_wallet<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> AppResult<(StatusCode, Json<PresenceResponse>)> {
    let registered = state.registrar.check_presence(&address);
    let status = if registered {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    Ok((status, Json(PresenceResponse { registered })))
}
