//! OpenAPI doc generation.

use crate::{
    error::{AppError, ErrorResponse},
    extract::api_key_addon::ApiKeyAddon,
    models::participant::Participant,
    routes::{health, participants, waitlist},
};
use utoipa::OpenApi;
use waitlist_core::claims::Claims;

/// API documentation generator.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::healthcheck,
        waitlist::register,
        waitlist::activate,
        waitlist::check_wallet,
        participants::list,
    ),
    components(
        schemas(
            AppError,
            ErrorResponse,
            Claims,
            Participant,
            waitlist::RegisterResponse,
            waitlist::PresenceResponse,
            participants::ParticipantList,
            health::HealthResponse,
            health::HealthcheckResponse
        )
    ),
    modifiers(&ApiKeyAddon),
)]

/// Tied to OpenAPI documentation.
#[derive(Debug)]
pub struct ApiDoc;
