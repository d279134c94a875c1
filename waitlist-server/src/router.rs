//! Main [axum::Router] interface for webserver.

use crate::{
    app_state::AppState,
    middleware::access::{self, API_KEY_HEADER},
    routes::{fallback::notfound_404, health, participants, waitlist},
    setups::ServerSetup,
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Setup main router for application.
pub fn setup_app_router<S: ServerSetup>(app_state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::header::ACCEPT,
            API_KEY_HEADER.clone(),
        ])
        // allow requests from any origin
        .allow_origin(Any);

    // Route layers wrap in reverse: admission runs before the API key check.
    let api_router = Router::new()
        .route("/health", get(health::health))
        .route("/register", post(waitlist::register::<S>))
        .route(
            "/activate/:token/:fingerprint",
            post(waitlist::activate::<S>),
        )
        .route("/check-wallet/:address", get(waitlist::check_wallet::<S>))
        .route("/:path1/:path2/list", get(participants::list::<S>))
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            access::require_api_key::<S, _>,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            access::admit::<S, _>,
        ))
        .layer(cors)
        .fallback(notfound_404)
        .with_state(app_state.clone());

    let healthcheck_router = Router::new()
        .route("/healthcheck", get(health::healthcheck::<S>))
        .with_state(app_state);

    Router::merge(api_router, healthcheck_router)
}
