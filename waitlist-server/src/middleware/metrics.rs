//! Middleware for tracking metrics on each client [http::Request].

use axum::{extract::MatchedPath, middleware::Next, response::IntoResponse};
use http::Request;
use std::time::Instant;

/// Middleware function called to track (and update) http metrics when a route
/// is requested.
pub async fn track<B>(req: Request<B>, next: Next<B>) -> impl IntoResponse {
    let start = Instant::now();

    // Matched templates keep path parameters (tokens, addresses) out of labels.
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let method = req.method().clone();
    let res = next.run(req).await;
    let latency = start.elapsed().as_secs_f64();
    let status = res.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("request_path", path),
        ("status", status),
    ];

    metrics::increment_counter!("http_requests_total", &labels);
    metrics::histogram!("http_requests_duration_seconds", latency, &labels);

    res
}
