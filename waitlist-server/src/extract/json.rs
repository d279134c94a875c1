//! JSON extractor rejecting malformed bodies as JSON-API errors

use crate::error::AppError;
use axum::response::{IntoResponse, Response};
use axum_macros::FromRequest;
use serde::Serialize;

/// Drop-in replacement for [`axum::Json`] whose rejection is an [`AppError`]
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::parse_error;
    use axum::{body::Body, http::StatusCode, routing::post, Router};
    use http::Request;
    use testresult::TestResult;
    use tower::ServiceExt;
    use waitlist_core::claims::Claims;

    async fn echo(Json(claims): Json<Claims>) -> Json<Claims> {
        Json(claims)
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_body_is_json_api_error() -> TestResult {
        let app = Router::new().route("/", post(echo));

        let response = app
            .oneshot(
                Request::post("/")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err = parse_error(response).await;
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.detail.is_some());

        Ok(())
    }
}
