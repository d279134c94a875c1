//! Custom [axum::extract] extractors and OpenAPI addons.

pub mod api_key_addon;
pub mod json;
