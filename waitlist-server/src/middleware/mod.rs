//! Additional [axum::middleware].

pub mod access;
pub mod metrics;
pub mod request_ulid;
pub mod runtime;
