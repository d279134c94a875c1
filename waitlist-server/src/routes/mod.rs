//! Routes for [axum::Router].

pub mod fallback;
pub mod health;
pub mod participants;
pub mod waitlist;
