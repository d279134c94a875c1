#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! waitlist-server

#[macro_use]
extern crate diesel_migrations;

pub mod app_state;
pub mod db;
pub mod docs;
pub mod encryption;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod registration;
pub mod router;
pub mod routes;
pub mod settings;
pub mod setups;

#[cfg(test)]
pub mod test_utils;
