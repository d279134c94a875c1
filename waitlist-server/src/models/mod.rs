//! Models

pub mod participant;
