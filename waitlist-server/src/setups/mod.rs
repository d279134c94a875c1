//! This abstracts waitlist server side-effects into "setups".
//!
//! This module defines the traits, submodules define test, local & production
//! collections of implementations.
use crate::models::participant::Participant;
use anyhow::Result;
use async_trait::async_trait;
use std::ops::Range;

pub mod local;
pub mod prod;

/// This trait groups type parameters to the server's `AppState` struct.
///
/// It captures the setup of the server, distinguishing between e.g.
/// unit testing & production setups.
pub trait ServerSetup: Clone + Send + Sync + 'static {
    /// Where participants are durably stored
    type Store: ParticipantStore;
    /// Which implementation to use to reach candidates
    type Notifier: Notifier;
}

/// Errors raised by a [`ParticipantStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The identity is already stored
    #[error("participant {0} already exists")]
    Duplicate(String),
    /// The requested page doesn't exist
    #[error("offset {offset} and limit {limit:?} are out of range for {len} participants")]
    OutOfRange {
        /// Requested offset
        offset: usize,
        /// Requested limit
        limit: Option<usize>,
        /// Number of stored participants
        len: usize,
    },
    /// The backend failed
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable participant storage. This is the source of truth for who is a
/// participant, the presence cache only mirrors it.
#[async_trait]
pub trait ParticipantStore: Clone + Send + Sync + 'static {
    /// Whether a participant with this identity exists
    async fn exists(&self, identity: &str) -> Result<bool, StoreError>;

    /// Store a new participant, failing with [`StoreError::Duplicate`] if
    /// the identity is taken
    async fn persist(&self, participant: &Participant) -> Result<(), StoreError>;

    /// Participants in activation order, optionally paged
    async fn list(
        &self,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Participant>, StoreError>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;
}

/// The service that reaches candidates and participants
#[async_trait]
pub trait Notifier: Clone + Send + Sync + 'static {
    /// Send the link completing a registration
    async fn send_activation_link(&self, contact: &str, link: &str, fingerprint: &str)
        -> Result<()>;

    /// Confirm a completed activation
    async fn send_confirmation(&self, contact: &str) -> Result<()>;
}

/// Bounds of the requested page among `len` participants.
///
/// Without an offset everything is covered. An offset past the end or an
/// empty limit is out of range; a limit running past the end is truncated.
pub(crate) fn page_bounds(
    len: usize,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<Range<usize>, StoreError> {
    let offset_value = offset.unwrap_or_default();

    if offset_value > len || limit == Some(0) {
        return Err(StoreError::OutOfRange {
            offset: offset_value,
            limit,
            len,
        });
    }

    let end = limit.map_or(len, |limit| offset_value.saturating_add(limit).min(len));
    Ok(offset_value..end)
}

/// Cut a page out of `participants`, see [`page_bounds`]
#[cfg(test)]
pub(crate) fn page(
    participants: &[Participant],
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<Vec<Participant>, StoreError> {
    let range = page_bounds(participants.len(), offset, limit)?;
    Ok(participants[range].to_vec())
}
