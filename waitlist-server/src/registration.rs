//! The two-phase waitlist workflow.
//!
//! A candidate registers with their claims and receives a fingerprint, while
//! the matching token travels by mail inside an activation link. Presenting
//! both turns the candidate into a participant:
//!
//! ```text
//! Unregistered --register--> PendingActivation --activate--> Activated
//!                                   |
//!                                   +--activate fails--> Rejected
//! ```
//!
//! Nothing is written while a registration is pending; the token itself is
//! the pending state.

use crate::{
    models::participant::Participant,
    setups::{Notifier, ParticipantStore, ServerSetup, StoreError},
};
use chrono::Utc;
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::task::TaskTracker;
use url::Url;
use validator::{Validate, ValidationErrors};
use waitlist_core::{
    claims::Claims,
    presence::PresenceCache,
    token::{self, TokenService},
};

/// Why a registration or activation didn't go through
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The submitted claims are malformed
    #[error("invalid claims: {0}")]
    Validation(#[from] ValidationErrors),
    /// The token or its fingerprint didn't check out
    #[error("unauthorized")]
    Unauthorized,
    /// The identity is already a participant
    #[error("identity {0} is already a participant")]
    Conflict(String),
    /// The referrer isn't a participant
    #[error("referrer {0} is not a participant")]
    PreconditionFailed(String),
    /// The client is over its admission budget
    #[error("too many requests")]
    Throttled,
    /// A collaborator failed
    #[error("service unavailable")]
    Unavailable(#[source] anyhow::Error),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(identity) => Self::Conflict(identity),
            err => Self::Unavailable(err.into()),
        }
    }
}

/// Outcome of a registration
#[derive(Debug, Clone)]
pub struct Registration {
    /// Fingerprint of the issued token, returned to the candidate
    pub fingerprint: String,
    /// The issued token, which normally only travels by mail
    pub token: String,
}

/// Drives registrations and activations.
///
/// Notifications are sent from tracked background tasks, so that
/// [`Registrar::drain`] can wait for them on shutdown.
pub struct Registrar<S: ServerSetup> {
    tokens: Arc<TokenService>,
    store: S::Store,
    notifier: S::Notifier,
    presence: Arc<PresenceCache>,
    tasks: TaskTracker,
    activation_base_url: Arc<Url>,
}

impl<S: ServerSetup> Clone for Registrar<S> {
    fn clone(&self) -> Self {
        Self {
            tokens: Arc::clone(&self.tokens),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            presence: Arc::clone(&self.presence),
            tasks: self.tasks.clone(),
            activation_base_url: Arc::clone(&self.activation_base_url),
        }
    }
}

impl<S: ServerSetup> std::fmt::Debug for Registrar<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("tokens", &self.tokens)
            .field("presence", &self.presence.len())
            .field("tasks", &self.tasks)
            .field("activation_base_url", &self.activation_base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl<S: ServerSetup> Registrar<S> {
    /// Assemble a registrar
    pub fn new(
        tokens: Arc<TokenService>,
        store: S::Store,
        notifier: S::Notifier,
        presence: Arc<PresenceCache>,
        activation_base_url: Url,
    ) -> Self {
        Self {
            tokens,
            store,
            notifier,
            presence,
            tasks: TaskTracker::new(),
            activation_base_url: Arc::new(activation_base_url),
        }
    }

    /// Issue a token for `claims` and mail the activation link.
    ///
    /// Re-registering simply issues another independent token.
    pub fn register(&self, claims: Claims) -> Result<Registration, RegistrationError> {
        claims.validate()?;

        let token = self
            .tokens
            .create(&claims, Utc::now())
            .map_err(|e| RegistrationError::Unavailable(e.into()))?;
        let fingerprint = self.tokens.fingerprint(&token);
        let link = self.activation_link(&token, &fingerprint);

        let notifier = self.notifier.clone();
        let contact = claims.contact;
        let fingerprint_sent = fingerprint.clone();
        self.tasks.spawn(async move {
            if let Err(err) = notifier
                .send_activation_link(&contact, &link, &fingerprint_sent)
                .await
            {
                tracing::error!(?err, "failed to send activation link");
            }
        });

        tracing::debug!(identity = %claims.identity, "registered candidate");
        metrics::increment_counter!("waitlist_registrations_total");

        Ok(Registration { fingerprint, token })
    }

    /// Turn the holder of `token` into a participant.
    ///
    /// The fingerprint is compared before the token is even parsed.
    pub async fn activate(
        &self,
        token: &str,
        fingerprint: &str,
    ) -> Result<Participant, RegistrationError> {
        let result = self.try_activate(token, fingerprint).await;

        let outcome = match &result {
            Ok(_) => "activated",
            Err(RegistrationError::Unauthorized) => "unauthorized",
            Err(RegistrationError::Conflict(_)) => "conflict",
            Err(RegistrationError::PreconditionFailed(_)) => "unknown_referrer",
            Err(_) => "failed",
        };
        metrics::increment_counter!("waitlist_activations_total", "outcome" => outcome);

        result
    }

    async fn try_activate(
        &self,
        token: &str,
        fingerprint: &str,
    ) -> Result<Participant, RegistrationError> {
        if !token::is_well_formed(token) || self.tokens.fingerprint(token) != fingerprint {
            return Err(RegistrationError::Unauthorized);
        }

        let claims = self
            .tokens
            .extract(token)
            .map_err(|_| RegistrationError::Unauthorized)?;

        if self.store.exists(&claims.identity).await? {
            return Err(RegistrationError::Conflict(claims.identity));
        }

        if !self.store.exists(&claims.referrer).await? {
            return Err(RegistrationError::PreconditionFailed(claims.referrer));
        }

        let participant = Participant::new(claims, Utc::now());
        // A concurrent activation of the same identity loses here with Conflict.
        self.store.persist(&participant).await?;

        self.presence
            .add(participant.address.clone(), participant.timestamp);

        let notifier = self.notifier.clone();
        let contact = participant.email.clone();
        self.tasks.spawn(async move {
            if let Err(err) = notifier.send_confirmation(&contact).await {
                tracing::error!(?err, "failed to send activation confirmation");
            }
        });

        tracing::info!(
            identity = %participant.address,
            referrer = %participant.sponsor,
            "activated participant"
        );

        Ok(participant)
    }

    /// Whether `identity` is a known participant, answered from memory
    pub fn check_presence(&self, identity: &str) -> bool {
        self.presence.is_present(identity)
    }

    /// Participants in activation order, optionally paged
    pub async fn participants(
        &self,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Participant>, StoreError> {
        self.store.list(offset, limit).await
    }

    /// Fill the presence cache from the store, returning the number of entries
    pub async fn warm_presence_cache(&self) -> anyhow::Result<usize> {
        let index: std::collections::HashMap<_, _> = self
            .store
            .list(None, None)
            .await?
            .into_iter()
            .map(|participant| (participant.address, participant.timestamp))
            .collect();
        let len = index.len();

        self.presence.replace_all(index);

        Ok(len)
    }

    /// Check that the store is reachable
    pub async fn ping_store(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    /// Number of notifications still being sent
    pub fn pending_notifications(&self) -> usize {
        self.tasks.len()
    }

    /// Wait up to `timeout` for pending notifications.
    ///
    /// Returns whether all of them finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait())
            .await
            .is_ok();
        self.tasks.reopen();
        drained
    }

    /// Wait for `serving` to finish, then [`Registrar::drain`].
    ///
    /// `serving` is the server shutting down; requests it is still finishing
    /// may start notifications until it returns.
    pub async fn drain_after<F>(&self, serving: F, timeout: Duration) -> bool
    where
        F: Future<Output = ()>,
    {
        serving.await;
        self.drain(timeout).await
    }

    fn activation_link(&self, token: &str, fingerprint: &str) -> String {
        format!(
            "{}/activate/{token}/{fingerprint}",
            self.activation_base_url.as_str().trim_end_matches('/')
        )
    }
}
