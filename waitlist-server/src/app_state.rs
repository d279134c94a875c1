//! The Axum Application State

use crate::{registration::Registrar, settings::AppEnvironment, setups::ServerSetup};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use url::Url;
use waitlist_core::{limiter::AdmissionLimiter, presence::PresenceCache, token::TokenService};

#[derive(Clone, Debug)]
/// Global application route state.
pub struct AppState<S: ServerSetup> {
    /// Drives registrations and activations
    pub registrar: Registrar<S>,
    /// Admission policy for API routes
    pub limiter: Arc<AdmissionLimiter>,
    /// Value expected in the `x-api-key` header
    pub api_key: Arc<str>,
    /// The two secret segments under which participants are listed
    pub list_path: Arc<(String, String)>,
    /// The environment the server runs in
    pub environment: AppEnvironment,
}

/// Builder for [`AppState`]
#[derive(Debug)]
pub struct AppStateBuilder<S: ServerSetup> {
    token_service: Option<TokenService>,
    store: Option<S::Store>,
    notifier: Option<S::Notifier>,
    presence: Arc<PresenceCache>,
    limiter: Arc<AdmissionLimiter>,
    api_key: Option<String>,
    list_path: Option<(String, String)>,
    activation_base_url: Option<Url>,
    environment: AppEnvironment,
}

impl<S: ServerSetup> Default for AppStateBuilder<S> {
    fn default() -> Self {
        Self {
            token_service: None,
            store: None,
            notifier: None,
            presence: Default::default(),
            limiter: Arc::new(AdmissionLimiter::Unlimited),
            api_key: None,
            list_path: None,
            activation_base_url: None,
            environment: AppEnvironment::Prod,
        }
    }
}

impl<S: ServerSetup> AppStateBuilder<S> {
    /// Finalize the builder and return the [`AppState`]
    pub fn finalize(self) -> Result<AppState<S>> {
        let token_service = self
            .token_service
            .ok_or_else(|| anyhow!("token_service is required"))?;

        let store = self.store.ok_or_else(|| anyhow!("store is required"))?;

        let notifier = self
            .notifier
            .ok_or_else(|| anyhow!("notifier is required"))?;

        let api_key = self.api_key.ok_or_else(|| anyhow!("api_key is required"))?;
        if api_key.is_empty() {
            return Err(anyhow!("api_key must not be empty"));
        }

        let list_path = self
            .list_path
            .ok_or_else(|| anyhow!("list_path is required"))?;

        let activation_base_url = self
            .activation_base_url
            .ok_or_else(|| anyhow!("activation_base_url is required"))?;

        Ok(AppState {
            registrar: Registrar::new(
                Arc::new(token_service),
                store,
                notifier,
                self.presence,
                activation_base_url,
            ),
            limiter: self.limiter,
            api_key: api_key.into(),
            list_path: Arc::new(list_path),
            environment: self.environment,
        })
    }

    /// Set the token service
    pub fn with_token_service(mut self, token_service: TokenService) -> Self {
        self.token_service = Some(token_service);
        self
    }

    /// Set the participant store
    pub fn with_store(mut self, store: S::Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the service that reaches candidates
    pub fn with_notifier(mut self, notifier: S::Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Share an existing presence cache
    pub fn with_presence_cache(mut self, presence: Arc<PresenceCache>) -> Self {
        self.presence = presence;
        self
    }

    /// Set the admission policy
    pub fn with_limiter(mut self, limiter: Arc<AdmissionLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the two-segment list path
    pub fn with_list_path(mut self, list_path: (String, String)) -> Self {
        self.list_path = Some(list_path);
        self
    }

    /// Set the base of activation links
    pub fn with_activation_base_url(mut self, activation_base_url: Url) -> Self {
        self.activation_base_url = Some(activation_base_url);
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.environment = environment;
        self
    }
}
