//! Helpers for running isolated webserver instances
use crate::{
    app_state::{AppState, AppStateBuilder},
    models::participant::Participant,
    router::setup_app_router,
    settings::AppEnvironment,
    setups::{
        test::{TestNotifier, TestSetup, TestStore},
        ParticipantStore,
    },
};
use anyhow::Result;
use axum::{extract::connect_info::MockConnectInfo, Router};
use chrono::Utc;
use std::{net::SocketAddr, time::Duration};
use url::Url;
use waitlist_core::{
    claims::Claims,
    token::{Algorithm, TokenService},
};

/// API key every test context accepts
pub const API_KEY: &str = "test-api-key";
/// Secret segments of the participant list route
pub const LIST_PATH: (&str, &str) = ("secret", "path");
/// Participant present in every fresh test context
pub const SPONSOR: &str = "Akp1oyjY1VZGpsd8gwHBCkADe577eVhA4f8dASxVTm3s";

/// An isolated, in-memory waitlist server
#[derive(Debug)]
pub struct TestContext {
    app: Router,
    app_state: AppState<TestSetup>,
    store: TestStore,
    notifier: TestNotifier,
}

impl TestContext {
    /// Create a new test context
    pub async fn new() -> Result<Self> {
        Self::new_with_state(|builder| builder).await
    }

    pub async fn new_with_state<F>(f: F) -> Result<Self>
    where
        F: FnOnce(AppStateBuilder<TestSetup>) -> AppStateBuilder<TestSetup>,
    {
        let store = TestStore::default();
        store
            .persist(&Participant::new(
                Claims::new(SPONSOR, "sponsor@mailservice.com", SPONSOR),
                Utc::now(),
            ))
            .await?;

        let notifier = TestNotifier::default();

        let builder = AppStateBuilder::default()
            .with_token_service(TokenService::generate(Algorithm::ES256)?)
            .with_store(store.clone())
            .with_notifier(notifier.clone())
            .with_api_key(API_KEY)
            .with_list_path((LIST_PATH.0.to_string(), LIST_PATH.1.to_string()))
            .with_activation_base_url(Url::parse("https://waitlist.test/")?)
            .with_environment(AppEnvironment::Local);

        let app_state = f(builder).finalize()?;
        app_state.registrar.warm_presence_cache().await?;

        let app = setup_app_router(app_state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([0, 0, 0, 0], 3000))));

        Ok(Self {
            app,
            app_state,
            store,
            notifier,
        })
    }

    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn store(&self) -> &TestStore {
        &self.store
    }

    pub fn notifier(&self) -> &TestNotifier {
        &self.notifier
    }

    /// Wait for notifications sent in the background
    pub async fn settle_notifications(&self) {
        self.app_state
            .registrar
            .drain(Duration::from_secs(1))
            .await;
    }
}
