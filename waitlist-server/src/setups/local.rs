//! Server setup for local development & easier integration testing

use super::{prod::PgStore, Notifier, ServerSetup};
use anyhow::Result;
use async_trait::async_trait;

/// Implementation of `ServerSetup` for local environments.
/// Participants still go to the database, but no mail leaves the machine.
#[derive(Debug, Clone)]
pub struct LocalSetup;

impl ServerSetup for LocalSetup {
    type Store = PgStore;
    type Notifier = LogNotifier;
}

/// A `Notifier` that doesn't actually send emails,
/// but instead logs them via tracing.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_activation_link(&self, contact: &str, link: &str, fingerprint: &str) -> Result<()> {
        tracing::info!(contact, link, fingerprint, "activation link");
        Ok(())
    }

    async fn send_confirmation(&self, contact: &str) -> Result<()> {
        tracing::info!(contact, "activation confirmed");
        Ok(())
    }
}
