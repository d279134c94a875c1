//! Production server setup code

use crate::{
    db::{self, schema::participants, Pool},
    encryption::EmailCipher,
    models::participant::{NewParticipantRecord, Participant, ParticipantRecord},
    settings,
    setups::{page_bounds, Notifier, ParticipantStore, ServerSetup, StoreError},
};
use anyhow::Result;
use async_trait::async_trait;
use diesel::{
    dsl::exists, result::DatabaseErrorKind, ExpressionMethods, QueryDsl, SelectableHelper,
};
use diesel_async::RunQueryDsl;
use mailgun_rs::{EmailAddress, Mailgun, MailgunRegion, Message};
use std::{collections::HashMap, sync::Arc};

/// Production implementation of `ServerSetup`.
/// Stores participants in Postgres and sends mails through Mailgun.
#[derive(Clone, Debug, Default)]
pub struct ProdSetup;

impl ServerSetup for ProdSetup {
    type Store = PgStore;
    type Notifier = MailgunNotifier;
}

/// A [`ParticipantStore`] on a Postgres connection pool.
///
/// The unique index on `address` arbitrates concurrent activations of one
/// identity. Emails are sealed with an [`EmailCipher`] before they are written.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
    cipher: Arc<EmailCipher>,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool", &self.pool.state())
            .finish_non_exhaustive()
    }
}

impl PgStore {
    /// Create a new store on a migrated database
    pub fn new(pool: Pool, cipher: EmailCipher) -> Self {
        Self {
            pool,
            cipher: Arc::new(cipher),
        }
    }
}

fn backend(err: impl Into<anyhow::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

/// A unique violation on insert means `address` is already a participant
fn insert_error(err: diesel::result::Error, address: &str) -> StoreError {
    match err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::Duplicate(address.to_string())
        }
        err => backend(err),
    }
}

#[async_trait]
impl ParticipantStore for PgStore {
    async fn exists(&self, identity: &str) -> Result<bool, StoreError> {
        let mut conn = db::connect(&self.pool).await?;

        diesel::select(exists(
            participants::table.filter(participants::address.eq(identity)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(backend)
    }

    async fn persist(&self, participant: &Participant) -> Result<(), StoreError> {
        let record = NewParticipantRecord::sealed(participant, &self.cipher).map_err(backend)?;
        let mut conn = db::connect(&self.pool).await?;

        tracing::debug!(address = %record.address, "Persisting participant");

        diesel::insert_into(participants::table)
            .values(&record)
            .execute(&mut conn)
            .await
            .map_err(|err| insert_error(err, &participant.address))?;

        Ok(())
    }

    async fn list(
        &self,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Participant>, StoreError> {
        let mut conn = db::connect(&self.pool).await?;

        let len: i64 = participants::table
            .count()
            .get_result(&mut conn)
            .await
            .map_err(backend)?;
        let range = page_bounds(usize::try_from(len).map_err(backend)?, offset, limit)?;

        let records: Vec<ParticipantRecord> = participants::table
            .select(ParticipantRecord::as_select())
            .order(participants::id.asc())
            .offset(range.start as i64)
            .limit(range.len() as i64)
            .load(&mut conn)
            .await
            .map_err(backend)?;

        records
            .into_iter()
            .map(|record| record.open(&self.cipher).map_err(backend))
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = db::connect(&self.pool).await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Sends activation links and confirmations over email
pub struct MailgunNotifier {
    settings: settings::Mailgun,
}

impl MailgunNotifier {
    /// Create a new MailgunNotifier
    pub fn new(settings: settings::Mailgun) -> Self {
        Self { settings }
    }

    fn sender(&self) -> EmailAddress {
        EmailAddress::name_address(&self.settings.from_name, &self.settings.from_address)
    }

    fn message(
        &self,
        email: &str,
        subject: &str,
        template: &str,
        template_vars: HashMap<String, String>,
    ) -> Message {
        Message {
            to: vec![EmailAddress::address(email)],
            subject: subject.to_string(),
            template: template.to_string(),
            template_vars,
            ..Default::default()
        }
    }

    async fn send(&self, email: &str, message: Message) -> Result<()> {
        tracing::debug!(
            to = email,
            subject = %message.subject,
            template = %message.template,
            "sending email"
        );

        let client = Mailgun {
            message,
            api_key: self.settings.api_key.clone(),
            domain: self.settings.domain.clone(),
        };

        client.async_send(MailgunRegion::US, &self.sender()).await?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send_activation_link(&self, contact: &str, link: &str, fingerprint: &str) -> Result<()> {
        let message = self.message(
            contact,
            &self.settings.activation_subject,
            &self.settings.activation_template,
            HashMap::from_iter([
                ("link".to_string(), link.to_string()),
                ("fingerprint".to_string(), fingerprint.to_string()),
            ]),
        );

        self.send(contact, message).await
    }

    async fn send_confirmation(&self, contact: &str) -> Result<()> {
        let message = self.message(
            contact,
            &self.settings.confirmation_subject,
            &self.settings.confirmation_template,
            HashMap::new(),
        );

        self.send(contact, message).await
    }
}
