//! Database configuration & connections

use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use bb8::PooledConnection;
use diesel::{Connection, PgConnection};
use diesel_async::{pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};

/// Migrations embedded into the binary
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Type alias for the connection pool
pub type Pool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Type alias for the connection
pub type Conn<'a> = PooledConnection<'a, AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Build the database pool
pub async fn pool(url: &str, connect_timeout: u64) -> Result<Pool> {
    tracing::info!(%connect_timeout, "Connecting to database via pool");

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);

    let pool = bb8::Pool::builder()
        .connection_timeout(Duration::from_secs(connect_timeout))
        .build(config)
        .await
        .map_err(|e| anyhow!("Could not build the database pool: {e}"))?;

    Ok(pool)
}

/// Establish a connection
pub async fn connect(pool: &Pool) -> Result<Conn<'_>> {
    tracing::debug!("Creating a db connection from connection pool");
    pool.get()
        .await
        .map_err(|e| anyhow!("Failed to connect to the database: {e}"))
}

/// Apply pending migrations over a dedicated blocking connection
pub async fn run_migrations(url: &str) -> Result<()> {
    let url = url.to_string();

    tokio::task::spawn_blocking(move || {
        let mut conn =
            PgConnection::establish(&url).context("Cannot connect to postgres database.")?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!(e))
            .context("Could not run migrations")?;

        tracing::info!(
            subject = "database",
            category = "init",
            applied = applied.len(),
            "migrations applied"
        );

        Ok::<_, anyhow::Error>(())
    })
    .await?
}
