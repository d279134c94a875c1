//! Settings / Configuration.

use crate::encryption::EmailCipher;
use anyhow::{ensure, Context as _, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;
use waitlist_core::{
    limiter::{AdmissionLimiter, Quota},
    token::{Algorithm, TokenService},
};

/// Names of environments for waitlist-server.
/// Overrides serialization to force lower case in settings and
/// environment variables
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    /// Local environment (local testing).
    Local,
    /// Official Develop environment.
    Dev,
    /// Official environment.
    Staging,
    /// Official Production environment.
    Prod,
}

/// Implement display to force environment to lower case
impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Server settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    /// Server [AppEnvironment].
    pub environment: AppEnvironment,
    /// Server port.
    pub port: u16,
    /// Server metrics port.
    pub metrics_port: u16,
    /// Server timeout in milliseconds.
    pub timeout_ms: u64,
    /// Base of the links mailed to candidates,
    /// completed with `/activate/<token>/<fingerprint>`
    pub activation_base_url: Url,
    /// How long shutdown waits for pending notifications, in milliseconds.
    pub drain_timeout_ms: u64,
}

/// Activation token settings.
#[derive(Clone, Deserialize)]
pub struct Token {
    /// Signing algorithm
    pub algorithm: Algorithm,
    /// Issuer stamped into and expected from tokens
    pub issuer: String,
    /// Token lifetime in seconds
    pub window_secs: u64,
    /// Shared secret for HMAC algorithms. A random one is used when unset.
    pub secret: Option<String>,
    /// PEM file holding a PKCS#8 private key for ECDSA algorithms,
    /// relative to the settings file. A fresh key is used when unset.
    pub key_path: Option<String>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Token")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("window_secs", &self.window_secs)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

/// Admission limiter settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Limiter {
    /// Is per-client limiting enabled?
    pub enabled: bool,
    /// Requests regained per second and client.
    pub rate_per_sec: f64,
    /// Back-to-back requests allowed per client.
    pub burst: u32,
    /// How often idle clients are evicted, in seconds.
    pub sweep_interval_secs: u64,
    /// Inactivity after which a client is evicted, in seconds.
    pub idle_threshold_secs: u64,
}

impl Limiter {
    /// Reject settings the limiter can't run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sweep_interval_secs > 0,
            "limiter.sweep_interval_secs must be at least 1"
        );

        if self.enabled {
            ensure!(
                self.rate_per_sec.is_finite() && self.rate_per_sec > 0.0,
                "limiter.rate_per_sec must be a positive number, got {}",
                self.rate_per_sec
            );
            ensure!(self.burst > 0, "limiter.burst must be at least 1");
        }

        Ok(())
    }

    /// Build the configured admission policy
    pub fn admission_limiter(&self) -> Result<AdmissionLimiter> {
        self.validate()?;

        Ok(if self.enabled {
            AdmissionLimiter::per_client(Quota {
                rate_per_sec: self.rate_per_sec,
                burst: self.burst,
            })
        } else {
            AdmissionLimiter::Unlimited
        })
    }

    /// Sweep interval as a [Duration]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Idle threshold as a [Duration]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}

/// Access control settings.
#[derive(Clone, Deserialize)]
pub struct Security {
    /// Value expected in the `x-api-key` header
    pub api_key: String,
    /// Two-segment path, e.g. `admin/participants`, under which the
    /// participant list is served
    pub list_path: String,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Security")
            .field("api_key", &"<redacted>")
            .field("list_path", &"<redacted>")
            .finish()
    }
}

impl Security {
    /// Split `list_path` into its two segments
    pub fn list_path_segments(&self) -> Result<(String, String)> {
        let mut segments = self.list_path.trim_matches('/').split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
                Ok((first.to_string(), second.to_string()))
            }
            _ => anyhow::bail!("security.list_path must have exactly two segments"),
        }
    }
}

/// Database settings.
#[derive(Clone, Deserialize)]
pub struct Database {
    /// Database URL
    pub url: String,
    /// Connect Timeout
    pub connect_timeout: u64,
    /// Base64 encoded 32 byte key sealing participant emails
    pub encryption_key: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Database")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// [Mailgun] settings.
///
/// [Mailgun]: https://www.mailgun.com/
#[derive(Clone, Deserialize)]
pub struct Mailgun {
    /// Mailgun API key.
    pub api_key: String,
    /// Mailgun domain.
    pub domain: String,
    /// Mailgun From Address
    pub from_address: String,
    /// Mailgun From Name
    pub from_name: String,
    /// Subject of the mail carrying the activation link
    pub activation_subject: String,
    /// Template of the mail carrying the activation link
    pub activation_template: String,
    /// Subject of the mail confirming an activation
    pub confirmation_subject: String,
    /// Template of the mail confirming an activation
    pub confirmation_template: String,
}

impl std::fmt::Debug for Mailgun {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Mailgun")
            .field("domain", &self.domain)
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("activation_template", &self.activation_template)
            .field("confirmation_template", &self.confirmation_template)
            .finish_non_exhaustive()
    }
}

/// Background healthcheck settings
#[derive(Clone, Debug, Deserialize)]
pub struct Healthcheck {
    /// Is background healthcheck enabled?
    #[serde(rename = "enabled")]
    pub is_enabled: bool,
    /// Healthcheck interval in milliseconds.
    pub interval_ms: u64,
    /// Healthcheck max retries.
    pub max_retries: u32,
}

#[derive(Clone, Debug, Deserialize)]
/// Application settings.
pub struct Settings {
    /// Server settings
    pub server: Server,
    /// Token settings
    pub token: Token,
    /// Admission limiter settings
    pub limiter: Limiter,
    /// Access control settings
    pub security: Security,
    /// Database settings
    pub database: Database,
    /// Mailgun settings
    pub mailgun: Mailgun,
    /// Healthcheck settings
    pub healthcheck: Healthcheck,
    /// The path where the settings file resides.
    /// This can't actually be configured in the settings file itself, for obvious reasons.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path
            .unwrap_or(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/settings.toml"));
        // inject environment variables naming them properly on the settings
        // e.g. [security] api_key="foo"
        // would be injected with environment variable WAITLIST_SECURITY__API_KEY="foo"
        let s = Config::builder()
            .add_source(File::with_name(&path.as_path().display().to_string()))
            .add_source(
                Environment::with_prefix("WAITLIST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut settings: Self = s.try_deserialize()?;
        settings.limiter.validate()?;
        settings.path = Some(path);
        Ok(settings)
    }

    /// Resolve a path from the settings file against the directory
    /// the settings file lives in
    pub fn relative_path(&self, path: impl AsRef<Path>) -> PathBuf {
        if let Some(settings_dir) = self.path.as_ref().and_then(|p| p.parent()) {
            settings_dir.join(path)
        } else {
            path.as_ref().to_path_buf()
        }
    }

    /// Cipher sealing participant emails in the database
    pub fn email_cipher(&self) -> Result<EmailCipher> {
        EmailCipher::from_base64(&self.database.encryption_key)
            .context("database.encryption_key is invalid")
    }

    /// Build the token service from the configured algorithm and key material
    pub fn token_service(&self) -> Result<TokenService> {
        let algorithm = self.token.algorithm;

        let service = match (&self.token.secret, &self.token.key_path) {
            (Some(secret), _) if algorithm.is_symmetric() => {
                TokenService::hmac(algorithm, secret.as_bytes())?
            }
            (_, Some(key_path)) if !algorithm.is_symmetric() => {
                let key_path = self.relative_path(key_path);
                let pem = std::fs::read_to_string(&key_path)
                    .with_context(|| format!("reading token key {}", key_path.display()))?;
                TokenService::ecdsa_from_pem(algorithm, &pem)?
            }
            _ => {
                tracing::warn!(
                    subject = "token_key",
                    category = "init",
                    %algorithm,
                    "no key material configured, using an ephemeral key"
                );
                TokenService::generate(algorithm)?
            }
        };

        Ok(service
            .with_issuer(&self.token.issuer)
            .with_window(Duration::from_secs(self.token.window_secs)))
    }
}
