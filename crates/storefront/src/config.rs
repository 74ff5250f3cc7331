//! Shop configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MODERNSHOP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MODERNSHOP_BASE_URL` - Public URL of the shop
//! - `MODERNSHOP_SESSION_SECRET` - Cookie signing secret (min 64 chars, high entropy)
//!
//! ## Optional
//! - `MODERNSHOP_HOST` - Bind address (default: 127.0.0.1)
//! - `MODERNSHOP_PORT` - Listen port (default: 3000)
//! - `LOGIN_OTP_WINDOW_DAYS` - Days after which a password login needs an OTP (default: 10)
//! - `GOOGLE_SKIP_OTP_WINDOW_DAYS` - Days within which a Google login skips the OTP,
//!   or `disabled` (default: same as `LOGIN_OTP_WINDOW_DAYS`)
//! - `SMTP_HOST`, `SMTP_PORT` (587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` -
//!   Outgoing mail; without `SMTP_HOST` codes are returned in responses instead
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_CALLBACK_URL` - Google sign-in
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for JSON logs, anything else for human-readable

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use chrono::TimeDelta;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// `tower_sessions::cookie::Key` needs at least 64 bytes of key material.
const MIN_SESSION_SECRET_LENGTH: usize = 64;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_LOGIN_OTP_WINDOW_DAYS: i64 = 10;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Whether logs are written as JSON or human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Shop application configuration.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used for cookie security and email links
    pub base_url: String,
    /// Session cookie signing secret
    pub session_secret: SecretString,
    pub auth: AuthSettings,
    /// SMTP settings; `None` disables outgoing mail
    pub email: Option<EmailConfig>,
    /// Google OAuth settings; `None` disables Google sign-in
    pub google: Option<GoogleConfig>,
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Login policy knobs.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// A password login older than this needs a fresh OTP.
    pub stale_login_window: TimeDelta,
    /// A Google login within this window skips the OTP. `None` always asks.
    pub oauth_skip_otp_window: Option<TimeDelta>,
    /// Account that cannot be demoted or bulk-deleted.
    pub protected_admin_username: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        let window = TimeDelta::days(DEFAULT_LOGIN_OTP_WINDOW_DAYS);
        Self {
            stale_login_window: window,
            oauth_skip_otp_window: Some(window),
            protected_admin_username: "admin".to_owned(),
        }
    }
}

/// SMTP configuration for outgoing email.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Google OAuth 2.0 client configuration.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Absolute URL Google redirects back to
    pub callback_url: String,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

impl ShopConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MODERNSHOP_DATABASE_URL")?;
        let host = get_env_or_default("MODERNSHOP_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MODERNSHOP_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("MODERNSHOP_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MODERNSHOP_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_required_env("MODERNSHOP_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let session_secret = get_validated_secret("MODERNSHOP_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "MODERNSHOP_SESSION_SECRET")?;

        let auth = AuthSettings::from_env()?;
        let email = EmailConfig::from_env()?;
        let google = GoogleConfig::from_env(&base_url)?;
        let log_format = match get_optional_env("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            auth,
            email,
            google,
            log_format,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// A self-consistent configuration for tests: no mail, no Google.
    #[cfg(any(test, feature = "test-support"))]
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/modernshop_test"),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            base_url: "http://localhost:3000".to_owned(),
            session_secret: SecretString::from(
                "k7Q2mZ9vXc4Rb8NwLp3TgH6yJd1FsA5eUo0KiV7qWz2MxC9nBr4Et8YhGu3Pj6Sl".to_owned(),
            ),
            auth: AuthSettings::default(),
            email: None,
            google: None,
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        }
    }
}

impl AuthSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let stale_days = get_optional_env("LOGIN_OTP_WINDOW_DAYS");
        let stale_login_window = parse_window_days("LOGIN_OTP_WINDOW_DAYS", stale_days.as_deref())?
            .unwrap_or_else(|| TimeDelta::days(DEFAULT_LOGIN_OTP_WINDOW_DAYS));

        let oauth_skip_otp_window = match get_optional_env("GOOGLE_SKIP_OTP_WINDOW_DAYS") {
            None => Some(stale_login_window),
            Some(raw) => parse_window_days("GOOGLE_SKIP_OTP_WINDOW_DAYS", Some(&raw))?,
        };

        Ok(Self {
            stale_login_window,
            oauth_skip_otp_window,
            ..Self::default()
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_env_or_default("EMAIL_FROM", "ModernShop <noreply@modernshop.com>"),
        }))
    }
}

impl GoogleConfig {
    fn from_env(base_url: &str) -> Result<Option<Self>, ConfigError> {
        let Some(client_id) = get_optional_env("GOOGLE_CLIENT_ID") else {
            return Ok(None);
        };
        Ok(Some(Self {
            client_id,
            client_secret: get_validated_secret("GOOGLE_CLIENT_SECRET")?,
            callback_url: get_optional_env("GOOGLE_CALLBACK_URL")
                .unwrap_or_else(|| format!("{base_url}/auth/google/callback")),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a whole number of days, or `disabled`.
///
/// Returns `Ok(None)` for an unset variable or `disabled`.
fn parse_window_days(key: &str, raw: Option<&str>) -> Result<Option<TimeDelta>, ConfigError> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(None);
    };
    if raw.eq_ignore_ascii_case("disabled") {
        return Ok(None);
    }
    let days = raw
        .parse::<i64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !(0..=3650).contains(&days) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("{days} is outside 0..=3650"),
        ));
    }
    Ok(Some(TimeDelta::days(days)))
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
