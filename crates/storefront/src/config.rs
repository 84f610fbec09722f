//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `SHOPCART_STORAGE_PATH` - Storage file (default: .shopcart/storage.json)
//! - `SHOPCART_API_BASE_URL` - Order API base URL; without it checkout uses a
//!   direct bot link
//! - `SHOPCART_API_TIMEOUT_SECS` - Order API request timeout (default: 15)
//! - `SHOPCART_TOKEN_COOKIE` - Cookie holding the security token (default: csrftoken)
//! - `SHOPCART_TOKEN_HEADER` - Header the token is sent in (default: X-CSRFToken)
//! - `SHOPCART_MESSAGING_HOST` - Messaging link host (default: t.me)
//! - `SHOPCART_MANAGER_HANDLE` - Manager account (default: shopcart_manager)
//! - `SHOPCART_BOT_HANDLE` - Order bot account (default: shopcart_order_bot)
//! - `SHOPCART_CURRENCY` - Currency code (default: UAH)
//! - `SHOPCART_SOURCE_TAG` - Order source tag (default: site)
//! - `SHOPCART_PAGE_URL` - Referring page sent with orders (default: empty)
//! - `SHOPCART_CATALOG_URL` - Continue-shopping link (default: /catalog/)
//! - `SHOPCART_ORDER_EXPIRY_MINUTES` - Cart auto-clear delay after an order (default: 20)
//! - `SHOPCART_COOKIE` - Cookie header used by the CLI to read the token
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use secrecy::SecretString;
use shopcart_core::CurrencyCode;
use thiserror::Error;
use url::Url;

use crate::deep_link::DeepLinks;
use crate::gateway::DEFAULT_TOKEN_HEADER;
use crate::store::DEFAULT_ORDER_EXPIRY_MINUTES;

/// Default name of the cookie carrying the security token.
pub const DEFAULT_TOKEN_COOKIE: &str = "csrftoken";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Where the file store keeps its data
    pub storage_path: PathBuf,
    /// Order API; `None` selects direct bot links
    pub api: Option<ApiConfig>,
    pub messaging: MessagingConfig,
    pub checkout: CheckoutConfig,
    /// Cookie header the security token is read from (CLI only)
    pub cookie: Option<SecretString>,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("storage_path", &self.storage_path)
            .field("api", &self.api)
            .field("messaging", &self.messaging)
            .field("checkout", &self.checkout)
            .field("cookie", &self.cookie.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

/// Order API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
    /// Header the security token is sent in
    pub token_header: String,
}

/// Messaging app link configuration.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub host: String,
    pub manager_handle: String,
    pub bot_handle: String,
}

/// Checkout and page settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub currency: CurrencyCode,
    pub source_tag: String,
    pub page_url: String,
    pub catalog_url: String,
    pub order_expiry: TimeDelta,
    /// Cookie the security token is read from
    pub token_cookie: String,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let storage_path = env.get_or_default("SHOPCART_STORAGE_PATH", ".shopcart/storage.json");

        Ok(Self {
            storage_path: PathBuf::from(storage_path),
            api: ApiConfig::from_env(&env)?,
            messaging: MessagingConfig::from_env(&env)?,
            checkout: CheckoutConfig::from_env(&env)?,
            cookie: env.get_optional("SHOPCART_COOKIE").map(SecretString::from),
            sentry_dsn: env.get_optional("SENTRY_DSN"),
            sentry_environment: env.get_optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Link builder for the configured messaging accounts.
    #[must_use]
    pub fn deep_links(&self) -> DeepLinks {
        DeepLinks::new(
            &self.messaging.host,
            &self.messaging.manager_handle,
            &self.messaging.bot_handle,
            self.checkout.currency,
        )
    }
}

impl ApiConfig {
    fn from_env(env: &Env<'_>) -> Result<Option<Self>, ConfigError> {
        let Some(raw) = env.get_optional("SHOPCART_API_BASE_URL") else {
            return Ok(None);
        };
        let base_url = Url::parse(&raw).map_err(|e| {
            ConfigError::InvalidEnvVar("SHOPCART_API_BASE_URL".to_string(), e.to_string())
        })?;

        let timeout_secs: u64 = env.parse_or_default("SHOPCART_API_TIMEOUT_SECS", 15)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SHOPCART_API_TIMEOUT_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Some(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            token_header: env.get_or_default("SHOPCART_TOKEN_HEADER", DEFAULT_TOKEN_HEADER),
        }))
    }
}

impl MessagingConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env.get_or_default("SHOPCART_MESSAGING_HOST", "t.me"),
            manager_handle: handle(env, "SHOPCART_MANAGER_HANDLE", "shopcart_manager")?,
            bot_handle: handle(env, "SHOPCART_BOT_HANDLE", "shopcart_order_bot")?,
        })
    }
}

impl CheckoutConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let currency = match env.get_optional("SHOPCART_CURRENCY") {
            None => CurrencyCode::default(),
            Some(raw) => CurrencyCode::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SHOPCART_CURRENCY".to_string(),
                    format!("unsupported currency '{raw}'"),
                )
            })?,
        };

        let expiry_minutes: i64 =
            env.parse_or_default("SHOPCART_ORDER_EXPIRY_MINUTES", DEFAULT_ORDER_EXPIRY_MINUTES)?;
        let order_expiry = TimeDelta::try_minutes(expiry_minutes)
            .filter(|delta| *delta > TimeDelta::zero())
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SHOPCART_ORDER_EXPIRY_MINUTES".to_string(),
                    format!("must be a positive number of minutes (got {expiry_minutes})"),
                )
            })?;

        Ok(Self {
            currency,
            source_tag: env.get_or_default("SHOPCART_SOURCE_TAG", "site"),
            page_url: env.get_or_default("SHOPCART_PAGE_URL", ""),
            catalog_url: env.get_or_default("SHOPCART_CATALOG_URL", "/catalog/"),
            order_expiry,
            token_cookie: env.get_or_default("SHOPCART_TOKEN_COOKIE", DEFAULT_TOKEN_COOKIE),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable; blank values count as unset.
    fn get_optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Get a variable with a default value.
    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get_optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or_default<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_optional(key).map_or(Ok(default), |raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

/// Read a messaging handle, accepting an optional leading `@`.
fn handle(env: &Env<'_>, key: &str, default: &str) -> Result<String, ConfigError> {
    let raw = env.get_or_default(key, default);
    let handle = raw.trim_start_matches('@');
    if handle.is_empty() || handle.contains(['/', '?', '&', ' ']) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("'{raw}' is not a valid handle"),
        ));
    }
    Ok(handle.to_string())
}
