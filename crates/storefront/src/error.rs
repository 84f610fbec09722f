//! Unified error handling with Sentry integration.
//!
//! [`CartError`] wraps every module error so callers (the CLI, a page
//! controller) can handle one type. [`CartError::report`] captures the
//! failures worth investigating to Sentry; [`CartError::user_message`]
//! never exposes internal details.

use thiserror::Error;

use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::deep_link::DeepLinkError;
use crate::gateway::GatewayError;
use crate::storage::StorageError;

/// Top-level error type for the cart.
#[derive(Debug, Error)]
pub enum CartError {
    /// Persisted storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Checkout failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order backend failed outside a checkout.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A deep link could not be built or read.
    #[error("Link error: {0}")]
    DeepLink(#[from] DeepLinkError),

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid input from the caller.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Page rendering failed.
    #[error("Render error: {0}")]
    Render(#[from] askama::Error),
}

impl CartError {
    /// Message safe to show the customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Checkout(err) => err.user_message(),
            Self::Storage(_) => "Your cart could not be saved. Please try again.".to_string(),
            Self::Gateway(_) | Self::DeepLink(_) => "External service error".to_string(),
            Self::Config(_) | Self::Render(_) => "Internal error".to_string(),
            Self::BadRequest(msg) => msg.clone(),
        }
    }

    /// Whether this error is a fault worth reporting, as opposed to a
    /// customer mistake.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        match self {
            Self::Checkout(err) => matches!(
                err,
                CheckoutError::Storage(_) | CheckoutError::Gateway(_) | CheckoutError::DeepLink(_)
            ),
            Self::BadRequest(_) => false,
            _ => true,
        }
    }

    /// Capture faults to Sentry and log them.
    pub fn report(&self) {
        if self.is_fault() {
            let event_id = sentry::capture_error(self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Cart error");
        } else {
            tracing::debug!(error = %self, "Cart request rejected");
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Opened order preview", Some(&[("items", "2")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
