//! Checkout coordination.
//!
//! A checkout moves through a small state machine:
//!
//! ```text
//! Idle ──start──▶ Previewing ──confirm──▶ Submitting ──ok──▶ Succeeded
//!   ▲                │   ▲                     │
//!   └─────cancel─────┘   └──error / dropped────┘
//! ```
//!
//! A failed submission has no resting phase of its own: the coordinator goes
//! straight back to Previewing and keeps the message in
//! [`CheckoutCoordinator::last_error`]. Dropping a `confirm` future mid-flight
//! (a timeout, an aborted task) also reopens the preview.
//!
//! [`CheckoutCoordinator::start_checkout`] freezes the cart into a
//! [`CheckoutSnapshot`]; later cart edits never reach the submitted order.
//! The Submitting state doubles as the re-entrancy guard: a second confirm,
//! cancel or restart while a submission is in flight fails with
//! [`CheckoutError::Busy`].
//!
//! Without an order API, [`direct_checkout_link`] hands the whole cart to the
//! order bot instead.

use std::sync::{Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use shopcart_core::{Cart, CheckoutSnapshot, OrderId, OrderPayload};
use thiserror::Error;
use tracing::instrument;

use crate::config::CheckoutConfig;
use crate::deep_link::{DeepLinkError, DeepLinks};
use crate::error::add_breadcrumb;
use crate::gateway::{GatewayError, OrderGateway};
use crate::storage::StorageError;
use crate::store::CartStore;

const GENERIC_FAILURE_MESSAGE: &str =
    "We could not submit your order. Please try again or contact the manager.";

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("a submission is already in progress")]
    Busy,

    #[error("checkout has not been started")]
    NotPreviewing,

    #[error("security token cookie is missing")]
    MissingSecurityToken,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("order submission failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("deep link error: {0}")]
    DeepLink(#[from] DeepLinkError),
}

impl CheckoutError {
    /// Message safe to show the customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your cart is empty.".to_string(),
            Self::Busy => "Your order is already being submitted.".to_string(),
            Self::NotPreviewing => "Open the order preview before confirming.".to_string(),
            Self::MissingSecurityToken => {
                "Security check failed. Please reload the page and try again.".to_string()
            }
            Self::Gateway(err) => err
                .server_message()
                .map_or_else(|| GENERIC_FAILURE_MESSAGE.to_string(), ToString::to_string),
            Self::Storage(_) | Self::DeepLink(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Whether confirming again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::Busy)
    }
}

/// Where a checkout currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Previewing,
    Submitting,
    Succeeded,
}

impl CheckoutPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Previewing => "previewing",
            Self::Submitting => "submitting",
            Self::Succeeded => "succeeded",
        }
    }
}

/// A successfully submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub order_id: OrderId,
    /// Link that opens a chat with the manager about this order.
    pub redirect: String,
}

#[derive(Debug, Default)]
struct CheckoutState {
    phase: CheckoutPhase,
    snapshot: Option<CheckoutSnapshot>,
    last_error: Option<String>,
}

/// Drives a checkout from preview to submitted order.
pub struct CheckoutCoordinator<G> {
    store: CartStore,
    gateway: G,
    links: DeepLinks,
    settings: CheckoutConfig,
    state: Mutex<CheckoutState>,
}

impl<G: OrderGateway> CheckoutCoordinator<G> {
    #[must_use]
    pub fn new(store: CartStore, gateway: G, links: DeepLinks, settings: CheckoutConfig) -> Self {
        Self {
            store,
            gateway,
            links,
            settings,
            state: Mutex::new(CheckoutState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CheckoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn phase(&self) -> CheckoutPhase {
        self.state().phase
    }

    /// Whether a submission is in flight; the confirm control should be
    /// disabled meanwhile.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase() == CheckoutPhase::Submitting
    }

    /// The snapshot being previewed, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<CheckoutSnapshot> {
        self.state().snapshot.clone()
    }

    /// Message from the last failed confirm, cleared on the next start.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Open the order preview with a snapshot of the current cart.
    ///
    /// Starting again while previewing takes a fresh snapshot.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` if there is nothing to order
    /// - `Busy` while a submission is in flight
    /// - `Storage` if the cart cannot be read
    #[instrument(skip(self))]
    pub fn start_checkout(&self) -> Result<CheckoutSnapshot, CheckoutError> {
        let mut state = self.state();
        if state.phase == CheckoutPhase::Submitting {
            return Err(CheckoutError::Busy);
        }

        let snapshot = self.store.snapshot()?;
        if snapshot.is_empty() {
            state.phase = CheckoutPhase::Idle;
            state.snapshot = None;
            tracing::debug!("Checkout refused, cart is empty");
            return Err(CheckoutError::EmptyCart);
        }

        let items = snapshot.items().len().to_string();
        add_breadcrumb("checkout", "Opened order preview", Some(&[("items", items.as_str())]));
        tracing::info!(items = snapshot.items().len(), total = %snapshot.total(), "Checkout started");

        state.phase = CheckoutPhase::Previewing;
        state.snapshot = Some(snapshot.clone());
        state.last_error = None;
        Ok(snapshot)
    }

    /// Close the preview and discard its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while a submission is in flight; it cannot be cancelled.
    pub fn cancel(&self) -> Result<(), CheckoutError> {
        let mut state = self.state();
        if state.phase == CheckoutPhase::Submitting {
            return Err(CheckoutError::Busy);
        }
        if state.phase == CheckoutPhase::Previewing {
            add_breadcrumb("checkout", "Closed order preview", None);
        }
        tracing::debug!(from = state.phase.as_str(), "Checkout reset to idle");
        state.phase = CheckoutPhase::Idle;
        state.snapshot = None;
        Ok(())
    }

    /// Submit the previewed order.
    ///
    /// `cookie_header` is the raw `Cookie` header the security token is read
    /// from. On failure the preview stays open so the customer can retry.
    /// Failures are not sent to Sentry here; callers report them through
    /// [`CartError::report`](crate::CartError::report).
    ///
    /// # Errors
    ///
    /// - `NotPreviewing` if no preview is open
    /// - `Busy` while another submission is in flight
    /// - `MissingSecurityToken` if the token cookie is absent (nothing is sent)
    /// - `Gateway` if the backend is unreachable or rejects the order
    #[instrument(skip(self, cookie_header))]
    pub async fn confirm(
        &self,
        cookie_header: Option<&str>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let (payload, token) = self.begin_submission(cookie_header)?;

        let guard = SubmissionGuard::new(&self.state);
        let result = self.gateway.submit(&payload, &token).await;
        guard.disarm();

        match result {
            Ok(order_id) => self.finish_success(order_id),
            Err(err) => Err(self.finish_failure(err)),
        }
    }

    fn begin_submission(
        &self,
        cookie_header: Option<&str>,
    ) -> Result<(OrderPayload, SecretString), CheckoutError> {
        let mut state = self.state();
        match state.phase {
            CheckoutPhase::Previewing => {}
            CheckoutPhase::Submitting => return Err(CheckoutError::Busy),
            CheckoutPhase::Idle | CheckoutPhase::Succeeded => {
                return Err(CheckoutError::NotPreviewing);
            }
        }
        let Some(snapshot) = state.snapshot.as_ref() else {
            state.phase = CheckoutPhase::Idle;
            return Err(CheckoutError::NotPreviewing);
        };

        let Some(token) = security_token(cookie_header, &self.settings.token_cookie) else {
            let err = CheckoutError::MissingSecurityToken;
            tracing::warn!(cookie = %self.settings.token_cookie, "Security token cookie missing");
            state.last_error = Some(err.user_message());
            return Err(err);
        };

        let payload = OrderPayload::from_snapshot(
            snapshot,
            self.settings.currency,
            &self.settings.source_tag,
            &self.settings.page_url,
            self.store.now(),
        );

        add_breadcrumb("checkout", "Submitting order", None);
        state.phase = CheckoutPhase::Submitting;
        state.last_error = None;
        Ok((payload, token))
    }

    fn finish_success(&self, order_id: OrderId) -> Result<CheckoutOutcome, CheckoutError> {
        {
            let mut state = self.state();
            state.phase = CheckoutPhase::Succeeded;
            state.snapshot = None;
        }

        tracing::info!(order_id = %order_id, "Order submitted");
        add_breadcrumb("checkout", "Order submitted", Some(&[("order_id", order_id.as_str())]));

        if let Err(e) = self.store.stamp_order() {
            tracing::error!(error = %e, "Failed to record order timestamp");
        }

        let redirect = self.links.order_link(&order_id)?;
        Ok(CheckoutOutcome { order_id, redirect })
    }

    fn finish_failure(&self, err: GatewayError) -> CheckoutError {
        let err = CheckoutError::from(err);
        tracing::info!(error = %err, retryable = err.is_retryable(), "Order submission failed");

        let mut state = self.state();
        state.phase = CheckoutPhase::Previewing;
        state.last_error = Some(err.user_message());
        err
    }
}

/// Reopens the preview if a submission is abandoned before it completes.
struct SubmissionGuard<'a> {
    state: &'a Mutex<CheckoutState>,
    armed: bool,
}

impl<'a> SubmissionGuard<'a> {
    const fn new(state: &'a Mutex<CheckoutState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.phase == CheckoutPhase::Submitting {
            tracing::warn!(
                from = state.phase.as_str(),
                "Order submission abandoned, reopening preview"
            );
            state.phase = CheckoutPhase::Previewing;
            state.last_error = Some(GENERIC_FAILURE_MESSAGE.to_string());
        }
    }
}

/// Build a direct order bot link for `cart`, with no backend involved.
///
/// No order id is assigned and no order timestamp is recorded.
///
/// # Errors
///
/// Returns `EmptyCart` for an empty cart, or `DeepLink` if the link cannot
/// be built.
pub fn direct_checkout_link(links: &DeepLinks, cart: &Cart) -> Result<String, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    Ok(links.direct_link(cart.items())?)
}

/// Read the security token from a raw `Cookie` header.
///
/// Values are percent-decoded; an empty value counts as missing.
#[must_use]
pub fn security_token(cookie_header: Option<&str>, cookie_name: &str) -> Option<SecretString> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .and_then(|(_, value)| urlencoding::decode(value.trim()).ok())
        .filter(|value| !value.is_empty())
        .map(|value| SecretString::from(value.into_owned()))
}
