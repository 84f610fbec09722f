//! Cart count badges.
//!
//! A page may show the cart count in several places (header, mobile menu,
//! floating button) or none at all. [`BadgeSync`] projects the cart's total
//! quantity onto every registered [`BadgeElement`] whenever the cart changes.

use std::sync::{Arc, PoisonError, RwLock};

use askama::Template;
use shopcart_core::Cart;

use crate::store::{CartEvent, CartObserver};

/// A badge element owned by the page.
pub trait BadgeElement: Send + Sync {
    fn set_hidden(&self, hidden: bool);
    fn set_text(&self, text: &str);
}

/// What a badge should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeState {
    pub count: u64,
}

impl BadgeState {
    #[must_use]
    pub fn from_cart(cart: &Cart) -> Self {
        Self {
            count: cart.total_quantity(),
        }
    }

    /// Badges are hidden while the cart is empty.
    #[must_use]
    pub const fn hidden(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.count.to_string()
    }
}

/// Cart count badge fragment.
#[derive(Template)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u64,
    pub hidden: bool,
}

impl From<BadgeState> for CartCountTemplate {
    fn from(state: BadgeState) -> Self {
        Self {
            count: state.count,
            hidden: state.hidden(),
        }
    }
}

/// Render a badge as an HTML fragment.
///
/// # Errors
///
/// Returns an error if template rendering fails.
pub fn render_badge(state: BadgeState) -> askama::Result<String> {
    CartCountTemplate::from(state).render()
}

/// Keeps every registered badge in sync with the cart.
#[derive(Default)]
pub struct BadgeSync {
    badges: RwLock<Vec<Arc<dyn BadgeElement>>>,
}

impl BadgeSync {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a badge found on the page.
    pub fn register(&self, badge: Arc<dyn BadgeElement>) {
        self.badges
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(badge);
    }

    /// Number of registered badges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.badges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Project the cart's total quantity onto every badge.
    ///
    /// With no badges registered this does nothing.
    pub fn update_badges(&self, cart: &Cart) -> BadgeState {
        let state = BadgeState::from_cart(cart);
        let badges = self.badges.read().unwrap_or_else(PoisonError::into_inner);

        let text = state.text();
        for badge in badges.iter() {
            badge.set_text(&text);
            badge.set_hidden(state.hidden());
        }

        tracing::trace!(count = state.count, badges = badges.len(), "Updated badges");
        state
    }
}

impl CartObserver for BadgeSync {
    fn cart_changed(&self, event: &CartEvent<'_>) {
        self.update_badges(event.cart);
    }
}
