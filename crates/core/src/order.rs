//! Checkout snapshots and the order payload sent to the backend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartItem};
use crate::types::{CurrencyCode, round_to_units};

/// An immutable copy of the cart taken when checkout starts.
///
/// Later cart mutations never reach an in-flight checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSnapshot {
    items: Vec<CartItem>,
    total: Decimal,
    taken_at: DateTime<Utc>,
}

impl CheckoutSnapshot {
    #[must_use]
    pub fn from_cart(cart: &Cart, taken_at: DateTime<Utc>) -> Self {
        Self {
            items: cart.items().cloned().collect(),
            total: cart.total_price(),
            taken_at,
        }
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub const fn total(&self) -> Decimal {
        self.total
    }

    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Lines as they will be submitted, with prices rounded to whole units.
    #[must_use]
    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.items.iter().map(OrderLine::from).collect()
    }

    /// The total the backend will receive: the sum of rounded lines.
    ///
    /// This can differ from [`total`](Self::total) when unit prices carry
    /// fractions; previews should show this one.
    #[must_use]
    pub fn payable_total(&self) -> i64 {
        lines_total(&self.order_lines())
    }
}

fn lines_total(lines: &[OrderLine]) -> i64 {
    lines
        .iter()
        .fold(0_i64, |acc, line| acc.saturating_add(line.line_total()))
}

/// One line of an order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: String,
    pub name: String,
    /// Unit price rounded to whole units.
    pub price: i64,
    pub qty: u32,
}

impl OrderLine {
    /// `price × qty`, saturating.
    #[must_use]
    pub fn line_total(&self) -> i64 {
        self.price.saturating_mul(i64::from(self.qty))
    }
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            sku: item.sku.as_deref().unwrap_or_default().trim().to_owned(),
            name: item.name.trim().to_owned(),
            price: round_to_units(item.price),
            qty: item.quantity.max(1),
        }
    }
}

/// Body of `POST /api/create-order/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub items: Vec<OrderLine>,
    pub total: i64,
    pub currency: CurrencyCode,
    /// Where the order came from (e.g. `site`).
    pub source: String,
    /// Referring page URL.
    pub page: String,
    /// Submission time in epoch milliseconds.
    pub ts: i64,
}

impl OrderPayload {
    /// Build a payload from a snapshot.
    ///
    /// The total is [`CheckoutSnapshot::payable_total`], recomputed from the
    /// normalized lines.
    #[must_use]
    pub fn from_snapshot(
        snapshot: &CheckoutSnapshot,
        currency: CurrencyCode,
        source: &str,
        page: &str,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let items = snapshot.order_lines();
        let total = lines_total(&items);

        Self {
            items,
            total,
            currency,
            source: source.to_owned(),
            page: page.to_owned(),
            ts: submitted_at.timestamp_millis(),
        }
    }
}
