//! The cart model.
//!
//! A [`Cart`] maps [`ItemId`]s to [`CartItem`]s. All operations here are pure
//! in-memory transformations; persistence lives in the storefront crate.
//!
//! ## Invariants
//!
//! - Every stored item has `quantity >= 1`. An update that would drive the
//!   quantity to zero or below removes the item instead.
//! - Map keys always equal the stored item's `id`.
//! - Name and price are fixed when an item is first added. Re-adding the same
//!   id only accumulates quantity and backfills missing optional fields.
//! - Unit prices are capped at [`MAX_UNIT_PRICE`] and quantities at
//!   [`MAX_QUANTITY`]; totals saturate instead of overflowing.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::ItemId;

/// Largest unit price a line may carry (one trillion currency units).
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Largest quantity a line may carry.
pub const MAX_QUANTITY: u32 = 100_000;

/// Clamp a unit price into `0..=MAX_UNIT_PRICE`.
#[must_use]
pub fn clamp_price(price: Decimal) -> Decimal {
    price.clamp(Decimal::ZERO, MAX_UNIT_PRICE)
}

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Unit price in whole currency units.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl CartItem {
    /// `price × quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// An item as supplied by an "add to cart" control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub id: ItemId,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    /// Quantity to add. `None` or `Some(0)` adds one.
    pub quantity: Option<u32>,
    pub image_ref: Option<String>,
}

impl NewItem {
    /// Create a new item with a default quantity of one.
    #[must_use]
    pub const fn new(id: ItemId, name: String, price: Decimal) -> Self {
        Self {
            id,
            name,
            sku: None,
            price,
            quantity: None,
            image_ref: None,
        }
    }

    #[must_use]
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = non_blank(sku.into());
        self
    }

    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    #[must_use]
    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = non_blank(image_ref.into());
        self
    }

    /// The quantity this item contributes, never less than one.
    #[must_use]
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.filter(|q| *q > 0).unwrap_or(1).min(MAX_QUANTITY)
    }
}

/// Result of [`Cart::update_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The id was not in the cart.
    Missing,
    /// The item now has this quantity.
    Updated(u32),
    /// The quantity reached zero and the item was removed.
    Removed,
}

/// The anonymous, device-local cart.
///
/// Serializes as the persisted envelope `{"items": {"<id>": {...}}}`. Stored
/// data is read back through [`sanitize_envelope`](crate::schema::sanitize_envelope),
/// never through `Deserialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    items: BTreeMap<ItemId, CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item, merging into an existing line with the same id.
    ///
    /// Returns the line's quantity after the add.
    pub fn add_item(&mut self, item: NewItem) -> u32 {
        let added = item.effective_quantity();

        if let Some(existing) = self.items.get_mut(&item.id) {
            existing.quantity = existing.quantity.saturating_add(added).min(MAX_QUANTITY);
            if existing.sku.is_none() {
                existing.sku = item.sku.and_then(non_blank);
            }
            if existing.image_ref.is_none() {
                existing.image_ref = item.image_ref.and_then(non_blank);
            }
            return existing.quantity;
        }

        let line = CartItem {
            id: item.id.clone(),
            name: item.name.trim().to_owned(),
            sku: item.sku.and_then(non_blank),
            price: clamp_price(item.price),
            quantity: added,
            image_ref: item.image_ref.and_then(non_blank),
        };
        self.items.insert(item.id, line);
        added
    }

    /// Change a line's quantity by `delta`, removing it at zero or below.
    pub fn update_quantity(&mut self, id: &ItemId, delta: i64) -> QuantityChange {
        let Some(item) = self.items.get_mut(id) else {
            return QuantityChange::Missing;
        };

        let next = i64::from(item.quantity).saturating_add(delta);
        if next <= 0 {
            self.items.remove(id);
            return QuantityChange::Removed;
        }

        item.quantity = u32::try_from(next).unwrap_or(u32::MAX).min(MAX_QUANTITY);
        QuantityChange::Updated(item.quantity)
    }

    /// Remove a line. Returns the removed item, if it was present.
    pub fn remove_item(&mut self, id: &ItemId) -> Option<CartItem> {
        self.items.remove(id)
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.values().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of `price × quantity` over all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.items
            .values()
            .fold(Decimal::ZERO, |acc, item| acc.saturating_add(item.line_total()))
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&CartItem> {
        self.items.get(id)
    }

    /// Iterate over lines in id order.
    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an already-validated line, keyed by its own id.
    pub(crate) fn insert_line(&mut self, item: CartItem) {
        debug_assert!(item.quantity >= 1);
        self.items.insert(item.id.clone(), item);
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_owned())
    }
}
