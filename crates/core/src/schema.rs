//! Persisted cart envelope.
//!
//! The current schema stores `{"items": {"<id>": CartItem}}` as JSON. Older
//! schema versions are upgraded with [`SchemaVersion::upgrade`], and every
//! loaded document, current or upgraded, goes through [`sanitize_envelope`]
//! so that malformed fields are coerced in exactly one place.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value};

use crate::cart::{Cart, CartItem, MAX_QUANTITY, clamp_price};
use crate::types::ItemId;

/// Versions of the persisted cart schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// Entries use `qty` and `image`.
    V1,
    /// Entries use `quantity` and `imageRef`.
    V2,
}

impl SchemaVersion {
    /// The version written by this crate.
    pub const CURRENT: Self = Self::V2;

    /// Upgrade a raw document from this version to [`SchemaVersion::CURRENT`].
    #[must_use]
    pub fn upgrade(self, mut doc: Value) -> Value {
        if self == Self::V1
            && let Some(items) = doc.get_mut("items").and_then(Value::as_object_mut)
        {
            for entry in items.values_mut() {
                if let Some(fields) = entry.as_object_mut() {
                    rename_field(fields, "qty", "quantity");
                    rename_field(fields, "image", "imageRef");
                }
            }
        }
        doc
    }
}

fn rename_field(fields: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = fields.remove(from)
        && !fields.contains_key(to)
    {
        fields.insert(to.to_owned(), value);
    }
}

/// Serialize a cart into the current envelope format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_envelope(cart: &Cart) -> Result<String, serde_json::Error> {
    serde_json::to_string(cart)
}

/// Parse raw JSON and sanitize it into a cart.
///
/// # Errors
///
/// Returns an error only if `raw` is not JSON at all. Structurally wrong
/// documents yield an empty or partial cart instead.
pub fn decode_envelope(raw: &str) -> Result<Cart, serde_json::Error> {
    let doc: Value = serde_json::from_str(raw)?;
    Ok(sanitize_envelope(&doc))
}

/// Coerce an arbitrary JSON document into a valid [`Cart`].
///
/// - A non-object root or `items` field yields an empty cart.
/// - Entries that are not objects, have no usable id, or have a missing,
///   non-numeric or non-positive quantity are dropped.
/// - `price` that is missing, non-numeric or negative becomes zero. Prices
///   above [`MAX_UNIT_PRICE`](crate::cart::MAX_UNIT_PRICE) and quantities
///   above [`MAX_QUANTITY`] are capped.
/// - Entries are re-keyed by their own id.
#[must_use]
pub fn sanitize_envelope(doc: &Value) -> Cart {
    let mut cart = Cart::new();

    let Some(items) = doc.get("items").and_then(Value::as_object) else {
        return cart;
    };

    for (key, entry) in items {
        if let Some(item) = sanitize_item(key, entry) {
            cart.insert_line(item);
        }
    }

    cart
}

fn sanitize_item(key: &str, entry: &Value) -> Option<CartItem> {
    let fields = entry.as_object()?;

    let id = fields
        .get("id")
        .and_then(coerce_string)
        .and_then(|s| ItemId::parse(&s).ok())
        .or_else(|| ItemId::parse(key).ok())?;

    let quantity = fields
        .get("quantity")
        .or_else(|| fields.get("qty"))
        .and_then(coerce_decimal)
        .map(|q| q.round())
        .filter(|q| *q >= Decimal::ONE)
        .map(|q| q.to_u32().unwrap_or(u32::MAX).min(MAX_QUANTITY))?;

    let price = fields
        .get("price")
        .and_then(coerce_decimal)
        .filter(|p| !p.is_sign_negative())
        .map_or(Decimal::ZERO, clamp_price);

    Some(CartItem {
        id,
        name: fields
            .get("name")
            .and_then(coerce_string)
            .unwrap_or_default(),
        sku: fields.get("sku").and_then(coerce_string),
        price,
        quantity,
        image_ref: fields.get("imageRef").and_then(coerce_string),
    })
}

/// Strings and numbers become trimmed, non-empty strings.
fn coerce_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

/// Numbers and numeric strings become decimals.
fn coerce_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_u64().map(Decimal::from))
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cart::MAX_UNIT_PRICE;

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    #[test]
    fn test_missing_items_yields_empty_cart() {
        assert!(sanitize_envelope(&json!({})).is_empty());
        assert!(sanitize_envelope(&json!({"items": []})).is_empty());
        assert!(sanitize_envelope(&json!({"items": "oops"})).is_empty());
        assert!(sanitize_envelope(&json!(42)).is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(decode_envelope("{not json").is_err());
    }

    #[test]
    fn test_coerces_numeric_strings() {
        let cart = sanitize_envelope(&json!({
            "items": {
                "p1": {"id": "p1", "name": "Antenna", "price": "5000", "quantity": "2"}
            }
        }));
        let line = cart.get(&id("p1")).unwrap();
        assert_eq!(line.price, Decimal::from(5000));
        assert_eq!(line.quantity, 2);
    }

    #[test]
    fn test_drops_non_positive_or_missing_quantity() {
        let cart = sanitize_envelope(&json!({
            "items": {
                "a": {"id": "a", "price": 1, "quantity": 0},
                "b": {"id": "b", "price": 1, "quantity": -2},
                "c": {"id": "c", "price": 1},
                "d": {"id": "d", "price": 1, "quantity": "many"},
                "e": {"id": "e", "price": 1, "quantity": 1}
            }
        }));
        assert_eq!(cart.len(), 1);
        assert!(cart.get(&id("e")).is_some());
    }

    #[test]
    fn test_bad_price_becomes_zero() {
        let cart = sanitize_envelope(&json!({
            "items": {
                "a": {"id": "a", "price": -10, "quantity": 1},
                "b": {"id": "b", "price": "free", "quantity": 1}
            }
        }));
        assert_eq!(cart.total_price(), Decimal::ZERO);
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn test_oversized_values_are_capped() {
        let cart = sanitize_envelope(&json!({
            "items": {
                "a": {"id": "a", "price": 1e28, "quantity": 100},
                "b": {"id": "b", "price": "79228162514264337593543950335", "quantity": 1e12}
            }
        }));
        let a = cart.get(&id("a")).unwrap();
        assert_eq!(a.price, MAX_UNIT_PRICE);
        assert_eq!(a.quantity, 100);
        assert_eq!(cart.get(&id("b")).unwrap().quantity, MAX_QUANTITY);

        let expected = MAX_UNIT_PRICE * Decimal::from(100 + MAX_QUANTITY);
        assert_eq!(cart.total_price(), expected);
    }

    #[test]
    fn test_rekeys_by_id_and_falls_back_to_key() {
        let cart = sanitize_envelope(&json!({
            "items": {
                "wrong-key": {"id": 17, "price": 1, "quantity": 1},
                "k2": {"id": "", "price": 1, "quantity": 1}
            }
        }));
        assert!(cart.get(&id("17")).is_some());
        assert!(cart.get(&id("k2")).is_some());
        assert!(cart.get(&id("wrong-key")).is_none());
    }

    #[test]
    fn test_v1_upgrade_renames_fields() {
        let v1 = json!({
            "items": {
                "a": {"id": "a", "name": "X", "price": 100, "qty": 3, "image": "/a.png"}
            }
        });
        let cart = sanitize_envelope(&SchemaVersion::V1.upgrade(v1));
        let line = cart.get(&id("a")).unwrap();
        assert_eq!(line.quantity, 3);
        assert_eq!(line.image_ref.as_deref(), Some("/a.png"));
    }

    #[test]
    fn test_encode_writes_current_field_names() {
        let mut cart = Cart::new();
        cart.add_item(
            crate::NewItem::new(id("a"), "X".into(), Decimal::from(100)).with_image("/a.png"),
        );
        let raw = encode_envelope(&cart).unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["items"]["a"]["quantity"], json!(1));
        assert_eq!(doc["items"]["a"]["imageRef"], json!("/a.png"));
        assert!(doc["items"]["a"].get("sku").is_none());

        // What we write is what we read back.
        assert_eq!(decode_envelope(&raw).unwrap(), cart);
    }
}
