//! Messaging deep links.
//!
//! Three kinds of link hand a customer over to the messaging app:
//!
//! - **Order link**: `https://<host>/<manager>?start=<order-id>` after the
//!   backend accepted an order.
//! - **Direct link**: `https://<host>/<bot>?start=<token>` where the token is
//!   the cart encoded as compact JSON in unpadded URL-safe base64. Used when no
//!   backend is configured. Tokens over [`START_PARAM_LIMIT`] characters use
//!   the `tg://resolve` form, which does not enforce the limit.
//! - **Quick order link**: `https://<host>/<manager>?text=<message>` asking
//!   about a single product.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rust_decimal::Decimal;
use serde_json::Value;
use shopcart_core::{CartItem, CurrencyCode, NewItem, OrderId, format_price, round_to_units};
use thiserror::Error;
use url::Url;

/// Longest `start` parameter accepted by `https://` links.
pub const START_PARAM_LIMIT: usize = 64;

const MAX_ID_CHARS: usize = 10;
const MAX_NAME_CHARS: usize = 30;
const MAX_SKU_CHARS: usize = 15;

/// Errors building or reading deep links.
#[derive(Debug, Error)]
pub enum DeepLinkError {
    #[error("invalid link: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("start payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("start payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("start payload contains no items")]
    EmptyPayload,
}

/// One item recovered from a direct link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectLine {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub price: i64,
    pub qty: u32,
}

/// Encode items into a `start` token.
///
/// Each item becomes `[id, name, sku, price, qty]` with the strings cut to
/// 10, 30 and 15 characters and the price rounded to whole units.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_start_payload<'a>(
    items: impl IntoIterator<Item = &'a CartItem>,
) -> Result<String, DeepLinkError> {
    let compact: Vec<(String, String, String, i64, u32)> = items
        .into_iter()
        .map(|item| {
            (
                truncate(item.id.as_str(), MAX_ID_CHARS),
                truncate(&item.name, MAX_NAME_CHARS),
                truncate(item.sku.as_deref().unwrap_or_default(), MAX_SKU_CHARS),
                round_to_units(item.price),
                item.quantity,
            )
        })
        .collect();

    let json = serde_json::to_string(&compact)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a `start` token produced by [`encode_start_payload`].
///
/// Padding is optional. Entries with fewer than five fields are skipped;
/// a missing price reads as 0 and a missing quantity as 1.
///
/// # Errors
///
/// Returns an error if the token is not base64 JSON, or holds no items.
pub fn decode_start_payload(token: &str) -> Result<Vec<DirectLine>, DeepLinkError> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim().trim_end_matches('='))?;
    let doc: Value = serde_json::from_slice(&bytes)?;

    let lines: Vec<DirectLine> = doc
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .filter_map(|fields| match fields.as_slice() {
            [id, name, sku, price, qty, ..] => Some(DirectLine {
                id: value_to_string(id),
                name: value_to_string(name),
                sku: value_to_string(sku),
                price: value_to_price(price),
                qty: qty
                    .as_u64()
                    .and_then(|q| u32::try_from(q).ok())
                    .filter(|&q| q > 0)
                    .unwrap_or(1),
            }),
            _ => None,
        })
        .collect();

    if lines.is_empty() {
        return Err(DeepLinkError::EmptyPayload);
    }
    Ok(lines)
}

/// Whole-unit price from an integer or a float, rounded; anything else is 0.
fn value_to_price(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .and_then(|f| Decimal::try_from(f).ok())
                .map(round_to_units)
        })
        .unwrap_or(0)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Builds links into the messaging app.
#[derive(Debug, Clone)]
pub struct DeepLinks {
    host: String,
    manager_handle: String,
    bot_handle: String,
    currency: CurrencyCode,
}

impl DeepLinks {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        manager_handle: impl Into<String>,
        bot_handle: impl Into<String>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            host: host.into(),
            manager_handle: manager_handle.into(),
            bot_handle: bot_handle.into(),
            currency,
        }
    }

    /// Link that opens a chat with the manager about an accepted order.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or handle do not form a valid URL.
    pub fn order_link(&self, order_id: &OrderId) -> Result<String, DeepLinkError> {
        self.https(
            &self.manager_handle,
            &format!("start={}", urlencoding::encode(order_id.as_str())),
        )
    }

    /// Link that carries the whole cart to the order bot.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the link is not a valid URL.
    pub fn direct_link<'a>(
        &self,
        items: impl IntoIterator<Item = &'a CartItem>,
    ) -> Result<String, DeepLinkError> {
        let token = encode_start_payload(items)?;
        if token.len() <= START_PARAM_LIMIT {
            return self.https(&self.bot_handle, &format!("start={token}"));
        }

        tracing::debug!(
            length = token.len(),
            "Start token exceeds https limit, using tg:// link"
        );
        let link = format!("tg://resolve?domain={}&start={token}", self.bot_handle);
        Url::parse(&link)?;
        Ok(link)
    }

    /// Link that asks the manager about a single product.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or handle do not form a valid URL.
    pub fn quick_order_link(&self, item: &NewItem) -> Result<String, DeepLinkError> {
        let message = quick_order_message(item, self.currency);
        self.https(
            &self.manager_handle,
            &format!("text={}", urlencoding::encode(&message)),
        )
    }

    fn https(&self, handle: &str, query: &str) -> Result<String, DeepLinkError> {
        let link = format!("https://{}/{handle}?{query}", self.host);
        Url::parse(&link)?;
        Ok(link)
    }
}

/// The prefilled message of a quick order link.
#[must_use]
pub fn quick_order_message(item: &NewItem, currency: CurrencyCode) -> String {
    let name = item.name.trim();
    let name = if name.is_empty() {
        crate::render::FALLBACK_ITEM_LABEL
    } else {
        name
    };

    let price = if item.price > Decimal::ZERO {
        format_price(item.price, currency)
    } else {
        "price on request".to_owned()
    };

    let mut lines = vec!["Product inquiry:".to_owned(), format!("Name: {name}")];
    if let Some(sku) = item.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        lines.push(format!("SKU: {sku}"));
    }
    lines.push(format!("Price: {price}"));
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shopcart_core::{Cart, ItemId};

    use super::*;

    fn links() -> DeepLinks {
        DeepLinks::new("t.me", "shop_manager", "shop_bot", CurrencyCode::UAH)
    }

    fn antenna() -> NewItem {
        NewItem::new(ItemId::parse("1").unwrap(), "Antenna X1".into(), Decimal::from(5000))
            .with_sku("ANT-001")
    }

    #[test]
    fn test_order_link() {
        let id = OrderId::parse("A-1042").unwrap();
        assert_eq!(
            links().order_link(&id).unwrap(),
            "https://t.me/shop_manager?start=A-1042"
        );
    }

    #[test]
    fn test_short_cart_uses_https() {
        let mut cart = Cart::new();
        cart.add_item(antenna());

        let link = links().direct_link(cart.items()).unwrap();
        let token = link.strip_prefix("https://t.me/shop_bot?start=").unwrap();
        assert!(token.len() <= START_PARAM_LIMIT);
        assert!(!token.contains('='));

        let lines = decode_start_payload(token).unwrap();
        assert_eq!(
            lines,
            vec![DirectLine {
                id: "1".into(),
                name: "Antenna X1".into(),
                sku: "ANT-001".into(),
                price: 5000,
                qty: 1,
            }]
        );
    }

    #[test]
    fn test_long_cart_falls_back_to_tg_scheme() {
        let mut cart = Cart::new();
        cart.add_item(
            NewItem::new(
                ItemId::parse("directional-antenna-kit").unwrap(),
                "Antenna Directional With A Very Long Marketing Name".into(),
                Decimal::new(499_950, 2),
            )
            .with_sku("ANT-DIR-01-EXTENDED")
            .with_quantity(2),
        );
        cart.add_item(
            NewItem::new(ItemId::parse("2").unwrap(), "RF Module Pro".into(), Decimal::from(12_000))
                .with_sku("RF-MOD-02"),
        );

        let link = links().direct_link(cart.items()).unwrap();
        let token = link
            .strip_prefix("tg://resolve?domain=shop_bot&start=")
            .unwrap();
        assert!(token.len() > START_PARAM_LIMIT);

        let lines = decode_start_payload(token).unwrap();
        assert_eq!(lines.len(), 2);
        let kit = &lines[1];
        assert_eq!(kit.id, "directiona");
        assert_eq!(kit.name.chars().count(), 30);
        assert_eq!(kit.sku, "ANT-DIR-01-EXTE");
        assert_eq!(kit.price, 5000);
        assert_eq!(kit.qty, 2);
    }

    #[test]
    fn test_decode_tolerates_padding_and_loose_fields() {
        let json = r#"[[7,"A","",null,null],["short"]]"#;
        let padded = base64::engine::general_purpose::URL_SAFE.encode(json);

        let lines = decode_start_payload(&padded).unwrap();
        assert_eq!(
            lines,
            vec![DirectLine {
                id: "7".into(),
                name: "A".into(),
                sku: String::new(),
                price: 0,
                qty: 1,
            }]
        );
    }

    #[test]
    fn test_decode_rounds_float_prices() {
        let json = r#"[["a","A","",5000.0,1],["b","B","",49.5,2],["c","C","",1e300,1]]"#;
        let lines = decode_start_payload(&URL_SAFE_NO_PAD.encode(json)).unwrap();
        let prices: Vec<i64> = lines.iter().map(|line| line.price).collect();
        assert_eq!(prices, vec![5000, 50, 0]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_start_payload("!!!"),
            Err(DeepLinkError::Base64(_))
        ));
        let empty = URL_SAFE_NO_PAD.encode("[]");
        assert!(matches!(
            decode_start_payload(&empty),
            Err(DeepLinkError::EmptyPayload)
        ));
    }

    #[test]
    fn test_quick_order_message() {
        assert_eq!(
            quick_order_message(&antenna(), CurrencyCode::UAH),
            "Product inquiry:\nName: Antenna X1\nSKU: ANT-001\nPrice: 5 000 UAH"
        );

        let unpriced = NewItem::new(ItemId::parse("9").unwrap(), String::new(), Decimal::ZERO);
        assert_eq!(
            quick_order_message(&unpriced, CurrencyCode::UAH),
            "Product inquiry:\nName: Item\nPrice: price on request"
        );
    }

    #[test]
    fn test_quick_order_link_is_percent_encoded() {
        let link = links().quick_order_link(&antenna()).unwrap();
        assert!(link.starts_with("https://t.me/shop_manager?text=Product%20inquiry%3A%0AName%3A%20"));
        assert!(!link.contains(' '));
    }
}
