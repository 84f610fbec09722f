//! Cart page rendering.
//!
//! [`CartPageView`] is a pure projection of a [`Cart`] into display strings;
//! [`render_page`] turns it into HTML. [`PageRenderer`] re-renders on every
//! cart change and hands the markup to the page's container.

use std::sync::Arc;

use askama::Template;
use shopcart_core::{Cart, CartItem, CurrencyCode, format_price};

use crate::store::{CartEvent, CartObserver};

/// Label shown for items stored without a name.
pub const FALLBACK_ITEM_LABEL: &str = "Item";

/// One cart row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRowView {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub image_ref: Option<String>,
    pub unit_price: String,
    pub quantity: u32,
    pub line_total: String,
}

impl CartRowView {
    fn from_item(item: &CartItem, currency: CurrencyCode) -> Self {
        let name = if item.name.trim().is_empty() {
            FALLBACK_ITEM_LABEL.to_owned()
        } else {
            item.name.clone()
        };

        Self {
            id: item.id.to_string(),
            name,
            sku: item.sku.clone(),
            image_ref: item.image_ref.clone(),
            unit_price: format_price(item.price, currency),
            quantity: item.quantity,
            line_total: format_price(item.line_total(), currency),
        }
    }
}

/// The whole cart page.
#[derive(Debug, Clone, Template)]
#[template(path = "cart/page.html")]
pub struct CartPageView {
    pub rows: Vec<CartRowView>,
    pub total: String,
    pub item_count: u64,
    pub catalog_url: String,
    pub checkout_enabled: bool,
    pub clear_enabled: bool,
}

impl CartPageView {
    #[must_use]
    pub fn from_cart(cart: &Cart, currency: CurrencyCode, catalog_url: &str) -> Self {
        let has_items = !cart.is_empty();
        Self {
            rows: cart
                .items()
                .map(|item| CartRowView::from_item(item, currency))
                .collect(),
            total: format_price(cart.total_price(), currency),
            item_count: cart.total_quantity(),
            catalog_url: catalog_url.to_owned(),
            checkout_enabled: has_items,
            clear_enabled: has_items,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Render the cart page to HTML.
///
/// # Errors
///
/// Returns an error if template rendering fails.
pub fn render_page(view: &CartPageView) -> askama::Result<String> {
    view.render()
}

/// The container a rendered page is written into.
pub trait PageSink: Send + Sync {
    fn replace(&self, html: &str);
}

/// Re-renders the cart page into a [`PageSink`] on every change.
pub struct PageRenderer {
    sink: Arc<dyn PageSink>,
    currency: CurrencyCode,
    catalog_url: String,
}

impl PageRenderer {
    #[must_use]
    pub fn new(sink: Arc<dyn PageSink>, currency: CurrencyCode, catalog_url: impl Into<String>) -> Self {
        Self {
            sink,
            currency,
            catalog_url: catalog_url.into(),
        }
    }

    /// Render `cart` into the sink.
    ///
    /// A render failure leaves the previous markup in place.
    pub fn render(&self, cart: &Cart) {
        let view = CartPageView::from_cart(cart, self.currency, &self.catalog_url);
        match render_page(&view) {
            Ok(html) => self.sink.replace(&html),
            Err(e) => tracing::error!(error = %e, "Failed to render cart page"),
        }
    }
}

impl CartObserver for PageRenderer {
    fn cart_changed(&self, event: &CartEvent<'_>) {
        self.render(event.cart);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use rust_decimal::Decimal;
    use shopcart_core::{ItemId, MAX_UNIT_PRICE, NewItem};

    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore, keys};
    use crate::store::CartStore;

    fn sample_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add_item(
            NewItem::new(ItemId::parse("hoodie").unwrap(), "Hoodie".into(), Decimal::from(6000))
                .with_sku("HD-01")
                .with_quantity(2),
        );
        cart.add_item(
            NewItem::new(ItemId::parse("mystery").unwrap(), "   ".into(), Decimal::from(1500))
                .with_image("/media/mystery.jpg"),
        );
        cart
    }

    #[test]
    fn test_empty_cart_view() {
        let view = CartPageView::from_cart(&Cart::new(), CurrencyCode::UAH, "/catalog/");
        assert!(view.is_empty());
        assert!(!view.checkout_enabled);
        assert!(!view.clear_enabled);
        assert_eq!(view.total, "0 UAH");

        let html = render_page(&view).unwrap();
        assert!(html.contains("href=\"/catalog/\""));
        assert!(!html.contains("data-cart-action=\"remove\""));
    }

    #[test]
    fn test_rows_and_totals() {
        let view = CartPageView::from_cart(&sample_cart(), CurrencyCode::UAH, "/catalog/");
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.total, "13 500 UAH");
        assert_eq!(view.item_count, 3);
        assert!(view.checkout_enabled);

        let hoodie = &view.rows[0];
        assert_eq!(hoodie.unit_price, "6 000 UAH");
        assert_eq!(hoodie.line_total, "12 000 UAH");
        assert_eq!(hoodie.sku.as_deref(), Some("HD-01"));

        assert_eq!(view.rows[1].name, FALLBACK_ITEM_LABEL);
    }

    #[test]
    fn test_rendered_controls() {
        let view = CartPageView::from_cart(&sample_cart(), CurrencyCode::UAH, "/catalog/");
        let html = render_page(&view).unwrap();

        assert!(html.contains("data-cart-id=\"hoodie\""));
        assert!(html.contains("data-cart-action=\"increment\""));
        assert!(html.contains("data-cart-action=\"decrement\""));
        assert!(html.contains("data-cart-action=\"remove\""));
        assert!(html.contains("data-cart-action=\"clear\""));
        assert!(html.contains("SKU: HD-01"));
        assert!(html.contains("/media/mystery.jpg"));
        assert!(html.contains("cart-row__placeholder"));
        assert!(html.contains("12 000 UAH"));
    }

    #[derive(Default)]
    struct Container(Mutex<String>);

    impl PageSink for Container {
        fn replace(&self, html: &str) {
            *self.0.lock().unwrap() = html.to_owned();
        }
    }

    #[test]
    fn test_page_renderer_writes_to_sink() {
        let container = Arc::new(Container::default());
        let renderer = PageRenderer::new(container.clone(), CurrencyCode::UAH, "/catalog/");

        renderer.render(&sample_cart());
        assert!(container.0.lock().unwrap().contains("Hoodie"));

        renderer.render(&Cart::new());
        assert!(!container.0.lock().unwrap().contains("Hoodie"));
    }

    #[test]
    fn test_oversized_stored_prices_still_render() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set(
                keys::CART,
                r#"{"items":{"a":{"id":"a","name":"A","price":1e28,"quantity":100}}}"#,
            )
            .unwrap();
        let store = CartStore::new(storage);
        let container = Arc::new(Container::default());
        store.subscribe(Arc::new(PageRenderer::new(
            container.clone(),
            CurrencyCode::UAH,
            "/catalog/",
        )));

        store.on_page_load().unwrap();
        assert_eq!(store.total_price().unwrap(), MAX_UNIT_PRICE * Decimal::from(100));
        assert!(container.0.lock().unwrap().contains("100 000 000 000 000 UAH"));
    }
}
