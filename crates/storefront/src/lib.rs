//! Shopcart storefront library.
//!
//! Device-local cart engine for a storefront page: persistent cart storage,
//! cart count badges, the cart page, and checkout either through the order
//! API or a direct messaging deep link.
//!
//! # Wiring
//!
//! ```rust,ignore
//! let storage = Arc::new(FileStore::new(&config.storage_path));
//! let store = CartStore::with_clock(storage, Arc::new(SystemClock), config.checkout.order_expiry);
//! store.subscribe(badges.clone());
//! store.subscribe(Arc::new(PageRenderer::new(container, currency, catalog_url)));
//! store.on_page_load()?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod badge;
pub mod checkout;
pub mod config;
pub mod deep_link;
pub mod error;
pub mod gateway;
pub mod render;
pub mod storage;
pub mod store;

pub use badge::{BadgeElement, BadgeState, BadgeSync, render_badge};
pub use checkout::{
    CheckoutCoordinator, CheckoutError, CheckoutOutcome, CheckoutPhase, direct_checkout_link,
    security_token,
};
pub use config::StorefrontConfig;
pub use deep_link::{DeepLinks, decode_start_payload};
pub use error::CartError;
pub use gateway::{HttpOrderGateway, OrderGateway};
pub use render::{CartPageView, PageRenderer, PageSink, render_page};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{CartAction, CartChange, CartEvent, CartObserver, CartStore, Clock, SystemClock};
