//! Shopcart Core - Shared cart types library.
//!
//! This crate provides the types used across all Shopcart components:
//! - `storefront` - Cart store, badge sync, page renderer and checkout
//! - `cli` - Command-line driver for a file-backed cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for item and order IDs, currency and prices
//! - [`cart`] - The cart model and its merge semantics
//! - [`schema`] - Persisted envelope format, legacy upgrades and sanitizing
//! - [`order`] - Checkout snapshots and order payloads

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod schema;
pub mod types;

pub use cart::{Cart, CartItem, MAX_QUANTITY, MAX_UNIT_PRICE, NewItem, QuantityChange};
pub use order::{CheckoutSnapshot, OrderLine, OrderPayload};
pub use schema::{SchemaVersion, decode_envelope, encode_envelope, sanitize_envelope};
pub use types::*;
