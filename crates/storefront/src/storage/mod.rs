//! Persistent key-value storage for the cart.
//!
//! # Keys
//!
//! - `shopcart_cart` - Canonical cart envelope (current schema)
//! - `shopcart_cart_v1` - Deprecated cart envelope, migrated on first read
//! - `shopcart_order_ts` - Epoch milliseconds of the last submitted order
//!
//! # Backends
//!
//! - [`MemoryStore`] - Process-local map, used by tests and embedders
//! - [`FileStore`] - One JSON file, replaced atomically on every write
//!
//! Every write replaces a whole value. A failed write leaves the previous
//! value in place.

mod file;
mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use shopcart_core::{Cart, SchemaVersion, encode_envelope, sanitize_envelope};
use thiserror::Error;
use tracing::instrument;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage keys.
pub mod keys {
    /// Canonical key for the cart envelope.
    pub const CART: &str = "shopcart_cart";

    /// Deprecated key written by the first schema version.
    pub const CART_V1: &str = "shopcart_cart_v1";

    /// Key for the last order submission time (epoch milliseconds).
    pub const ORDER_TIMESTAMP: &str = "shopcart_order_ts";
}

/// A deprecated storage key and the schema its data was written in.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub key: &'static str,
    pub version: SchemaVersion,
}

/// Deprecated keys in priority order. The first one found wins.
pub const MIGRATIONS: &[Migration] = &[Migration {
    key: keys::CART_V1,
    version: SchemaVersion::V1,
}];

/// Errors from the storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a value for storage failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A string-to-string store with whole-value writes.
///
/// Mirrors the browser `localStorage` contract.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and writes the cart envelope and order timestamp.
#[derive(Clone)]
pub struct CartRepository {
    store: Arc<dyn KeyValueStore>,
}

impl CartRepository {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the cart.
    ///
    /// Falls back to deprecated keys when the canonical key is absent,
    /// migrating the first one found. Corrupt data yields an empty cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only if the backend itself fails.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<Cart, StorageError> {
        if let Some(raw) = self.store.get(keys::CART)? {
            return Ok(parse_or_empty(&raw, SchemaVersion::CURRENT, keys::CART));
        }

        for migration in MIGRATIONS {
            let Some(raw) = self.store.get(migration.key)? else {
                continue;
            };

            let cart = parse_or_empty(&raw, migration.version, migration.key);
            self.store.set(keys::CART, &encode_envelope(&cart)?)?;
            self.store.remove(migration.key)?;
            tracing::info!(
                from = migration.key,
                to = keys::CART,
                items = cart.len(),
                "Migrated cart storage key"
            );
            return Ok(cart);
        }

        Ok(Cart::new())
    }

    /// Persist the whole cart under the canonical key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or writing fails.
    #[instrument(skip(self, cart), fields(items = cart.len()))]
    pub fn save(&self, cart: &Cart) -> Result<(), StorageError> {
        self.store.set(keys::CART, &encode_envelope(cart)?)?;
        tracing::debug!("Saved cart");
        Ok(())
    }

    /// Read the last order submission time.
    ///
    /// An unparsable value is deleted and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn order_timestamp(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let Some(raw) = self.store.get(keys::ORDER_TIMESTAMP)? else {
            return Ok(None);
        };

        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);

        if parsed.is_none() {
            tracing::warn!(value = %raw, "Discarding unparsable order timestamp");
            self.store.remove(keys::ORDER_TIMESTAMP)?;
        }
        Ok(parsed)
    }

    /// Record an order submission time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn stamp_order(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.store
            .set(keys::ORDER_TIMESTAMP, &at.timestamp_millis().to_string())
    }

    /// Forget the order submission time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn clear_order_timestamp(&self) -> Result<(), StorageError> {
        self.store.remove(keys::ORDER_TIMESTAMP)
    }
}

/// Parse a stored envelope written in `version`, treating corruption as empty.
fn parse_or_empty(raw: &str, version: SchemaVersion, key: &str) -> Cart {
    match serde_json::from_str::<Value>(raw) {
        Ok(doc) => sanitize_envelope(&version.upgrade(doc)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Corrupt cart data, starting with an empty cart");
            Cart::new()
        }
    }
}
