//! The cart store: cart operations bound to persistent storage.
//!
//! [`CartStore`] is constructed once per page (or process) with an injected
//! [`KeyValueStore`] and [`Clock`]. Each mutation loads the whole persisted
//! cart, applies the change, saves the whole cart back, and then publishes a
//! [`CartEvent`] to every subscribed [`CartObserver`].
//!
//! # Consistency
//!
//! There is no locking across read-modify-write cycles. Two stores sharing
//! one backend follow last-save-wins; a store's view is only as fresh as its
//! last read.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use shopcart_core::{Cart, CheckoutSnapshot, ItemId, NewItem, QuantityChange};
use tracing::instrument;

use crate::storage::{CartRepository, KeyValueStore, StorageError};

/// Default delay, in minutes, after an order submission before the cart is
/// auto-cleared.
pub const DEFAULT_ORDER_EXPIRY_MINUTES: i64 = 20;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What happened to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// The page loaded; projections should refresh.
    Loaded,
    Added { id: ItemId, quantity: u32 },
    QuantityChanged { id: ItemId, quantity: u32 },
    Removed { id: ItemId },
    Cleared,
    /// The cart was cleared because the last order is older than the expiry.
    Expired,
}

/// Published after every persisted change.
#[derive(Debug)]
pub struct CartEvent<'a> {
    pub cart: &'a Cart,
    pub change: CartChange,
}

/// Subscriber to cart changes (badges, page renderer, analytics).
pub trait CartObserver: Send + Sync {
    fn cart_changed(&self, event: &CartEvent<'_>);
}

/// Row and summary controls on the cart page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAction {
    Increment,
    Decrement,
    Remove,
    Clear,
}

impl CartAction {
    /// Parse an action tag from a control's `data-cart-action` attribute.
    ///
    /// The short `inc`/`dec` tags from older markup are accepted.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "increment" | "inc" => Some(Self::Increment),
            "decrement" | "dec" => Some(Self::Decrement),
            "remove" => Some(Self::Remove),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::Remove => "remove",
            Self::Clear => "clear",
        }
    }
}

/// Cart operations over persistent storage.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    repo: CartRepository,
    clock: Arc<dyn Clock>,
    order_expiry: TimeDelta,
    observers: RwLock<Vec<Arc<dyn CartObserver>>>,
}

impl CartStore {
    /// Create a store over `storage` using the system clock.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(
            storage,
            Arc::new(SystemClock),
            TimeDelta::minutes(DEFAULT_ORDER_EXPIRY_MINUTES),
        )
    }

    /// Create a store with an explicit clock and order expiry.
    #[must_use]
    pub fn with_clock(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        order_expiry: TimeDelta,
    ) -> Self {
        Self {
            inner: Arc::new(CartStoreInner {
                repo: CartRepository::new(storage),
                clock,
                order_expiry,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self, observer: Arc<dyn CartObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Read the current persisted cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn cart(&self) -> Result<Cart, StorageError> {
        self.inner.repo.load()
    }

    /// Add an item, merging with an existing line of the same id.
    ///
    /// Returns the line's quantity after the add.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if loading or saving fails.
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn add_item(&self, item: NewItem) -> Result<u32, StorageError> {
        let id = item.id.clone();
        let mut cart = self.cart()?;
        let quantity = cart.add_item(item);
        self.commit(&cart, CartChange::Added { id, quantity })?;
        Ok(quantity)
    }

    /// Change a line's quantity by `delta`; the line is removed at zero.
    ///
    /// Does nothing if the id is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if loading or saving fails.
    #[instrument(skip(self, id), fields(id = %id))]
    pub fn update_quantity(&self, id: &ItemId, delta: i64) -> Result<QuantityChange, StorageError> {
        let mut cart = self.cart()?;
        let outcome = cart.update_quantity(id, delta);
        let change = match outcome {
            QuantityChange::Missing => return Ok(outcome),
            QuantityChange::Updated(quantity) => CartChange::QuantityChanged {
                id: id.clone(),
                quantity,
            },
            QuantityChange::Removed => CartChange::Removed { id: id.clone() },
        };
        self.commit(&cart, change)?;
        Ok(outcome)
    }

    /// Remove a line. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if loading or saving fails.
    #[instrument(skip(self, id), fields(id = %id))]
    pub fn remove_item(&self, id: &ItemId) -> Result<bool, StorageError> {
        let mut cart = self.cart()?;
        if cart.remove_item(id).is_none() {
            return Ok(false);
        }
        self.commit(&cart, CartChange::Removed { id: id.clone() })?;
        Ok(true)
    }

    /// Replace the cart with an empty one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if saving fails.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<(), StorageError> {
        self.commit(&Cart::new(), CartChange::Cleared)
    }

    /// Sum of all line quantities in the persisted cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if loading fails.
    pub fn total_quantity(&self) -> Result<u64, StorageError> {
        Ok(self.cart()?.total_quantity())
    }

    /// Sum of `price × quantity` in the persisted cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if loading fails.
    pub fn total_price(&self) -> Result<Decimal, StorageError> {
        Ok(self.cart()?.total_price())
    }

    /// Take an immutable snapshot for checkout.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if loading fails.
    pub fn snapshot(&self) -> Result<CheckoutSnapshot, StorageError> {
        Ok(CheckoutSnapshot::from_cart(&self.cart()?, self.now()))
    }

    /// Handle a click on a cart page control.
    ///
    /// Returns `false` for unknown actions, missing ids, or ids that are not
    /// valid; those clicks are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the underlying operation fails.
    pub fn dispatch(&self, action: &str, id: Option<&str>) -> Result<bool, StorageError> {
        let Some(action) = CartAction::parse(action) else {
            tracing::debug!(action, "Ignoring unknown cart action");
            return Ok(false);
        };

        if action == CartAction::Clear {
            self.clear()?;
            return Ok(true);
        }

        let Some(id) = id.and_then(|raw| ItemId::parse(raw).ok()) else {
            tracing::debug!(action = action.as_str(), "Ignoring cart action without an id");
            return Ok(false);
        };

        match action {
            CartAction::Increment => self.update_quantity(&id, 1).map(|_| true),
            CartAction::Decrement => self.update_quantity(&id, -1).map(|_| true),
            CartAction::Remove => self.remove_item(&id),
            CartAction::Clear => Ok(true),
        }
    }

    /// Page-load hook: expire a stale cart, then refresh every projection.
    ///
    /// Returns whether the cart was expired.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    #[instrument(skip(self))]
    pub fn on_page_load(&self) -> Result<bool, StorageError> {
        let expired = self.expire_stale_order()?;
        if !expired {
            let cart = self.cart()?;
            self.publish(&cart, CartChange::Loaded);
        }
        Ok(expired)
    }

    /// Clear the cart if the last order was submitted longer ago than the
    /// expiry. Returns whether the cart was cleared.
    ///
    /// This only runs when called; a cart is not cleared while nobody loads it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn expire_stale_order(&self) -> Result<bool, StorageError> {
        let Some(stamped_at) = self.inner.repo.order_timestamp()? else {
            return Ok(false);
        };

        let elapsed = self.now() - stamped_at;
        if elapsed <= self.inner.order_expiry {
            return Ok(false);
        }

        tracing::info!(
            elapsed_minutes = elapsed.num_minutes(),
            "Last order is stale, clearing cart"
        );
        // Keep the timestamp until the empty cart is saved.
        self.commit(&Cart::new(), CartChange::Expired)?;
        self.inner.repo.clear_order_timestamp()?;
        Ok(true)
    }

    /// Record a successful order submission at the current time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn stamp_order(&self) -> Result<DateTime<Utc>, StorageError> {
        let now = self.now();
        self.inner.repo.stamp_order(now)?;
        Ok(now)
    }

    /// Read the last order submission time, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    pub fn order_timestamp(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.inner.repo.order_timestamp()
    }

    fn commit(&self, cart: &Cart, change: CartChange) -> Result<(), StorageError> {
        self.inner.repo.save(cart)?;
        self.publish(cart, change);
        Ok(())
    }

    fn publish(&self, cart: &Cart, change: CartChange) {
        // Observers run outside the lock so they may subscribe or read freely.
        let observers = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let event = CartEvent { cart, change };
        for observer in &observers {
            observer.cart_changed(&event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::storage::{MemoryStore, keys};

    /// Memory store whose next cart write fails once armed.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_cart_write: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == keys::CART && self.fail_cart_write.swap(false, Ordering::SeqCst) {
                return Err(std::io::Error::other("quota exceeded").into());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(CartChange, u64)>>,
    }

    impl CartObserver for Recorder {
        fn cart_changed(&self, event: &CartEvent<'_>) {
            self.events
                .lock()
                .unwrap()
                .push((event.change.clone(), event.cart.total_quantity()));
        }
    }

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<FixedClock>, CartStore) {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(base_time()));
        let store = CartStore::with_clock(
            storage.clone(),
            clock.clone(),
            TimeDelta::minutes(DEFAULT_ORDER_EXPIRY_MINUTES),
        );
        (storage, clock, store)
    }

    fn sku1(quantity: u32) -> NewItem {
        NewItem::new(id("sku-1"), "X".into(), Decimal::from(100)).with_quantity(quantity)
    }

    #[test]
    fn test_add_scenario_totals() {
        let (_, _, store) = setup();
        store.add_item(sku1(1)).unwrap();
        assert_eq!(store.total_quantity().unwrap(), 1);
        assert_eq!(store.total_price().unwrap(), Decimal::from(100));

        store.add_item(sku1(2)).unwrap();
        assert_eq!(store.total_quantity().unwrap(), 3);
        assert_eq!(store.total_price().unwrap(), Decimal::from(300));
        assert_eq!(store.cart().unwrap().len(), 1);
    }

    #[test]
    fn test_update_to_zero_removes() {
        let (_, _, store) = setup();
        store.add_item(sku1(3)).unwrap();
        assert_eq!(
            store.update_quantity(&id("sku-1"), -3).unwrap(),
            QuantityChange::Removed
        );
        assert_eq!(store.total_quantity().unwrap(), 0);
    }

    #[test]
    fn test_mutations_are_persisted_across_store_instances() {
        let (storage, _, store) = setup();
        store.add_item(sku1(2)).unwrap();

        let other = CartStore::new(storage);
        assert_eq!(other.total_quantity().unwrap(), 2);
    }

    #[test]
    fn test_observers_see_every_change() {
        let (_, _, store) = setup();
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        store.add_item(sku1(2)).unwrap();
        store.update_quantity(&id("sku-1"), 1).unwrap();
        store.update_quantity(&id("missing"), 1).unwrap();
        store.remove_item(&id("missing")).unwrap();
        store.remove_item(&id("sku-1")).unwrap();
        store.clear().unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (
                    CartChange::Added {
                        id: id("sku-1"),
                        quantity: 2
                    },
                    2
                ),
                (
                    CartChange::QuantityChanged {
                        id: id("sku-1"),
                        quantity: 3
                    },
                    3
                ),
                (CartChange::Removed { id: id("sku-1") }, 0),
                (CartChange::Cleared, 0),
            ]
        );
    }

    #[test]
    fn test_dispatch_actions() {
        let (_, _, store) = setup();
        store.add_item(sku1(1)).unwrap();

        assert!(store.dispatch("increment", Some("sku-1")).unwrap());
        assert!(store.dispatch("inc", Some("sku-1")).unwrap());
        assert_eq!(store.total_quantity().unwrap(), 3);

        assert!(store.dispatch("decrement", Some("sku-1")).unwrap());
        assert_eq!(store.total_quantity().unwrap(), 2);

        assert!(!store.dispatch("explode", Some("sku-1")).unwrap());
        assert!(!store.dispatch("remove", None).unwrap());
        assert!(!store.dispatch("remove", Some("  ")).unwrap());

        assert!(store.dispatch("remove", Some("sku-1")).unwrap());
        assert!(store.cart().unwrap().is_empty());

        store.add_item(sku1(1)).unwrap();
        assert!(store.dispatch("clear", None).unwrap());
        assert!(store.cart().unwrap().is_empty());
    }

    #[test]
    fn test_stale_order_clears_cart() {
        let (storage, clock, store) = setup();
        store.add_item(sku1(2)).unwrap();
        store.stamp_order().unwrap();

        clock.advance(TimeDelta::minutes(21));
        assert!(store.on_page_load().unwrap());
        assert!(store.cart().unwrap().is_empty());
        assert!(storage.get(keys::ORDER_TIMESTAMP).unwrap().is_none());
    }

    #[test]
    fn test_recent_order_keeps_cart() {
        let (storage, clock, store) = setup();
        store.add_item(sku1(2)).unwrap();
        store.stamp_order().unwrap();

        clock.advance(TimeDelta::minutes(5));
        assert!(!store.on_page_load().unwrap());
        assert_eq!(store.total_quantity().unwrap(), 2);
        assert!(storage.get(keys::ORDER_TIMESTAMP).unwrap().is_some());
    }

    #[test]
    fn test_page_load_publishes_loaded() {
        let (_, _, store) = setup();
        store.add_item(sku1(4)).unwrap();
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        store.on_page_load().unwrap();
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec![(CartChange::Loaded, 4)]);
    }

    #[test]
    fn test_failed_expiry_save_is_retried_on_next_load() {
        let storage = Arc::new(FlakyStore::default());
        let clock = Arc::new(FixedClock::new(base_time()));
        let store = CartStore::with_clock(
            storage.clone(),
            clock.clone(),
            TimeDelta::minutes(DEFAULT_ORDER_EXPIRY_MINUTES),
        );
        store.add_item(sku1(1)).unwrap();
        store.stamp_order().unwrap();
        clock.advance(TimeDelta::minutes(21));

        storage.fail_cart_write.store(true, Ordering::SeqCst);
        assert!(store.on_page_load().is_err());
        assert!(storage.get(keys::ORDER_TIMESTAMP).unwrap().is_some());
        assert_eq!(store.total_quantity().unwrap(), 1);

        assert!(store.on_page_load().unwrap());
        assert!(store.cart().unwrap().is_empty());
        assert!(storage.get(keys::ORDER_TIMESTAMP).unwrap().is_none());
    }
}
