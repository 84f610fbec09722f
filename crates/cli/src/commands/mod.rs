//! Command implementations.

pub mod cart;
pub mod checkout;
pub mod links;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use shopcart_storefront::error::Result;
use shopcart_storefront::{
    BadgeElement, BadgeSync, CartStore, FileStore, StorefrontConfig, SystemClock,
};

/// Everything a command needs: configuration and a store bound to the
/// configured storage file.
pub struct Context {
    pub config: StorefrontConfig,
    pub store: CartStore,
    badge: Arc<TerminalBadge>,
}

impl Context {
    /// Open the store and run the page-load hook (order expiry, projections).
    ///
    /// # Errors
    ///
    /// Returns error if the storage file cannot be read.
    pub fn open(config: StorefrontConfig) -> Result<Self> {
        let storage = Arc::new(FileStore::new(&config.storage_path));
        let expiry = config.checkout.order_expiry;
        let store = CartStore::with_clock(storage, Arc::new(SystemClock), expiry);

        let badge = Arc::new(TerminalBadge::default());
        let badges = Arc::new(BadgeSync::new());
        badges.register(badge.clone());
        store.subscribe(badges);

        if store.on_page_load()? {
            tracing::info!("Previous order has expired, cart cleared");
        }

        Ok(Self {
            config,
            store,
            badge,
        })
    }

    /// The badge text after the last cart change.
    pub fn badge_text(&self) -> String {
        self.badge
            .text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Badge that remembers what it was last told to show.
#[derive(Default)]
struct TerminalBadge {
    text: Mutex<String>,
}

impl BadgeElement for TerminalBadge {
    fn set_hidden(&self, hidden: bool) {
        if hidden {
            self.set_text("0");
        }
    }

    fn set_text(&self, text: &str) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_owned();
    }
}

/// Write one line to stdout.
///
/// A closed stdout (e.g. `shopcart show | head -1`) is not an error.
pub fn print_line(line: impl std::fmt::Display) {
    let _ = writeln!(io::stdout().lock(), "{line}");
}
