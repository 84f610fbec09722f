//! Shopcart CLI - Drive a device-local cart from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Add two hoodies
//! shopcart add hoodie --name "Hoodie" --price 6000 --sku HD-01 --qty 2
//!
//! # Adjust and inspect
//! shopcart inc hoodie
//! shopcart show
//! shopcart show --html
//!
//! # Preview the order, then submit it
//! shopcart checkout
//! shopcart checkout --yes
//!
//! # Hand the cart to the order bot without a backend
//! shopcart checkout --direct
//! ```
//!
//! # Commands
//!
//! - `add`, `inc`, `dec`, `remove`, `clear` - Edit the cart
//! - `show`, `badge` - Print the cart page or count badge
//! - `checkout` - Submit the cart as an order
//! - `quick-order` - Print an "ask about this product" link
//! - `decode` - Read the items out of a direct checkout token

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use shopcart_storefront::StorefrontConfig;
use shopcart_storefront::error::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "shopcart")]
#[command(author, version, about = "Shopcart command-line cart")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an item to the cart
    Add {
        /// Item id
        id: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Unit price
        #[arg(short, long)]
        price: Decimal,

        /// Stock keeping unit
        #[arg(short, long)]
        sku: Option<String>,

        /// Quantity to add
        #[arg(short, long)]
        qty: Option<u32>,

        /// Image URL or path
        #[arg(long)]
        image: Option<String>,
    },
    /// Increase an item's quantity by one
    Inc { id: String },
    /// Decrease an item's quantity by one (removes it at zero)
    Dec { id: String },
    /// Remove an item
    Remove { id: String },
    /// Empty the cart
    Clear,
    /// Print the cart
    Show {
        /// Print the rendered cart page
        #[arg(long)]
        html: bool,
    },
    /// Print the cart count badge
    Badge {
        /// Print the rendered badge fragment
        #[arg(long)]
        html: bool,
    },
    /// Check out the cart
    Checkout {
        /// Skip the order API and print a direct order bot link
        #[arg(long)]
        direct: bool,

        /// Submit without stopping at the preview
        #[arg(short, long)]
        yes: bool,
    },
    /// Print a link asking the manager about a single product
    QuickOrder {
        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,

        /// Unit price (0 for "price on request")
        #[arg(short, long, default_value = "0")]
        price: Decimal,

        /// Stock keeping unit
        #[arg(short, long)]
        sku: Option<String>,
    },
    /// Decode a direct checkout token
    Decode { token: String },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopcart=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        e.report();
        let _ = writeln!(std::io::stderr(), "error: {}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<()> {
    let ctx = commands::Context::open(config)?;

    match cli.command {
        Commands::Add {
            id,
            name,
            price,
            sku,
            qty,
            image,
        } => commands::cart::add(&ctx, &id, name, price, sku, qty, image)?,
        Commands::Inc { id } => commands::cart::dispatch(&ctx, "increment", &id)?,
        Commands::Dec { id } => commands::cart::dispatch(&ctx, "decrement", &id)?,
        Commands::Remove { id } => commands::cart::dispatch(&ctx, "remove", &id)?,
        Commands::Clear => commands::cart::clear(&ctx)?,
        Commands::Show { html } => commands::cart::show(&ctx, html)?,
        Commands::Badge { html } => commands::cart::badge(&ctx, html)?,
        Commands::Checkout { direct, yes } => commands::checkout::run(&ctx, direct, yes).await?,
        Commands::QuickOrder { name, price, sku } => {
            commands::links::quick_order(&ctx, name, price, sku)?;
        }
        Commands::Decode { token } => commands::links::decode(&token)?,
    }
    Ok(())
}
