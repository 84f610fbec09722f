//! Checkout command.
//!
//! With an order API configured, the cart is previewed and (with `--yes`)
//! submitted; the manager link for the new order is printed. Without one, or
//! with `--direct`, a direct order bot link carrying the cart is printed.

use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use shopcart_core::format_price;
use shopcart_storefront::error::Result;
use shopcart_storefront::{CheckoutCoordinator, HttpOrderGateway, direct_checkout_link};

use super::{Context, print_line};

/// Run a checkout.
///
/// # Errors
///
/// Returns error if the cart is empty, the security token is missing, or the
/// order API rejects the order.
pub async fn run(ctx: &Context, direct: bool, yes: bool) -> Result<()> {
    let links = ctx.config.deep_links();

    let Some(api) = ctx.config.api.as_ref().filter(|_| !direct) else {
        let cart = ctx.store.cart()?;
        let link = direct_checkout_link(&links, &cart)?;
        print_line("Open this link to send your order to the order bot:");
        print_line(link);
        return Ok(());
    };

    let gateway = HttpOrderGateway::new(api.base_url.as_str(), &api.token_header, api.timeout)?;
    let coordinator =
        CheckoutCoordinator::new(ctx.store.clone(), gateway, links, ctx.config.checkout.clone());

    let snapshot = coordinator.start_checkout()?;
    let currency = ctx.config.checkout.currency;
    print_line("Order preview:");
    for line in snapshot.order_lines() {
        print_line(format_args!(
            "  {} x {} = {}",
            line.name,
            line.qty,
            format_price(Decimal::from(line.line_total()), currency)
        ));
    }
    print_line(format_args!(
        "  Total: {}",
        format_price(Decimal::from(snapshot.payable_total()), currency)
    ));

    if !yes {
        coordinator.cancel()?;
        print_line("Run again with --yes to submit this order.");
        return Ok(());
    }

    let cookie = ctx.config.cookie.as_ref().map(ExposeSecret::expose_secret);
    let outcome = coordinator.confirm(cookie).await?;

    print_line(format_args!("Order {} submitted.", outcome.order_id));
    print_line(format_args!("Continue with the manager: {}", outcome.redirect));
    print_line(format_args!(
        "The cart will be cleared automatically after {} minutes.",
        ctx.config.checkout.order_expiry.num_minutes()
    ));
    Ok(())
}
