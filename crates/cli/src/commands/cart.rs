//! Cart editing and display commands.

use rust_decimal::Decimal;
use shopcart_core::{ItemId, NewItem};
use shopcart_storefront::badge::BadgeState;
use shopcart_storefront::error::Result;
use shopcart_storefront::{CartError, CartPageView, render_badge, render_page};

use super::{Context, print_line};

/// Add an item, merging with an existing line of the same id.
///
/// # Errors
///
/// Returns error if the id is blank or storage fails.
pub fn add(
    ctx: &Context,
    id: &str,
    name: String,
    price: Decimal,
    sku: Option<String>,
    qty: Option<u32>,
    image: Option<String>,
) -> Result<()> {
    let id = ItemId::parse(id).map_err(|e| CartError::BadRequest(e.to_string()))?;

    let mut item = NewItem::new(id.clone(), name, price);
    if let Some(sku) = sku {
        item = item.with_sku(sku);
    }
    if let Some(qty) = qty {
        item = item.with_quantity(qty);
    }
    if let Some(image) = image {
        item = item.with_image(image);
    }

    let quantity = ctx.store.add_item(item)?;
    print_line(format_args!("{id}: {quantity} in cart ({} items total)", ctx.badge_text()));
    Ok(())
}

/// Apply a cart page control (`increment`, `decrement`, `remove`) to an item.
///
/// # Errors
///
/// Returns error if the item is not in the cart or storage fails.
pub fn dispatch(ctx: &Context, action: &str, id: &str) -> Result<()> {
    let item_id = ItemId::parse(id).map_err(|e| CartError::BadRequest(e.to_string()))?;
    if ctx.store.cart()?.get(&item_id).is_none() {
        return Err(CartError::BadRequest(format!("'{id}' is not in the cart")));
    }

    ctx.store.dispatch(action, Some(id))?;

    let cart = ctx.store.cart()?;
    match cart.get(&item_id) {
        Some(item) => print_line(format_args!("{id}: {} in cart", item.quantity)),
        None => print_line(format_args!("{id}: removed")),
    }
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns error if storage fails.
pub fn clear(ctx: &Context) -> Result<()> {
    ctx.store.clear()?;
    print_line("Cart cleared");
    Ok(())
}

/// Print the cart as text or as the rendered cart page.
///
/// # Errors
///
/// Returns error if storage or rendering fails.
pub fn show(ctx: &Context, html: bool) -> Result<()> {
    let cart = ctx.store.cart()?;
    let checkout = &ctx.config.checkout;
    let view = CartPageView::from_cart(&cart, checkout.currency, &checkout.catalog_url);

    if html {
        print_line(render_page(&view)?);
        return Ok(());
    }

    if view.is_empty() {
        print_line(format_args!("Your cart is empty. Continue shopping: {}", view.catalog_url));
        return Ok(());
    }

    for row in &view.rows {
        let sku = row.sku.as_deref().map(|s| format!(" [{s}]")).unwrap_or_default();
        print_line(format_args!(
            "{:<12} {}{sku}  {} x {} = {}",
            row.id, row.name, row.quantity, row.unit_price, row.line_total
        ));
    }
    print_line(format_args!("Total: {} ({} items)", view.total, view.item_count));
    Ok(())
}

/// Print the cart count badge.
///
/// # Errors
///
/// Returns error if storage or rendering fails.
pub fn badge(ctx: &Context, html: bool) -> Result<()> {
    if html {
        let state = BadgeState::from_cart(&ctx.store.cart()?);
        print_line(render_badge(state)?);
    } else {
        print_line(ctx.badge_text());
    }
    Ok(())
}
