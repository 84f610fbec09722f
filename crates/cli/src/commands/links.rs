//! Deep link commands.

use rust_decimal::Decimal;
use shopcart_core::{ItemId, NewItem};
use shopcart_storefront::error::Result;
use shopcart_storefront::{CartError, decode_start_payload};

use super::{Context, print_line};

/// Print a quick order link for a single product.
///
/// # Errors
///
/// Returns error if the configured host or handle do not form a valid link.
pub fn quick_order(
    ctx: &Context,
    name: String,
    price: Decimal,
    sku: Option<String>,
) -> Result<()> {
    let id = ItemId::parse("quick-order").map_err(|e| CartError::BadRequest(e.to_string()))?;
    let mut item = NewItem::new(id, name, price);
    if let Some(sku) = sku {
        item = item.with_sku(sku);
    }

    print_line(ctx.config.deep_links().quick_order_link(&item)?);
    Ok(())
}

/// Print the items carried by a direct checkout token.
///
/// # Errors
///
/// Returns error if the token cannot be decoded.
pub fn decode(token: &str) -> Result<()> {
    for line in decode_start_payload(token)? {
        print_line(format_args!(
            "{}\t{}\t{}\t{}\t{}",
            line.id, line.name, line.sku, line.price, line.qty
        ));
    }
    Ok(())
}
