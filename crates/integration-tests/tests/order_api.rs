//! Integration tests for checkout through the HTTP order gateway.
//!
//! Each test runs the real `HttpOrderGateway` against an in-process fake of
//! `POST /api/create-order/`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use shopcart_core::{CurrencyCode, ItemId, NewItem};
use shopcart_integration_tests::{FakeOrderApi, TEST_COOKIE};
use shopcart_storefront::config::CheckoutConfig;
use shopcart_storefront::gateway::{DEFAULT_TOKEN_HEADER, GatewayError};
use shopcart_storefront::store::FixedClock;
use shopcart_storefront::{
    CartStore, CheckoutCoordinator, CheckoutError, CheckoutPhase, DeepLinks, HttpOrderGateway,
    MemoryStore,
};

// =============================================================================
// Helpers
// =============================================================================

fn settings() -> CheckoutConfig {
    CheckoutConfig {
        currency: CurrencyCode::UAH,
        source_tag: "site".to_string(),
        page_url: "https://shop.example/cart/".to_string(),
        catalog_url: "/catalog/".to_string(),
        order_expiry: TimeDelta::minutes(20),
        token_cookie: "csrftoken".to_string(),
    }
}

fn checkout_against(api: &FakeOrderApi) -> (CartStore, CheckoutCoordinator<HttpOrderGateway>) {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap(),
    ));
    let store = CartStore::with_clock(
        Arc::new(MemoryStore::new()),
        clock,
        TimeDelta::minutes(20),
    );
    let gateway =
        HttpOrderGateway::new(api.base_url(), DEFAULT_TOKEN_HEADER, Duration::from_secs(5))
            .unwrap();
    let links = DeepLinks::new("t.me", "shop_manager", "shop_bot", CurrencyCode::UAH);
    let coordinator = CheckoutCoordinator::new(store.clone(), gateway, links, settings());
    (store, coordinator)
}

fn fill_cart(store: &CartStore) {
    store
        .add_item(
            NewItem::new(ItemId::parse("hoodie").unwrap(), " Hoodie ".into(), Decimal::new(59_995, 1))
                .with_sku(" HD-01 ")
                .with_quantity(2),
        )
        .unwrap();
    store
        .add_item(NewItem::new(
            ItemId::parse("cap").unwrap(),
            "Cap".into(),
            Decimal::from(800),
        ))
        .unwrap();
}

// =============================================================================
// Success
// =============================================================================

#[tokio::test]
async fn test_successful_order_posts_payload_and_returns_redirect() {
    let api = FakeOrderApi::start(200, json!({ "order_id": "A-2001" })).await;
    let (store, checkout) = checkout_against(&api);
    fill_cart(&store);

    checkout.start_checkout().unwrap();
    let outcome = checkout.confirm(Some(TEST_COOKIE)).await.unwrap();

    assert_eq!(outcome.order_id.as_str(), "A-2001");
    assert_eq!(outcome.redirect, "https://t.me/shop_manager?start=A-2001");
    assert_eq!(checkout.phase(), CheckoutPhase::Succeeded);
    assert!(store.order_timestamp().unwrap().is_some());

    let requests = api.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.token.as_deref(), Some("test-token"));
    assert_eq!(request.referer.as_deref(), Some("https://shop.example/cart/"));

    // Lines are sorted by id: cap, hoodie
    assert_eq!(
        request.body,
        json!({
            "items": [
                { "sku": "", "name": "Cap", "price": 800, "qty": 1 },
                { "sku": "HD-01", "name": "Hoodie", "price": 6000, "qty": 2 },
            ],
            "total": 12_800,
            "currency": "UAH",
            "source": "site",
            "page": "https://shop.example/cart/",
            "ts": Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap().timestamp_millis(),
        })
    );
}

#[tokio::test]
async fn test_numeric_order_id_is_accepted() {
    let api = FakeOrderApi::start(201, json!({ "order_id": 77 })).await;
    let (store, checkout) = checkout_against(&api);
    fill_cart(&store);

    checkout.start_checkout().unwrap();
    let outcome = checkout.confirm(Some(TEST_COOKIE)).await.unwrap();
    assert_eq!(outcome.order_id.as_str(), "77");
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_server_error_message_is_surfaced_and_retry_is_possible() {
    let api = FakeOrderApi::start(400, json!({ "error": "Item HD-01 is out of stock" })).await;
    let (store, checkout) = checkout_against(&api);
    fill_cart(&store);

    checkout.start_checkout().unwrap();
    let err = checkout.confirm(Some(TEST_COOKIE)).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Gateway(GatewayError::Api { status: 400, .. })
    ));
    assert_eq!(err.user_message(), "Item HD-01 is out of stock");
    assert_eq!(checkout.phase(), CheckoutPhase::Previewing);
    assert!(store.order_timestamp().unwrap().is_none());

    // The preview is still open, so confirming again reaches the server again
    let _ = checkout.confirm(Some(TEST_COOKIE)).await;
    assert_eq!(api.requests().len(), 2);
}

#[tokio::test]
async fn test_success_without_order_id_is_a_failure() {
    let api = FakeOrderApi::start(200, json!({ "status": "ok" })).await;
    let (store, checkout) = checkout_against(&api);
    fill_cart(&store);

    checkout.start_checkout().unwrap();
    let err = checkout.confirm(Some(TEST_COOKIE)).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Gateway(GatewayError::MissingOrderId)
    ));
    assert!(!err.user_message().is_empty());
    assert_eq!(checkout.phase(), CheckoutPhase::Previewing);
}

#[tokio::test]
async fn test_server_error_without_body_uses_generic_message() {
    let api = FakeOrderApi::start(500, json!(null)).await;
    let (store, checkout) = checkout_against(&api);
    fill_cart(&store);

    checkout.start_checkout().unwrap();
    let err = checkout.confirm(Some(TEST_COOKIE)).await.unwrap_err();
    assert!(err.user_message().contains("try again"));
}

#[tokio::test]
async fn test_missing_token_never_reaches_the_server() {
    let api = FakeOrderApi::start(200, json!({ "order_id": "1" })).await;
    let (store, checkout) = checkout_against(&api);
    fill_cart(&store);

    checkout.start_checkout().unwrap();
    let err = checkout.confirm(Some("sessionid=s3ss")).await.unwrap_err();

    assert!(matches!(err, CheckoutError::MissingSecurityToken));
    assert!(api.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_is_reported_as_http_error() {
    let api = FakeOrderApi::start(200, json!({ "order_id": "1" })).await;
    let base_url = api.base_url().to_string();
    drop(api);

    let gateway =
        HttpOrderGateway::new(&base_url, DEFAULT_TOKEN_HEADER, Duration::from_secs(2)).unwrap();
    let store = CartStore::new(Arc::new(MemoryStore::new()));
    fill_cart(&store);
    let links = DeepLinks::new("t.me", "shop_manager", "shop_bot", CurrencyCode::UAH);
    let checkout = CheckoutCoordinator::new(store, gateway, links, settings());

    checkout.start_checkout().unwrap();
    let err = checkout.confirm(Some(TEST_COOKIE)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(checkout.phase(), CheckoutPhase::Previewing);
}
