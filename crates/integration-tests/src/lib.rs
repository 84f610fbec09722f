//! Integration test support for Shopcart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopcart-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_storage` - File-backed cart, schema migration, observers, expiry
//! - `order_api` - Checkout through the HTTP gateway against [`FakeOrderApi`]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::task::JoinHandle;

/// Cookie header carrying a valid security token.
pub const TEST_COOKIE: &str = "sessionid=s3ss; csrftoken=test-token";

/// A request received by the fake order API.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub token: Option<String>,
    pub referer: Option<String>,
    pub body: Value,
}

struct FakeState {
    status: StatusCode,
    reply: Value,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// In-process stand-in for `POST /api/create-order/`.
///
/// Every request gets the same canned reply. The server stops when the
/// value is dropped.
pub struct FakeOrderApi {
    base_url: String,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeOrderApi {
    /// Start a fake API answering every order with `status` and `reply`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start(status: u16, reply: Value) -> Self {
        let state = Arc::new(FakeState {
            status: StatusCode::from_u16(status).expect("valid status code"),
            reply,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/create-order/", post(create_order))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind fake order API");
        let addr = listener.local_addr().expect("local address");

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            server,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for FakeOrderApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn create_order(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    };

    state
        .requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(RecordedRequest {
            token: header_value("x-csrftoken"),
            referer: header_value(header::REFERER.as_str()),
            body,
        });

    (state.status, Json(state.reply.clone()))
}
