//! Order submission backend.
//!
//! The checkout coordinator talks to the backend through [`OrderGateway`];
//! [`HttpOrderGateway`] is the production implementation, posting the order
//! payload as JSON to `{base}/api/create-order/`.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, REFERER};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use shopcart_core::{OrderId, OrderPayload};
use thiserror::Error;
use url::Url;

/// Path of the order endpoint, relative to the API base URL.
pub const CREATE_ORDER_PATH: &str = "api/create-order/";

/// Default header carrying the security token.
pub const DEFAULT_TOKEN_HEADER: &str = "X-CSRFToken";

/// Errors that can occur when submitting an order.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected the order.
    #[error("API error: {status} - {}", .message.as_deref().unwrap_or("no message"))]
    Api { status: u16, message: Option<String> },

    /// Backend answered success without an order id.
    #[error("response did not contain an order id")]
    MissingOrderId,

    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl GatewayError {
    /// The backend's own explanation, if it sent one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Something that accepts orders.
pub trait OrderGateway: Send + Sync {
    /// Submit an order, returning the id the backend assigned to it.
    fn submit(
        &self,
        payload: &OrderPayload,
        token: &SecretString,
    ) -> impl Future<Output = Result<OrderId, GatewayError>> + Send;
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    #[serde(default)]
    order_id: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl CreateOrderResponse {
    fn order_id(&self) -> Option<OrderId> {
        let raw = match self.order_id.as_ref()? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        OrderId::parse(&raw).ok()
    }
}

/// Order gateway backed by the site's HTTP API.
#[derive(Clone)]
pub struct HttpOrderGateway {
    client: reqwest::Client,
    endpoint: Url,
    token_header: HeaderName,
}

impl HttpOrderGateway {
    /// Create a gateway for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL or header name is invalid, or the HTTP client
    /// fails to build.
    pub fn new(base_url: &str, token_header: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(CREATE_ORDER_PATH)?;

        let token_header = HeaderName::from_bytes(token_header.as_bytes())
            .map_err(|e| GatewayError::InvalidHeader(format!("{token_header}: {e}")))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            token_header,
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl OrderGateway for HttpOrderGateway {
    async fn submit(
        &self,
        payload: &OrderPayload,
        token: &SecretString,
    ) -> Result<OrderId, GatewayError> {
        let mut token_value = HeaderValue::from_str(token.expose_secret())
            .map_err(|_| GatewayError::InvalidHeader("security token".to_owned()))?;
        token_value.set_sensitive(true);

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(self.token_header.clone(), token_value)
            .json(payload);
        if let Ok(referer) = HeaderValue::from_str(&payload.page)
            && !payload.page.is_empty()
        {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<CreateOrderResponse>(&body).ok();

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Order API returned an error");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: parsed.and_then(|r| r.error),
            });
        }

        let Some(parsed) = parsed else {
            return Err(GatewayError::MissingOrderId);
        };
        if let Some(order_id) = parsed.order_id() {
            return Ok(order_id);
        }
        match parsed.error {
            Some(message) => Err(GatewayError::Api {
                status: status.as_u16(),
                message: Some(message),
            }),
            None => Err(GatewayError::MissingOrderId),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_is_joined_under_base_path() {
        let timeout = Duration::from_secs(5);
        let root = HttpOrderGateway::new("https://shop.example", DEFAULT_TOKEN_HEADER, timeout).unwrap();
        assert_eq!(root.endpoint().as_str(), "https://shop.example/api/create-order/");

        let nested =
            HttpOrderGateway::new("https://shop.example/ua", DEFAULT_TOKEN_HEADER, timeout).unwrap();
        assert_eq!(nested.endpoint().as_str(), "https://shop.example/ua/api/create-order/");
    }

    #[test]
    fn test_invalid_configuration() {
        let timeout = Duration::from_secs(5);
        assert!(matches!(
            HttpOrderGateway::new("not a url", DEFAULT_TOKEN_HEADER, timeout),
            Err(GatewayError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpOrderGateway::new("https://shop.example", "bad header", timeout),
            Err(GatewayError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_response_order_id_coercion() {
        let numeric: CreateOrderResponse = serde_json::from_str(r#"{"order_id": 1042}"#).unwrap();
        assert_eq!(numeric.order_id().unwrap().as_str(), "1042");

        let blank: CreateOrderResponse = serde_json::from_str(r#"{"order_id": " "}"#).unwrap();
        assert!(blank.order_id().is_none());
    }

    #[test]
    fn test_server_message() {
        let err = GatewayError::Api {
            status: 400,
            message: Some("Cart is empty".into()),
        };
        assert_eq!(err.server_message(), Some("Cart is empty"));
        assert!(GatewayError::MissingOrderId.server_message().is_none());
    }
}
