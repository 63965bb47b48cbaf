use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::catalog::TOKEN_ENV;
use crate::error::SceneError;

/// One fulfillment status report for a placed order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatus {
    pub acquisition_id: String,
    pub state: String,
    /// Delivery location, or the provider's `not_delivered` sentinel.
    pub location: String,
}

pub trait OrderingClient: Send + Sync {
    /// Place a fulfillment order for one scene, returning the order id.
    fn order(&self, scene_id: &str) -> Result<String, SceneError>;

    /// One status check; callers drive the polling loop.
    fn status(&self, order_id: &str) -> Result<OrderStatus, SceneError>;
}

#[derive(Clone)]
pub struct GbdxOrderingClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    acquisitions: Vec<OrderStatus>,
}

impl GbdxOrderingClient {
    pub fn new() -> Result<Self, SceneError> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(SceneError::MissingEnv(TOKEN_ENV))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gbdx-sm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SceneError::OrderingHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|err| SceneError::OrderingHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SceneError::OrderingHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://geobigdata.io".to_string(),
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, SceneError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ordering request failed".to_string());
            return Err(SceneError::OrderingStatus { status, message });
        }
        response
            .json()
            .map_err(|err| SceneError::OrderingHttp(err.to_string()))
    }
}

impl OrderingClient for GbdxOrderingClient {
    fn order(&self, scene_id: &str) -> Result<String, SceneError> {
        let url = format!("{}/orders/v2/order", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&vec![scene_id])
            .send()
            .map_err(|err| SceneError::OrderingHttp(err.to_string()))?;
        let body: OrderResponse = Self::read_json(response)?;
        Ok(body.order_id)
    }

    fn status(&self, order_id: &str) -> Result<OrderStatus, SceneError> {
        let url = format!("{}/orders/v2/order/{order_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| SceneError::OrderingHttp(err.to_string()))?;
        let body: StatusResponse = Self::read_json(response)?;
        body.acquisitions
            .into_iter()
            .next()
            .ok_or_else(|| SceneError::OrderingHttp(format!("order {order_id} has no acquisitions")))
    }
}
