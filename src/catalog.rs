use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::query::CatalogSearchRequest;

pub const TOKEN_ENV: &str = "GBDX_TOKEN";

/// One raw catalog record as returned by the provider, before
/// normalization into a [`crate::scene::Scene`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "catalogID")]
    pub catalog_id: String,

    pub timestamp: String,

    #[serde(rename = "footprintWkt")]
    pub footprint_wkt: String,

    #[serde(rename = "platformName")]
    pub platform_name: String,

    #[serde(rename = "cloudCover", default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,

    #[serde(rename = "multiResolution", default, skip_serializing_if = "Option::is_none")]
    pub multi_resolution: Option<f64>,

    #[serde(rename = "sunAzimuth", default, skip_serializing_if = "Option::is_none")]
    pub sun_azimuth: Option<f64>,

    #[serde(rename = "sunElevation", default, skip_serializing_if = "Option::is_none")]
    pub sun_elevation: Option<f64>,

    #[serde(rename = "offNadirAngle", default, skip_serializing_if = "Option::is_none")]
    pub off_nadir_angle: Option<f64>,

    #[serde(rename = "targetAzimuth", default, skip_serializing_if = "Option::is_none")]
    pub target_azimuth: Option<f64>,

    #[serde(rename = "imageBands", default, skip_serializing_if = "Option::is_none")]
    pub image_bands: Option<String>,

    #[serde(rename = "browseURL", default, skip_serializing_if = "Option::is_none")]
    pub browse_url: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

pub trait CatalogClient: Send + Sync {
    /// Run a translated search against the catalog.
    fn search(&self, request: &CatalogSearchRequest) -> Result<Vec<RawRecord>, SceneError>;

    /// Fetch named records directly, bypassing search filters.
    fn fetch_records(&self, ids: &[String]) -> Result<Vec<RawRecord>, SceneError>;
}

#[derive(Clone)]
pub struct GbdxCatalogClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    properties: RawRecord,
}

impl GbdxCatalogClient {
    pub fn new() -> Result<Self, SceneError> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(SceneError::MissingEnv(TOKEN_ENV))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gbdx-sm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SceneError::CatalogHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|err| SceneError::CatalogHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SceneError::CatalogHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://geobigdata.io".to_string(),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, SceneError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(SceneError::CatalogHttp(err.to_string()));
                }
            }
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, SceneError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "catalog request failed".to_string());
            return Err(SceneError::CatalogStatus { status, message });
        }
        response
            .json()
            .map_err(|err| SceneError::CatalogHttp(err.to_string()))
    }
}

impl CatalogClient for GbdxCatalogClient {
    fn search(&self, request: &CatalogSearchRequest) -> Result<Vec<RawRecord>, SceneError> {
        let url = format!("{}/catalog/v2/search", self.base_url);
        let response = self.send_with_retries(|| self.client.post(&url).json(request))?;
        let body: SearchResponse = Self::read_json(response)?;
        Ok(body.results.into_iter().map(|entry| entry.properties).collect())
    }

    fn fetch_records(&self, ids: &[String]) -> Result<Vec<RawRecord>, SceneError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let url = format!("{}/catalog/v2/record/{id}", self.base_url);
            let response = self.send_with_retries(|| self.client.get(&url))?;
            let entry: CatalogEntry = Self::read_json(response)?;
            records.push(entry.properties);
        }
        Ok(records)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
