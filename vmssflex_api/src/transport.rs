//! Shared HTTP transport for ARM calls.
//!
//! A [`Transport`] is built once from an explicit [`TransportConfig`] and then
//! cloned into every client that needs it; clones share one connection pool.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::Error;

/// Public-cloud Resource Manager endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Settings for the shared transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Resource Manager base URL. Overridden for sovereign clouds and tests.
    pub endpoint: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("vmssflex-cache/{}", env!("CARGO_PKG_VERSION")),
            bearer_token: None,
        }
    }
}

impl TransportConfig {
    /// Config pointing at a custom endpoint. Used for testing with wiremock.
    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }
}

/// Process-wide HTTP transport. Cheap to clone.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    endpoint: Url,
    bearer_token: Option<Arc<str>>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            tracing::error!("Invalid ARM endpoint {}: {}", config.endpoint, e);
            Error::RequestFailed
        })?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::RequestFailed
            })?;
        Ok(Self {
            http,
            endpoint,
            bearer_token: config.bearer_token.map(Arc::from),
        })
    }

    /// Builds `<endpoint>/<segments...>` with each segment percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                tracing::error!("ARM endpoint {} cannot carry a path", self.endpoint);
                Error::RequestFailed
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        self.send(self.http.get(url)).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, Error> {
        self.send(self.http.post(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let resp = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send ARM request: {}", e);
                Error::RequestFailed
            })?;

        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());
        let body = resp.text().await.map_err(|e| {
            tracing::error!("Failed to read response body: {}", e);
            Error::RequestFailed
        })?;

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("ARM returned 404: {}", truncate_body(&body));
            return Err(Error::NotFound);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("ARM throttled the request, retry after {:?}", retry_after);
            return Err(Error::Throttled { retry_after });
        }
        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::error!("Request failed with status {}: {}", status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse resource: {} | body: {}", e, snippet);
            Error::Malformed(e.to_string())
        })
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}
