//! Client for the upstream fantasy-football API.
//!
//! Two fixed endpoints are consumed: `bootstrap-static/` (events + teams)
//! and `fixtures/` (a bare array). Fetches are single-attempt; any failure
//! aborts the refresh that requested it.

use std::time::Duration;

use async_trait::async_trait;
use fpldash_core::{BootstrapPayload, RawFixture};
use reqwest::header::CACHE_CONTROL;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info_span;

pub const CRATE_NAME: &str = "fpldash-upstream";

pub const DEFAULT_BASE_URL: &str = "https://fantasy.premierleague.com/api";

const BOOTSTRAP: &str = "bootstrap";
const FIXTURES: &str = "fixtures";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("FPL {endpoint} failed: {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("FPL {endpoint} request failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("FPL {endpoint} returned invalid JSON: {source}")]
    Parse {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected fixtures response (not an array)")]
    FixturesNotArray,
}

/// Upstream boundary, substitutable in tests.
#[async_trait]
pub trait FplApi: Send + Sync {
    async fn fetch_bootstrap(&self) -> Result<BootstrapPayload, UpstreamError>;
    async fn fetch_fixtures(&self) -> Result<Vec<RawFixture>, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: "fpldash/0.1".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct HttpFplApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFplApi {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Single uncached GET; non-2xx and transport failures are terminal.
    async fn get_fresh(
        &self,
        endpoint: &'static str,
        path: &str,
    ) -> Result<Vec<u8>, UpstreamError> {
        let url = format!("{}/{}", self.base_url, path);
        let span = info_span!("upstream_get", endpoint, %url);
        let _guard = span.enter();

        let resp = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|source| UpstreamError::Request { endpoint, source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|source| UpstreamError::Request { endpoint, source })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FplApi for HttpFplApi {
    async fn fetch_bootstrap(&self) -> Result<BootstrapPayload, UpstreamError> {
        let body = self.get_fresh(BOOTSTRAP, "bootstrap-static/").await?;
        parse_bootstrap(&body)
    }

    async fn fetch_fixtures(&self) -> Result<Vec<RawFixture>, UpstreamError> {
        let body = self.get_fresh(FIXTURES, "fixtures/").await?;
        parse_fixtures(&body)
    }
}

/// Parse a bootstrap body. Missing `events`/`teams` collections default to
/// empty rather than failing the refresh.
pub fn parse_bootstrap(body: &[u8]) -> Result<BootstrapPayload, UpstreamError> {
    serde_json::from_slice(body).map_err(|source| UpstreamError::Parse {
        endpoint: BOOTSTRAP,
        source,
    })
}

/// Parse a fixtures body, rejecting any JSON shape that is not an array.
pub fn parse_fixtures(body: &[u8]) -> Result<Vec<RawFixture>, UpstreamError> {
    let value: JsonValue = serde_json::from_slice(body).map_err(|source| UpstreamError::Parse {
        endpoint: FIXTURES,
        source,
    })?;
    if !value.is_array() {
        return Err(UpstreamError::FixturesNotArray);
    }
    serde_json::from_value(value).map_err(|source| UpstreamError::Parse {
        endpoint: FIXTURES,
        source,
    })
}
