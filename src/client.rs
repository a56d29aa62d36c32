//! Authenticated HTTP transport bound to one cluster endpoint
//!
//! Every cluster (Prism Central included) gets its own [`PrismClient`] bound
//! to that cluster's base URL. The resolver and the collectors depend only on
//! the [`ApiTransport`] trait, so tests can substitute canned responses.

use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::header;
use reqwest::Url;
use serde_json::Value;

use crate::credentials::BasicCredentials;
use crate::error::Error;

/// Per-request deadline against a cluster API
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes JSON requests against one cluster API
///
/// Paths are cluster-relative (`/api/...`); the implementation owns the base
/// URL, authentication, and response decoding.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Execute a GET request and decode the JSON response body
    async fn get_json(&self, path: &str) -> crate::Result<Value>;

    /// Execute a POST request with a JSON payload and decode the response body
    async fn post_json(&self, path: &str, payload: Value) -> crate::Result<Value>;
}

/// HTTP client bound to one cluster's management endpoint
///
/// Credentials are held behind an atomic swap so the opportunistic refresh
/// path can rotate them without blocking in-flight requests.
#[derive(Debug)]
pub struct PrismClient {
    base_url: String,
    http: reqwest::Client,
    credentials: ArcSwap<BasicCredentials>,
}

impl PrismClient {
    /// Create a client bound to the given endpoint
    ///
    /// The endpoint must be an absolute http(s) URL. Managed clusters present
    /// self-signed certificates, so server certificate verification is
    /// disabled for this client.
    pub fn new(endpoint: &str, credentials: BasicCredentials) -> crate::Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid cluster endpoint '{endpoint}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "cluster endpoint '{endpoint}' must be http or https"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base.as_str().trim_end_matches('/').to_string(),
            http,
            credentials: ArcSwap::from_pointee(credentials),
        })
    }

    /// Base URL this client is bound to
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Replace the credentials used for subsequent requests
    pub fn set_credentials(&self, credentials: BasicCredentials) {
        self.credentials.store(std::sync::Arc::new(credentials));
    }

    /// Credentials currently in use
    pub fn credentials(&self) -> BasicCredentials {
        self.credentials.load().as_ref().clone()
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> crate::Result<Value> {
        let creds = self.credentials.load();
        let response = request
            .basic_auth(&creds.username, Some(&creds.password))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::http(path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::api(path, status.as_u16()));
        }

        response.json().await.map_err(|e| Error::http(path, e))
    }
}

#[async_trait]
impl ApiTransport for PrismClient {
    async fn get_json(&self, path: &str) -> crate::Result<Value> {
        self.execute(self.http.get(self.url_for(path)), path).await
    }

    async fn post_json(&self, path: &str, payload: Value) -> crate::Result<Value> {
        self.execute(self.http.post(self.url_for(path)).json(&payload), path)
            .await
    }
}
