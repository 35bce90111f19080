//! HTTP transport.
//!
//! Requests are plain values ([`ApiRequest`]) so the credential layer can
//! re-issue one with a different bearer header. [`Transport`] is the seam
//! between that layer and the wire; [`ReqwestTransport`] is the real one.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::refresh::RefreshFailure;
use crate::error::{FinsyncError, Result};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the API version.
pub const API_VERSION_HEADER: &str = "x-api-version";

const AUTHORIZATION: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }
}

/// What a request is for; decides whether credentials are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Ordinary authenticated API call.
    Api,
    /// Call to the token endpoint; never carries a bearer token.
    TokenGrant,
}

/// A request that can be sent any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path relative to the API base URL, or an absolute `http(s)://` URL.
    pub target: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub kind: RequestKind,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            kind: RequestKind::Api,
        }
    }

    #[must_use]
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, target)
    }

    #[must_use]
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, target)
    }

    #[must_use]
    pub fn post(target: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, target).with_body(body)
    }

    /// POST to the token endpoint.
    #[must_use]
    pub fn token_grant(token_url: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::post(token_url, body);
        request.kind = RequestKind::TokenGrant;
        request
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set a header, replacing any existing value (names compare case-insensitively).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        self.clone()
            .with_header(AUTHORIZATION, format!("{BEARER_PREFIX}{token}"))
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Bearer token carried by this request, if any.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.header(AUTHORIZATION)
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    }
}

/// A response, already fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Set when a 401 could not be recovered by refreshing the session.
    pub refresh_failure: Option<RefreshFailure>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            refresh_failure: None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body as lossy UTF-8, truncated for logs.
    #[must_use]
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(200).collect()
    }
}

/// Failure to get any response at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    /// The session had to be refreshed before sending and could not be.
    #[error("session could not be refreshed: {0}")]
    Reauthentication(RefreshFailure),

    #[error("request failed: {0}")]
    Other(String),
}

// =============================================================================
// Transport
// =============================================================================

/// Sends requests and returns complete responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` once. Non-2xx statuses are responses, not failures.
    async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportFailure>;
}

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if the API version is not a valid header value or client
/// construction fails.
pub fn build_client(timeout: Duration, api_version: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(API_VERSION_HEADER),
        HeaderValue::from_str(api_version).map_err(|e| FinsyncError::ConfigInvalid {
            key: "api.api_version".to_string(),
            value: api_version.to_string(),
            message: e.to_string(),
        })?,
    );

    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("finsync/{}", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()
        .map_err(|e| FinsyncError::Other(anyhow::anyhow!("build HTTP client: {e}")))
}

/// [`Transport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns [`FinsyncError::ConfigInvalid`] if `base_url` does not parse.
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| FinsyncError::ConfigInvalid {
            key: "api.base_url".to_string(),
            value: base_url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { client, base_url })
    }

    fn resolve(&self, request: &ApiRequest) -> std::result::Result<Url, TransportFailure> {
        let mut url = if request.target.starts_with("http://") || request.target.starts_with("https://") {
            Url::parse(&request.target)
        } else {
            self.base_url.join(request.target.trim_start_matches('/'))
        }
        .map_err(|e| TransportFailure::Other(format!("invalid URL {}: {e}", request.target)))?;

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn map_reqwest_error(e: &reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportFailure::Connect(e.to_string())
    } else {
        TransportFailure::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportFailure> {
        let url = self.resolve(request)?;
        let started = Instant::now();

        let mut builder = self.client.request(request.method.to_reqwest(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(method = request.method.as_str(), path = url.path(), error = %e, "Request failed");
            map_reqwest_error(&e)
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| map_reqwest_error(&e))?;

        tracing::debug!(
            method = request.method.as_str(),
            path = url.path(),
            status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request completed"
        );

        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
