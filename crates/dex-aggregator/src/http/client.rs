/*
[INPUT]:  HTTP configuration (base URL, timeouts, access token)
[OUTPUT]: Configured reqwest client ready for API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use crate::auth::AccessTokenStore;
use crate::http::{DexError, Result};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("dex/", env!("CARGO_PKG_VERSION"), "/rust");

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Authenticated HTTP client for the DEX data API
#[derive(Debug, Clone)]
pub struct DexHttpClient {
    http_client: Client,
    base_url: Url,
    token_store: AccessTokenStore,
}

fn bearer_header(access_token: &str) -> Result<HeaderValue> {
    let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| DexError::Config("access token is not a valid header value".to_string()))?;
    bearer.set_sensitive(true);
    Ok(bearer)
}

impl DexHttpClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str, access_token: &str) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url, access_token)
    }

    /// Create a new client with custom configuration and a fixed token
    pub fn with_config(config: ClientConfig, base_url: &str, access_token: &str) -> Result<Self> {
        Self::with_token_store(config, base_url, AccessTokenStore::with_token(access_token))
    }

    /// Create a client that reads the bearer token from `token_store` on every request.
    ///
    /// Replacing the token in the store takes effect for the next request.
    pub fn with_token_store(
        config: ClientConfig,
        base_url: &str,
        token_store: AccessTokenStore,
    ) -> Result<Self> {
        if let Some(token) = token_store.token() {
            bearer_header(&token)?;
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            token_store,
        })
    }

    /// Base URL all endpoints are joined onto
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token_store(&self) -> &AccessTokenStore {
        &self.token_store
    }

    /// Build full URL for an endpoint
    fn url(&self, endpoint: &str) -> std::result::Result<Url, url::ParseError> {
        self.base_url.join(endpoint)
    }

    /// Build an authorized request builder for an endpoint
    ///
    /// Fails with `DexError::TokenExpired` when the store holds no valid token.
    pub fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        if self.token_store.is_expired() {
            return Err(DexError::TokenExpired);
        }
        let token = self.token_store.token().ok_or(DexError::TokenExpired)?;
        Ok(self
            .http_client
            .request(method, url)
            .header(AUTHORIZATION, bearer_header(&token)?))
    }

    /// Send a request and decode the JSON body
    ///
    /// Non-2xx responses become `DexError::Api` carrying the status and body.
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "http response received");

        if !status.is_success() {
            return Err(DexError::api_error(status, body));
        }

        serde_json::from_str(&body).map_err(DexError::from)
    }
}
