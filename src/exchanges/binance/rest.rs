use crate::core::config::StreamConfig;
use crate::core::errors::StreamError;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fmt;
use tracing::{instrument, trace};

const USER_DATA_STREAM_ENDPOINT: &str = "/api/v3/userDataStream";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Source of listen keys for the user data stream
///
/// Keys expire after 60 minutes unless kept alive. Refreshing them is the
/// caller's job; the stream connections never call this trait.
#[async_trait]
pub trait ListenKeyProvider: Send + Sync {
    /// Open a user data stream and return its listen key
    async fn create(&self) -> Result<String, StreamError>;

    /// Extend the validity of `listen_key`
    async fn keepalive(&self, listen_key: &str) -> Result<(), StreamError>;

    /// Invalidate `listen_key`, closing its stream on the server side
    async fn close(&self, listen_key: &str) -> Result<(), StreamError>;
}

#[derive(Deserialize)]
struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    listen_key: String,
}

#[derive(Deserialize)]
struct BinanceErrorBody {
    code: i32,
    msg: String,
}

/// `ListenKeyProvider` backed by the spot REST API
#[derive(Clone)]
pub struct BinanceListenKeyClient {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl fmt::Debug for BinanceListenKeyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceListenKeyClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl BinanceListenKeyClient {
    pub fn new(base_url: impl Into<String>, api_key: Secret<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Build a client from config; fails when no API key is configured
    pub fn from_config(config: &StreamConfig) -> Result<Self, StreamError> {
        if !config.has_credentials() {
            return Err(StreamError::InvalidParameters(
                "an API key is required for user data streams".to_string(),
            ));
        }
        Ok(Self::new(config.resolved_rest_url(), config.api_key.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip_all, fields(method = %method))]
    async fn request(&self, method: Method, listen_key: Option<&str>) -> Result<Response, StreamError> {
        let url = format!("{}{}", self.base_url, USER_DATA_STREAM_ENDPOINT);
        let mut request = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, self.api_key.expose_secret());
        if let Some(key) = listen_key {
            request = request.query(&[("listenKey", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await?;
        trace!(%status, body = %body, "listen key request rejected");
        Err(match serde_json::from_str::<BinanceErrorBody>(&body) {
            Ok(err) => StreamError::ApiError {
                code: err.code,
                message: err.msg,
            },
            Err(_) => StreamError::ApiError {
                code: i32::from(status.as_u16()),
                message: body,
            },
        })
    }
}

#[async_trait]
impl ListenKeyProvider for BinanceListenKeyClient {
    async fn create(&self) -> Result<String, StreamError> {
        let response = self.request(Method::POST, None).await?;
        let body = response.text().await?;
        let parsed: ListenKeyResponse = serde_json::from_str(&body)?;
        Ok(parsed.listen_key)
    }

    async fn keepalive(&self, listen_key: &str) -> Result<(), StreamError> {
        self.request(Method::PUT, Some(listen_key)).await?;
        Ok(())
    }

    async fn close(&self, listen_key: &str) -> Result<(), StreamError> {
        self.request(Method::DELETE, Some(listen_key)).await?;
        Ok(())
    }
}
