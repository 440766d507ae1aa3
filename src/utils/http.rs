//! HTTP client utilities.

use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::sources::{RemoteServiceError, SourceError};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in a [`RemoteServiceError`] message
const MAX_ERROR_BODY: usize = 200;

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a client with the crate user agent and the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        Self::with_user_agent(
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            timeout,
        )
    }

    /// Create a new HTTP client with a custom user agent
    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RemoteServiceError::network("http", format!("failed to build client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request, turning transport failures and non-success statuses
    /// into a classified [`RemoteServiceError`] attributed to `service`.
    pub async fn send(&self, service: &str, request: RequestBuilder) -> Result<Response, SourceError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteServiceError::from_reqwest(service, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let mut message = status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string();
        let body = body.trim();
        if !body.is_empty() {
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            message = format!("{}: {}", message, snippet);
        }

        Err(RemoteServiceError::from_status(service, status.as_u16(), message).into())
    }
}
