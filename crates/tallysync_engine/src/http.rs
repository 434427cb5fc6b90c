//! HTTP remote client.
//!
//! [`HttpRemoteClient`] speaks JSON over HTTP with bearer authentication.
//! Every failure is classified into a [`RemoteFailure`]. A request is only
//! resent here when its options allow more than one attempt.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{RemoteClient, RemoteFailure, RemoteRequest, RemoteResponse, RemoteResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tallysync_protocol::HttpMethod;
use tracing::{debug, warn};

/// Source of the bearer credential.
pub trait CredentialStore: Send + Sync {
    /// Returns the current bearer token, if signed in.
    fn bearer_token(&self) -> Option<String>;

    /// Forgets the credential after the server rejected it.
    fn invalidate(&self);
}

/// An in-memory credential.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    /// Creates a store holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Creates a signed-out store.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Replaces the token, e.g. after the user signed in again.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }
}

impl CredentialStore for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn invalidate(&self) {
        *self.token.write() = None;
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(alias = "message")]
    error: String,
}

/// JSON-over-HTTP implementation of [`RemoteClient`].
pub struct HttpRemoteClient<C: CredentialStore> {
    base_url: Url,
    http: reqwest::Client,
    credentials: C,
    default_timeout: Duration,
}

impl<C: CredentialStore> HttpRemoteClient<C> {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, credentials: C, default_timeout: Duration) -> SyncResult<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|err| SyncError::Config(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| SyncError::Config(format!("http client: {err}")))?;

        Ok(Self {
            base_url,
            http,
            credentials,
            default_timeout,
        })
    }

    /// Creates a client from the engine configuration, using its base URL
    /// and request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the configured base URL is not an
    /// absolute URL.
    pub fn from_config(config: &SyncConfig, credentials: C) -> SyncResult<Self> {
        Self::new(&config.base_url, credentials, config.request_timeout)
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the credential store.
    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    fn classify(err: reqwest::Error) -> RemoteFailure {
        if err.is_timeout() {
            RemoteFailure::Timeout
        } else {
            RemoteFailure::NetworkUnavailable(err.to_string())
        }
    }

    async fn send_once(&self, request: &RemoteRequest) -> RemoteResult {
        let url = self
            .base_url
            .join(request.endpoint.trim_start_matches('/'))
            .map_err(|err| RemoteFailure::ServerError {
                status: 0,
                message: format!("invalid endpoint {}: {err}", request.endpoint),
            })?;

        let timeout = request.options.timeout.unwrap_or(self.default_timeout);
        let mut builder = self
            .http
            .request(Self::method(request.method), url)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json");

        if !request.options.skip_auth {
            match self.credentials.bearer_token() {
                Some(token) => builder = builder.bearer_auth(token),
                None => {
                    warn!(endpoint = %request.endpoint, "no credential available");
                    return Err(RemoteFailure::Unauthorized);
                }
            }
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        if let Some(payload) = &request.payload {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.clone());
        }

        debug!(method = %request.method, endpoint = %request.endpoint, "sending request");
        let res = builder.send().await.map_err(Self::classify)?;
        let status = res.status();

        if status.is_success() {
            let text = res.text().await.map_err(Self::classify)?;
            let body = if text.trim().is_empty() {
                None
            } else {
                serde_json::from_str::<Value>(&text).ok()
            };
            return Ok(RemoteResponse::new(status.as_u16(), body));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!(endpoint = %request.endpoint, "credential rejected");
            self.credentials.invalidate();
            return Err(RemoteFailure::Unauthorized);
        }

        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|err| err.error)
            .unwrap_or_else(|_| {
                if text.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    text
                }
            });

        Err(RemoteFailure::ServerError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl<C: CredentialStore> RemoteClient for HttpRemoteClient<C> {
    async fn send(&self, request: RemoteRequest) -> RemoteResult {
        let attempts = request.options.max_attempts.unwrap_or(1).max(1);
        let mut attempt = 1;
        loop {
            match self.send_once(&request).await {
                Err(failure) if attempt < attempts && failure.is_retryable(request.method) => {
                    debug!(
                        endpoint = %request.endpoint,
                        attempt,
                        error = %failure,
                        "request failed, resending"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
