//! Remote request abstraction.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tallysync_protocol::{HttpMethod, PendingMutation};
use thiserror::Error;

/// Result of a single remote request.
pub type RemoteResult = Result<RemoteResponse, RemoteFailure>;

/// Classified failure of a remote request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// The backend could not be reached.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The credential was rejected (HTTP 401). Never retried.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-2xx response.
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, or the status reason.
        message: String,
    },
}

impl RemoteFailure {
    /// Returns true if the client may resend the same request with `method`
    /// right away.
    ///
    /// A timed-out POST may already have been applied, so it is left to the
    /// drain loop, which flags it ambiguous.
    pub fn is_retryable(&self, method: HttpMethod) -> bool {
        match self {
            RemoteFailure::NetworkUnavailable(_) => true,
            RemoteFailure::Timeout => method.is_idempotent(),
            RemoteFailure::Unauthorized => false,
            RemoteFailure::ServerError { status, .. } => *status >= 500,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
    /// Sends the request without the bearer credential.
    pub skip_auth: bool,
    /// Attempts the client makes before reporting a retryable failure.
    /// `None` and `Some(0)` mean a single attempt.
    pub max_attempts: Option<u32>,
}

/// A single remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Resource path relative to the API base URL.
    pub endpoint: String,
    /// JSON body.
    pub payload: Option<String>,
    /// Sent as `Idempotency-Key` so the server can deduplicate replays.
    pub idempotency_key: Option<String>,
    /// Request options.
    pub options: RequestOptions,
}

impl RemoteRequest {
    /// Creates a request without body.
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            payload: None,
            idempotency_key: None,
            options: RequestOptions::default(),
        }
    }

    /// Builds the replay request of a queued mutation.
    pub fn from_mutation(mutation: &PendingMutation) -> Self {
        Self {
            method: mutation.method,
            endpoint: mutation.endpoint.clone(),
            payload: mutation.payload.clone(),
            idempotency_key: Some(mutation.id.to_string()),
            options: RequestOptions::default(),
        }
    }

    /// Sets the JSON body.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sends the request without credentials.
    pub fn without_auth(mut self) -> Self {
        self.options.skip_auth = true;
        self
    }

    /// Lets the client resend retryable failures up to `attempts` times in
    /// total.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.options.max_attempts = Some(attempts);
        self
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, if there was one.
    pub body: Option<Value>,
}

impl RemoteResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// Creates a `200 OK` with no body.
    pub fn empty() -> Self {
        Self::new(200, None)
    }

    /// Creates a `201 Created` whose body carries `id`.
    pub fn created(id: impl Into<String>) -> Self {
        Self::new(201, Some(serde_json::json!({ "id": id.into() })))
    }

    /// Extracts the server-assigned id from the body's `id` field.
    ///
    /// Numeric ids are rendered in decimal.
    pub fn remote_id(&self) -> Option<String> {
        match self.body.as_ref()?.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Performs single remote requests.
///
/// Implementations classify every failure into [`RemoteFailure`] and never
/// retry on their own: retry policy belongs to the drain loop.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Sends one request.
    async fn send(&self, request: RemoteRequest) -> RemoteResult;
}

/// A scripted remote for testing.
///
/// Responses pushed with [`MockRemote::push_response`] are consumed in
/// order. Once the script is empty, every request succeeds: creates get a
/// `201` with a fresh `srv-N` id, everything else a `200` without body.
#[derive(Debug, Default)]
pub struct MockRemote {
    script: Mutex<VecDeque<RemoteResult>>,
    requests: Mutex<Vec<RemoteRequest>>,
    next_id: AtomicU64,
    unreachable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MockRemote {
    /// Creates a mock that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next unscripted request.
    pub fn push_response(&self, result: RemoteResult) {
        self.script.lock().push_back(result);
    }

    /// Queues several outcomes.
    pub fn push_responses<I: IntoIterator<Item = RemoteResult>>(&self, results: I) {
        self.script.lock().extend(results);
    }

    /// Makes every request fail with `NetworkUnavailable` while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delays every response.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn default_response(&self, request: &RemoteRequest) -> RemoteResponse {
        match request.method {
            HttpMethod::Post => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                RemoteResponse::created(format!("srv-{n}"))
            }
            _ => RemoteResponse::empty(),
        }
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn send(&self, request: RemoteRequest) -> RemoteResult {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.requests.lock().push(request.clone());

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteFailure::NetworkUnavailable("mock remote unreachable".into()));
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_response(&request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallysync_protocol::{EntityType, LocalId, MutationAction};

    #[test]
    fn failure_classification() {
        assert!(!RemoteFailure::Unauthorized.is_retryable(HttpMethod::Get));
        assert!(RemoteFailure::Timeout.is_retryable(HttpMethod::Put));
        assert!(!RemoteFailure::Timeout.is_retryable(HttpMethod::Post));
        assert!(RemoteFailure::NetworkUnavailable("down".into()).is_retryable(HttpMethod::Post));

        let server = RemoteFailure::ServerError {
            status: 503,
            message: "maintenance".into(),
        };
        assert!(server.is_retryable(HttpMethod::Post));
        let rejected = RemoteFailure::ServerError {
            status: 422,
            message: "amount missing".into(),
        };
        assert!(!rejected.is_retryable(HttpMethod::Put));
        assert_eq!(server.to_string(), "server error 503: maintenance");
    }

    #[test]
    fn remote_id_extraction() {
        assert_eq!(RemoteResponse::created("abc").remote_id().as_deref(), Some("abc"));
        assert_eq!(
            RemoteResponse::new(201, Some(serde_json::json!({ "id": 42 })))
                .remote_id()
                .as_deref(),
            Some("42")
        );
        assert_eq!(RemoteResponse::empty().remote_id(), None);
        assert_eq!(
            RemoteResponse::new(201, Some(serde_json::json!({ "id": "" }))).remote_id(),
            None
        );
    }

    #[test]
    fn request_from_mutation() {
        let mutation = PendingMutation::new(
            EntityType::Transaction,
            MutationAction::Create,
            LocalId::from("local_1"),
            None,
            Some(r#"{"amount":3}"#.into()),
        );
        let request = RemoteRequest::from_mutation(&mutation);
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.endpoint, "/transactions");
        assert_eq!(request.idempotency_key.as_deref(), Some(mutation.id.as_str()));
        assert!(!request.options.skip_auth);
    }

    #[tokio::test]
    async fn mock_remote_script_then_default() {
        let remote = MockRemote::new();
        remote.push_response(Err(RemoteFailure::Unauthorized));

        let first = remote.send(RemoteRequest::new(HttpMethod::Post, "/goals")).await;
        assert_eq!(first, Err(RemoteFailure::Unauthorized));

        let second = remote
            .send(RemoteRequest::new(HttpMethod::Post, "/goals"))
            .await
            .unwrap();
        assert_eq!(second.remote_id().as_deref(), Some("srv-1"));

        let third = remote
            .send(RemoteRequest::new(HttpMethod::Delete, "/goals/srv-1"))
            .await
            .unwrap();
        assert_eq!(third.status, 200);
        assert_eq!(remote.request_count(), 3);
    }

    #[tokio::test]
    async fn mock_remote_unreachable() {
        let remote = MockRemote::new();
        remote.set_unreachable(true);
        let result = remote.send(RemoteRequest::new(HttpMethod::Put, "/budgets/1")).await;
        assert!(matches!(result, Err(RemoteFailure::NetworkUnavailable(_))));
    }
}
