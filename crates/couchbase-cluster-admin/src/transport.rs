//! HTTP transport for admin REST calls
//!
//! One [`Request`] in, one [`Response`] out. The transport applies
//! credentials, timeouts and the read-timeout retry policy, and never looks
//! at status codes: interpreting them is the caller's job.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::config::TransportConfig;
use crate::error::{ClusterError, Result};
use crate::retry::{RetryPolicy, is_read_timeout};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP basic-auth credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request payload; each endpoint uses exactly one encoding
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Pre-encoded `application/x-www-form-urlencoded` pairs
    Form(String),
    Json(serde_json::Value),
    /// Raw text, sent without a content type
    Text(String),
}

impl Body {
    /// Form-encode any map or struct of scalar values
    pub fn form<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        Ok(Self::Form(serde_urlencoded::to_string(data)?))
    }

    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(data)?))
    }
}

/// A fully-formed admin request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub body: Body,
    pub headers: Vec<(String, String)>,
    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
    /// Whether a read timeout may be retried
    pub retryable: bool,
}

impl Request {
    /// Idempotent methods are retry-eligible by default
    pub fn new(method: Method, url: Url) -> Self {
        let retryable = matches!(method, Method::GET | Method::HEAD | Method::PUT | Method::DELETE);
        Self {
            method,
            url,
            body: Body::Empty,
            headers: Vec::new(),
            timeout: None,
            retryable,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// Status code and fully-read body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn is_success_in(&self, accepted: &[StatusCode]) -> bool {
        accepted.contains(&self.status)
    }

    /// Pass the response through if its status is accepted, otherwise
    /// build an error from the body text
    pub fn ensure<F>(self, accepted: &[StatusCode], on_failure: F) -> Result<Self>
    where
        F: FnOnce(StatusCode, String) -> ClusterError,
    {
        if self.is_success_in(accepted) {
            Ok(self)
        } else {
            Err(on_failure(self.status, self.text()))
        }
    }
}

/// Longest connection setup allowed under a request timeout.
///
/// reqwest's request timer also runs during connection setup. Keeping the
/// connect timer well inside it makes a stalled connection fail as a connect
/// error, never as a request timeout that looks like a slow response.
fn connect_budget(request_timeout: Duration) -> Duration {
    request_timeout.saturating_sub(request_timeout / 10)
}

/// Connect timeout actually applied: the configured one, capped by the
/// budget of both request timeouts
fn effective_connect_timeout(config: &TransportConfig) -> Duration {
    config
        .connect_timeout
        .min(connect_budget(config.default_timeout))
        .min(connect_budget(config.long_timeout))
}

/// reqwest-backed transport with a fixed-delay read-timeout retry
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    default_timeout: Duration,
    connect_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(tls_verify: bool, config: &TransportConfig) -> Result<Self> {
        let connect_timeout = effective_connect_timeout(config);
        if connect_timeout < config.connect_timeout {
            debug!(
                "Connect timeout lowered from {:?} to {:?} to stay inside request timeouts",
                config.connect_timeout, connect_timeout
            );
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .danger_accept_invalid_certs(!tls_verify)
            .user_agent(concat!("couchbase-cluster-admin/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            default_timeout: config.default_timeout,
            connect_timeout,
            retry_policy: config.retry_policy.clone(),
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Connect timeout applied by the underlying client
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Whether a read timeout on `request` can be told apart from a stalled
    /// connection, and so may be retried
    fn may_retry(&self, request: &Request) -> bool {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        request.retryable && self.connect_timeout <= connect_budget(timeout)
    }

    /// Issue the request, retrying read timeouts when the request allows it
    pub async fn execute(
        &self,
        request: &Request,
        credentials: Option<&Credentials>,
    ) -> Result<Response> {
        if !self.may_retry(request) {
            return self.send_once(request, credentials, 1).await;
        }

        self.retry_policy
            .execute(
                |e: &ClusterError| matches!(e, ClusterError::Http(err) if is_read_timeout(err)),
                |attempt| self.send_once(request, credentials, attempt),
            )
            .await
    }

    async fn send_once(
        &self,
        request: &Request,
        credentials: Option<&Credentials>,
        attempt: u32,
    ) -> Result<Response> {
        debug!(
            "{} {} (attempt {})",
            request.method, request.url, attempt
        );

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout.unwrap_or(self.default_timeout));

        if let Some(credentials) = credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            Body::Empty => builder,
            Body::Form(encoded) => builder
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(encoded.clone()),
            Body::Json(value) => builder.json(value),
            Body::Text(text) => builder.body(text.clone()),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        trace!("Response status: {} ({} bytes)", status, body.len());

        Ok(Response::new(status, body))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn url() -> Url {
        Url::parse("http://127.0.0.1:8091/pools/default").unwrap()
    }

    #[test]
    fn test_idempotent_methods_retry_by_default() {
        assert!(Request::get(url()).retryable);
        assert!(Request::put(url()).retryable);
        assert!(Request::delete(url()).retryable);
        assert!(!Request::post(url()).retryable);
        assert!(Request::post(url()).retryable(true).retryable);
    }

    #[test]
    fn test_fresh_headers_per_request() {
        let first = Request::get(url()).header("X-Test", "1");
        let second = Request::get(url());
        assert_eq!(first.headers.len(), 1);
        assert!(second.headers.is_empty());
    }

    #[test]
    fn test_form_body_encoding() {
        let mut data = BTreeMap::new();
        data.insert("hostname", "node 1");
        data.insert("port", "SAME");
        assert_eq!(
            Body::form(&data).unwrap(),
            Body::Form("hostname=node+1&port=SAME".to_string())
        );

        let pairs = [("services", "kv,index")];
        assert_eq!(
            Body::form(&pairs[..]).unwrap(),
            Body::Form("services=kv%2Cindex".to_string())
        );
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::new(StatusCode::OK, r#"{"status":"none"}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["status"], "none");
        assert_eq!(response.bytes().as_ref(), br#"{"status":"none"}"#);
        assert!(response.is_success_in(&[StatusCode::OK]));

        let err = Response::new(StatusCode::BAD_REQUEST, "bad")
            .ensure(&[StatusCode::OK, StatusCode::ACCEPTED], |_, body| {
                ClusterError::BucketCreation(body)
            })
            .unwrap_err();
        assert_eq!(err.response_body(), Some("bad"));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials::new("admin", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    fn transport_config(default_ms: u64, long_ms: u64, connect_ms: u64) -> TransportConfig {
        TransportConfig {
            default_timeout: Duration::from_millis(default_ms),
            long_timeout: Duration::from_millis(long_ms),
            connect_timeout: Duration::from_millis(connect_ms),
            retry_policy: RetryPolicy::default(),
        }
    }

    #[test]
    fn test_connect_timeout_stays_inside_request_timeouts() {
        let transport = HttpTransport::new(true, &TransportConfig::default()).unwrap();
        assert_eq!(transport.connect_timeout(), Duration::from_secs(9));
        assert_eq!(transport.retry_policy(), &RetryPolicy::default());

        let transport = HttpTransport::new(true, &transport_config(300, 58_000, 2_000)).unwrap();
        assert_eq!(transport.connect_timeout(), Duration::from_millis(270));

        let transport = HttpTransport::new(true, &transport_config(10_000, 58_000, 1_000)).unwrap();
        assert_eq!(transport.connect_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_needs_room_above_connect_timeout() {
        let transport = HttpTransport::new(true, &transport_config(10_000, 58_000, 10_000)).unwrap();

        assert!(transport.may_retry(&Request::get(url())));
        assert!(transport.may_retry(&Request::post(url()).timeout(Duration::from_secs(58)).retryable(true)));
        assert!(!transport.may_retry(&Request::post(url())));

        // A shorter per-request timeout could expire while still connecting
        assert!(!transport.may_retry(&Request::get(url()).timeout(Duration::from_secs(5))));
    }
}
