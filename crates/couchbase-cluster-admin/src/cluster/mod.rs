//! Cluster administration client
//!
//! [`Cluster`] holds the connection state for one node and exposes one
//! method per admin REST endpoint. Methods are grouped by endpoint family
//! in the submodules; each builds a [`Request`], hands it to the transport
//! with the current credentials, and turns the status code into a result.

mod backup;
mod bucket;
mod node;
mod query;
mod rebalance;
mod settings;
mod user;
mod xdcr;

pub use backup::RepositoryState;
pub use rebalance::{DEFAULT_REBALANCE_CHECKS, DEFAULT_REBALANCE_INTERVAL};
pub use xdcr::XDCR_CHANGES_LEFT_METRIC;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{ClusterError, Result};
use crate::transport::{Body, Credentials, HttpTransport, Request, Response};
use crate::tunnel::{PortForward, SshTunnel};

/// Accepted statuses for ordinary calls
pub(crate) const OK: &[StatusCode] = &[StatusCode::OK];

/// Accepted statuses for asynchronous creation calls
pub(crate) const OK_OR_ACCEPTED: &[StatusCode] = &[StatusCode::OK, StatusCode::ACCEPTED];

/// Client for one Couchbase Server node's admin REST API
#[derive(Debug)]
pub struct Cluster {
    config: ConnectionConfig,
    transport: HttpTransport,
    tunnel: Option<Box<dyn PortForward>>,
}

impl Cluster {
    /// Create a client that talks to the node directly.
    ///
    /// Use [`Cluster::connect`] when the configuration asks for a tunnel.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        if config.tunnel.is_some() {
            return Err(ClusterError::invalid_argument(
                "an ssh tunnel is configured, use Cluster::connect",
            ));
        }
        let transport = HttpTransport::new(config.tls_verify, &config.transport)?;
        Ok(Self {
            config,
            transport,
            tunnel: None,
        })
    }

    /// Create a client, first establishing the configured ssh tunnel
    pub async fn connect(mut config: ConnectionConfig) -> Result<Self> {
        match config.tunnel.take() {
            Some(tunnel_config) => {
                let tunnel = SshTunnel::new(tunnel_config);
                Self::with_port_forward(config, Box::new(tunnel)).await
            }
            None => Self::new(config),
        }
    }

    /// Create a client that reaches the node through `forward`.
    ///
    /// The forward is started here and the client's host and port are
    /// repointed to its local end.
    pub async fn with_port_forward(
        mut config: ConnectionConfig,
        mut forward: Box<dyn PortForward>,
    ) -> Result<Self> {
        config.tunnel = None;
        let transport = HttpTransport::new(config.tls_verify, &config.transport)?;

        let remote = format!("{}:{}", config.host, config.port);
        let local = forward.start().await?;
        config.host = local.ip().to_string();
        config.port = local.port();
        info!("Reaching {} through {}", remote, local);

        Ok(Self {
            config,
            transport,
            tunnel: Some(forward),
        })
    }

    /// Stop the tunnel, if any. Dropping the client also tears it down.
    pub async fn close(mut self) -> Result<()> {
        if let Some(mut tunnel) = self.tunnel.take() {
            tunnel.stop().await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn cluster_name(&self) -> &str {
        &self.config.cluster_name
    }

    pub fn services(&self) -> &[String] {
        &self.config.services
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// `protocol://host:port` of the node currently targeted
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Current credentials, if both username and password are known
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }

    /// Absolute URL for a path given as segments; each segment is
    /// percent-encoded, and an empty last segment yields a trailing slash
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let base = self.base_url();
        let mut url = Url::parse(&base)?;
        url.path_segments_mut()
            .map_err(|()| ClusterError::NotABaseUrl(base.clone()))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// Send a request with the current credentials
    pub(crate) async fn send(&self, request: Request) -> Result<Response> {
        let credentials = self.credentials();
        self.transport.execute(&request, credentials.as_ref()).await
    }

    /// GET a JSON document, failing with a generic error on non-200
    pub(crate) async fn get_json(&self, segments: &[&str], operation: &'static str) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.send(Request::get(url))
            .await?
            .ensure(OK, |status, body| {
                ClusterError::operation_failed(operation, status, body)
            })?
            .json()
    }

    /// POST a body and check the status against `accepted`
    pub(crate) async fn post<F>(
        &self,
        segments: &[&str],
        body: Body,
        accepted: &[StatusCode],
        on_failure: F,
    ) -> Result<Response>
    where
        F: FnOnce(StatusCode, String) -> ClusterError,
    {
        let url = self.endpoint(segments)?;
        self.send(Request::post(url).body(body))
            .await?
            .ensure(accepted, on_failure)
    }

    pub(crate) fn set_host(&mut self, host: impl Into<String>) {
        let host = host.into();
        debug!("Repointing client from {} to {}", self.config.host, host);
        self.config.host = host;
    }
}

/// Form-encode user settings given as a map of scalars.
///
/// Lists become comma-separated values, `null` entries are left out, and
/// nested objects are rejected.
pub fn settings_form<T: Serialize + ?Sized>(settings: &T) -> Result<Body> {
    let value = serde_json::to_value(settings)?;
    let Value::Object(map) = value else {
        return Err(ClusterError::invalid_argument(
            "settings must be a map of names to values",
        ));
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (name, value) in map {
        if let Some(encoded) = form_value(&name, &value)? {
            pairs.push((name, encoded));
        }
    }
    Body::form(&pairs[..])
}

fn form_value(name: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Bool(_) | Value::Number(_) => Ok(item.to_string()),
                    _ => Err(ClusterError::invalid_argument(format!(
                        "list setting {name} may only hold scalars"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(items.join(",")))
        }
        Value::Object(_) => Err(ClusterError::invalid_argument(format!(
            "setting {name} cannot be a nested object"
        ))),
    }
}
