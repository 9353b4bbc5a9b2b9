//! Connection and transport configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClusterError, Result};
use crate::retry::RetryPolicy;

/// Default address of the node being administered
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Plain-text admin REST port
pub const DEFAULT_PORT: u16 = 8091;

/// TLS admin REST port
pub const DEFAULT_SECURE_PORT: u16 = 18091;

/// Scheme used to reach the admin REST API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Admin REST port conventionally used with this scheme
    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => DEFAULT_PORT,
            Self::Https => DEFAULT_SECURE_PORT,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(ClusterError::invalid_argument(format!(
                "unsupported protocol: {other}"
            ))),
        }
    }
}

/// Per-request timeouts and retry behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Timeout for ordinary admin calls
    pub default_timeout: Duration,

    /// Timeout for calls that make the cluster do real work (join, rebalance...)
    pub long_timeout: Duration,

    /// Connection establishment timeout, capped at 90% of the shorter
    /// request timeout
    pub connect_timeout: Duration,

    /// Retry policy for read timeouts
    pub retry_policy: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            long_timeout: Duration::from_secs(58),
            connect_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_timeout: env_secs("COUCHBASE_ADMIN_TIMEOUT").unwrap_or(defaults.default_timeout),
            long_timeout: env_secs("COUCHBASE_ADMIN_LONG_TIMEOUT").unwrap_or(defaults.long_timeout),
            connect_timeout: env_secs("COUCHBASE_ADMIN_CONNECT_TIMEOUT")
                .unwrap_or(defaults.connect_timeout),
            retry_policy: RetryPolicy::from_env(),
        }
    }
}

/// SSH port-forward used when the admin port is not directly reachable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Remote login; `None` lets ssh pick it from its own configuration
    pub ssh_username: Option<String>,

    /// Host to ssh into
    pub remote_host: String,

    /// Admin port on the remote host, as seen from the remote host
    pub remote_port: u16,

    /// Local bind address, defaults to 127.0.0.1
    pub local_host: Option<String>,

    /// Local bind port, a free port is picked when unset
    pub local_port: Option<u16>,

    /// ssh executable
    pub ssh_program: String,

    /// How long to wait for the forward to accept connections
    pub ready_timeout: Duration,
}

impl TunnelConfig {
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            ssh_username: None,
            remote_host: remote_host.into(),
            remote_port,
            local_host: None,
            local_port: None,
            ssh_program: "ssh".to_string(),
            ready_timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.ssh_username = Some(username.into());
        self
    }
}

/// Everything needed to talk to one cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub cluster_name: String,

    /// Services to provision on the node, in order (e.g. `["kv", "index"]`)
    pub services: Vec<String>,

    pub protocol: Protocol,
    pub host: String,
    pub port: u16,

    /// Verify the node's TLS certificate; disable for self-signed lab clusters
    pub tls_verify: bool,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Reach the node through an SSH port-forward
    pub tunnel: Option<TunnelConfig>,

    pub transport: TransportConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            services: vec!["kv".to_string()],
            protocol: Protocol::Http,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls_verify: true,
            username: None,
            password: None,
            tunnel: None,
            transport: TransportConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new<S: Into<String>>(
        cluster_name: impl Into<String>,
        services: impl IntoIterator<Item = S>,
    ) -> Self {
        let services: Vec<String> = services.into_iter().map(Into::into).collect();
        Self {
            cluster_name: cluster_name.into(),
            services: if services.is_empty() {
                vec!["kv".to_string()]
            } else {
                services
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        self.protocol = protocol;
        self.host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    /// Route requests through an SSH tunnel to the configured host and port
    #[must_use]
    pub fn with_ssh_tunnel(mut self, ssh_username: impl Into<String>) -> Self {
        self.tunnel = Some(TunnelConfig::new(self.host.clone(), self.port).with_username(ssh_username));
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// `protocol://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let protocol = match std::env::var("COUCHBASE_ADMIN_PROTOCOL") {
            Ok(value) => value.parse()?,
            Err(_) => Protocol::Http,
        };

        let port = match std::env::var("COUCHBASE_ADMIN_PORT") {
            Ok(value) => value.parse().map_err(|_| {
                ClusterError::invalid_argument(format!("invalid COUCHBASE_ADMIN_PORT: {value}"))
            })?,
            Err(_) => protocol.default_port(),
        };

        let services = std::env::var("COUCHBASE_ADMIN_SERVICES")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let host = std::env::var("COUCHBASE_ADMIN_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let tunnel = std::env::var("COUCHBASE_ADMIN_SSH_USERNAME")
            .ok()
            .map(|user| TunnelConfig::new(host.clone(), port).with_username(user));

        let mut config = Self::new(
            std::env::var("COUCHBASE_ADMIN_CLUSTER_NAME").unwrap_or_default(),
            services,
        );
        config.protocol = protocol;
        config.host = host;
        config.port = port;
        config.tls_verify = std::env::var("COUCHBASE_ADMIN_TLS_VERIFY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);
        config.username = std::env::var("COUCHBASE_ADMIN_USERNAME").ok();
        config.password = std::env::var("COUCHBASE_ADMIN_PASSWORD").ok();
        config.tunnel = tunnel;
        config.transport = TransportConfig::from_env();

        Ok(config)
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| parse_secs(&s))
}

/// Seconds as a possibly fractional number; negative, non-finite and
/// out-of-range values are ignored
fn parse_secs(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
