//! # couchbase-cluster-admin
//!
//! Administer a Couchbase Server cluster over its HTTP REST control-plane
//! API: provision services and memory quotas, set credentials, join nodes
//! and rebalance, manage buckets, scopes, collections and users, configure
//! XDCR, and drive the backup service.
//!
//! Every [`Cluster`] method is one REST call. The response status is mapped
//! to a typed [`ClusterError`], and JSON responses are returned as
//! [`serde_json::Value`]. Nothing is cached: each call reads the cluster's
//! current state.
//!
//! ## Bootstrapping a node
//!
//! ```rust,no_run
//! use couchbase_cluster_admin::{Cluster, ConnectionConfig, QuotaValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("prod", ["kv", "index", "n1ql"]);
//!     let mut cluster = Cluster::new(config)?;
//!
//!     cluster.enable_services().await?;
//!     cluster
//!         .set_memory_quotas_by_service_name(
//!             [("kv", QuotaValue::Ratio(0.5)), ("index", QuotaValue::Megabytes(512))],
//!             Some(8192),
//!         )
//!         .await?;
//!     cluster.set_authentication(Some("Administrator"), Some("password")).await?;
//!     cluster.set_cluster_name("prod").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Retries
//!
//! Read timeouts on GET, PUT and DELETE calls, and on the cluster join, are
//! retried up to three attempts one second apart (see [`RetryPolicy`]). HTTP
//! error responses and connection failures are reported straight away.
//!
//! ## Tunnels
//!
//! [`Cluster::connect`] sets up an `ssh -L` port-forward first when the
//! configuration carries a [`TunnelConfig`]. The forward is stopped by
//! [`Cluster::close`], or killed when the client is dropped.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: one `debug` per request attempt,
//! `warn` for retried timeouts and insecure joins, `info` for tunnel and
//! credential changes. Install a subscriber to see them.

pub mod cluster;
pub mod config;
pub mod error;
pub mod quota;
pub mod retry;
pub mod transport;
pub mod tunnel;

pub use cluster::{
    Cluster, DEFAULT_REBALANCE_CHECKS, DEFAULT_REBALANCE_INTERVAL, RepositoryState,
    XDCR_CHANGES_LEFT_METRIC, settings_form,
};
pub use config::{
    ConnectionConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SECURE_PORT, Protocol, TransportConfig,
    TunnelConfig,
};
pub use error::{ClusterError, Result};
pub use quota::QuotaValue;
pub use retry::RetryPolicy;
pub use transport::{Body, Credentials, HttpTransport, Request, Response};
pub use tunnel::{PortForward, SshTunnel, TunnelError};
