//! Shared helpers for integration tests against a wiremock node

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use couchbase_cluster_admin::{Cluster, ConnectionConfig, Protocol, RetryPolicy, TransportConfig};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::{Match, MockServer, Request};

/// Matches a form-urlencoded body against exact key/value pairs, in any order
pub struct FormParams(BTreeMap<String, String>);

impl Match for FormParams {
    fn matches(&self, request: &Request) -> bool {
        let received: BTreeMap<String, String> = url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect();
        received == self.0
    }
}

pub fn form<const N: usize>(pairs: [(&str, &str); N]) -> FormParams {
    FormParams(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Connection settings pointing at the mock server
pub fn config_for(server: &MockServer, services: &[&str]) -> ConnectionConfig {
    let addr = server.address();
    ConnectionConfig::new("mycluster", services.iter().copied())
        .with_endpoint(Protocol::Http, addr.ip().to_string(), addr.port())
}

pub fn cluster_for(server: &MockServer, services: &[&str]) -> Cluster {
    Cluster::new(config_for(server, services)).unwrap()
}

/// Short timeouts so timeout and retry tests finish quickly
pub fn fast_transport() -> TransportConfig {
    TransportConfig {
        default_timeout: Duration::from_millis(300),
        long_timeout: Duration::from_millis(300),
        connect_timeout: Duration::from_millis(200),
        retry_policy: RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        },
    }
}

pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}
