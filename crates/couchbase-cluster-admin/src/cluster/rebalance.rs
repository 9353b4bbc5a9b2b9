//! Pool membership and rebalancing

use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::{Cluster, OK, node::string_field};
use crate::error::{ClusterError, Result};
use crate::transport::{Body, Request};

/// Status reported by `/pools/default/rebalanceProgress` when idle
const REBALANCE_IDLE_STATUS: &str = "none";

/// Default number of progress checks in [`Cluster::wait_for_rebalance`]
pub const DEFAULT_REBALANCE_CHECKS: u32 = 60;

/// Default pause between progress checks
pub const DEFAULT_REBALANCE_INTERVAL: Duration = Duration::from_secs(1);

impl Cluster {
    /// `/pools/default` document
    pub async fn pool_info(&self) -> Result<Value> {
        self.get_json(&["pools", "default"], "get pool info").await
    }

    /// Erlang names of all nodes in the pool
    pub async fn known_nodes(&self) -> Result<Vec<String>> {
        let pool = self.pool_info().await?;
        let nodes = pool
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| ClusterError::missing_field("nodes"))?;

        nodes.iter().map(|node| string_field(node, "otpNode")).collect()
    }

    /// Start a rebalance.
    ///
    /// `known_nodes` defaults to the pool's current members. Empty lists are
    /// left out of the request.
    pub async fn rebalance(&self, known_nodes: Option<&[String]>, ejected_nodes: &[String]) -> Result<()> {
        let known_nodes = match known_nodes {
            Some(nodes) => nodes.to_vec(),
            None => self.known_nodes().await?,
        };

        let mut data = Vec::new();
        if !known_nodes.is_empty() {
            data.push(("knownNodes", known_nodes.join(",")));
        }
        if !ejected_nodes.is_empty() {
            data.push(("ejectedNodes", ejected_nodes.join(",")));
        }

        let url = self.endpoint(&["controller", "rebalance"])?;
        let request = Request::post(url)
            .body(Body::form(&data[..])?)
            .timeout(self.config.transport.long_timeout);

        self.send(request)
            .await?
            .ensure(OK, |_, body| ClusterError::Rebalance(body))?;
        Ok(())
    }

    pub async fn rebalance_progress(&self) -> Result<Value> {
        self.get_json(&["pools", "default", "rebalanceProgress"], "get rebalance progress")
            .await
    }

    /// True once no rebalance is running
    pub async fn rebalance_is_done(&self) -> Result<bool> {
        let progress = self.rebalance_progress().await?;
        Ok(progress.get("status").and_then(Value::as_str) == Some(REBALANCE_IDLE_STATUS))
    }

    /// Poll rebalance progress every `interval`, at most `max_checks` times
    pub async fn wait_for_rebalance(&self, max_checks: u32, interval: Duration) -> Result<()> {
        for check in 1..=max_checks {
            if self.rebalance_is_done().await? {
                debug!("Rebalance done after {} checks", check);
                return Ok(());
            }
            if check < max_checks {
                sleep(interval).await;
            }
        }

        Err(ClusterError::RebalanceTimeout {
            attempts: max_checks,
        })
    }
}
