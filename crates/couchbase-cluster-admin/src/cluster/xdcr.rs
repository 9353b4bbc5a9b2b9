//! Cross datacenter replication and the statistics range API

use serde::Serialize;
use serde_json::{Value, json};

use super::{Cluster, OK, settings_form};
use crate::error::{ClusterError, Result};
use crate::transport::Body;

/// Mutations still waiting to be replicated, per replication
pub const XDCR_CHANGES_LEFT_METRIC: &str = "xdcr_changes_left_total";

impl Cluster {
    pub async fn get_remote_cluster_references(&self) -> Result<Value> {
        self.get_json(&["pools", "default", "remoteClusters"], "get remote cluster references")
            .await
    }

    /// Register a remote cluster (name, hostname, username, password...)
    pub async fn create_remote_cluster_reference<T: Serialize + ?Sized>(&self, reference: &T) -> Result<Value> {
        self.post(
            &["pools", "default", "remoteClusters"],
            settings_form(reference)?,
            OK,
            |status, body| {
                ClusterError::operation_failed("create remote cluster reference", status, body)
            },
        )
        .await?
        .json()
    }

    /// Start a replication (fromBucket, toCluster, toBucket, replicationType...)
    pub async fn create_replication<T: Serialize + ?Sized>(&self, replication: &T) -> Result<Value> {
        self.post(
            &["controller", "createReplication"],
            settings_form(replication)?,
            OK,
            |status, body| ClusterError::operation_failed("create replication", status, body),
        )
        .await?
        .json()
    }

    /// Run several statistics range queries in one call
    pub async fn get_multiple_statistics(&self, queries: &Value) -> Result<Value> {
        self.post(
            &["pools", "default", "stats", "range", ""],
            Body::Json(queries.clone()),
            OK,
            |status, body| ClusterError::operation_failed("get statistics", status, body),
        )
        .await?
        .json()
    }

    /// Latest total of mutations left to replicate out of `bucket`, summed
    /// over all nodes and replications
    pub async fn get_xdcr_changes_left_total_by_bucket(&self, bucket: &str) -> Result<f64> {
        let response = self
            .get_multiple_statistics(&changes_left_query(bucket))
            .await?;
        latest_value(&response).ok_or_else(|| ClusterError::MetricNotPopulated {
            metric: XDCR_CHANGES_LEFT_METRIC.to_string(),
        })
    }
}

fn changes_left_query(bucket: &str) -> Value {
    json!([{
        "metric": [
            {"label": "name", "value": XDCR_CHANGES_LEFT_METRIC},
            {"label": "sourceBucketName", "value": bucket},
        ],
        "applyFunctions": ["sum"],
        "nodesAggregation": "sum",
        "start": -10,
        "step": 10,
    }])
}

/// Last sample of the first series of the first query.
///
/// Samples are `[timestamp, "value"]` pairs with the value as a string.
fn latest_value(response: &Value) -> Option<f64> {
    let sample = response
        .get(0)?
        .get("data")?
        .get(0)?
        .get("values")?
        .as_array()?
        .last()?;

    match sample.get(1)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
