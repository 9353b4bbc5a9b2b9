//! Bootstrap a fresh single-node cluster
//!
//! Reads the connection settings from `COUCHBASE_ADMIN_*` environment
//! variables, then provisions services, quotas, credentials and a sample
//! bucket. Point it at a node that has not been set up yet:
//!
//! ```text
//! COUCHBASE_ADMIN_SERVICES=kv,index,n1ql \
//! COUCHBASE_ADMIN_USERNAME=Administrator COUCHBASE_ADMIN_PASSWORD=password \
//!     cargo run --example bootstrap_cluster
//! ```

use anyhow::Context;
use couchbase_cluster_admin::{
    Cluster, ConnectionConfig, DEFAULT_REBALANCE_CHECKS, DEFAULT_REBALANCE_INTERVAL, QuotaValue,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("couchbase_cluster_admin=debug")),
        )
        .init();

    println!("=== Couchbase Cluster Bootstrap ===\n");

    let mut config = ConnectionConfig::from_env().context("reading COUCHBASE_ADMIN_* settings")?;
    if config.cluster_name.is_empty() {
        config.cluster_name = "example".to_string();
    }
    let username = config.username.clone().context("COUCHBASE_ADMIN_USERNAME is not set")?;
    let password = config.password.clone().context("COUCHBASE_ADMIN_PASSWORD is not set")?;
    let cluster_name = config.cluster_name.clone();

    let mut cluster = Cluster::connect(config).await?;
    println!("Connected to {}", cluster.base_url());

    // 1. Services and memory
    cluster.enable_services().await?;
    println!("✓ Enabled services: {}", cluster.services().join(", "));

    let node = cluster.node_info().await?;
    let total_mb = node["memoryTotal"].as_u64().map(|bytes| bytes / 1024 / 1024);
    let quotas: Vec<(&str, QuotaValue)> = cluster
        .services()
        .iter()
        .filter_map(|service| match service.as_str() {
            "kv" => Some(("kv", QuotaValue::Ratio(0.4))),
            "index" => Some(("index", QuotaValue::Megabytes(512))),
            _ => None,
        })
        .collect();
    cluster.set_memory_quotas_by_service_name(quotas, total_mb).await?;
    println!("✓ Memory quotas set (node has {total_mb:?} MB)");

    // 2. Credentials and name
    cluster
        .set_authentication(Some(&username), Some(&password))
        .await?;
    cluster.set_cluster_name(&cluster_name).await?;
    cluster.set_stats(false).await?;
    println!("✓ Cluster '{}' secured", cluster.cluster_name());

    // 3. A bucket with one scope and collection
    cluster
        .create_bucket(&json!({
            "name": "inventory",
            "bucketType": "couchbase",
            "ramQuota": 256,
        }))
        .await?;
    cluster
        .create_scope("inventory", &json!({"name": "warehouse"}))
        .await?;
    cluster
        .create_collection("inventory", "warehouse", &json!({"name": "items"}))
        .await?;
    println!("✓ Created inventory.warehouse.items");

    // 4. Settle
    cluster.rebalance(None, &[]).await?;
    cluster
        .wait_for_rebalance(DEFAULT_REBALANCE_CHECKS, DEFAULT_REBALANCE_INTERVAL)
        .await?;
    println!("✓ Rebalanced: {:?}", cluster.known_nodes().await?);

    cluster.close().await?;
    Ok(())
}
