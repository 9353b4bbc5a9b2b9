//! Integration tests for pool membership and rebalancing

#![allow(clippy::unwrap_used)]

mod common;

use common::{cluster_for, form, request_count};
use couchbase_cluster_admin::ClusterError;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn pool_document() -> serde_json::Value {
    json!({
        "name": "default",
        "nodes": [
            {"otpNode": "ns_1@10.0.0.1", "hostname": "10.0.0.1:8091"},
            {"otpNode": "ns_1@10.0.0.2", "hostname": "10.0.0.2:8091"},
        ],
    })
}

#[tokio::test]
async fn test_known_nodes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pool_document()))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    assert_eq!(
        cluster.known_nodes().await.unwrap(),
        vec!["ns_1@10.0.0.1".to_string(), "ns_1@10.0.0.2".to_string()]
    );
}

#[tokio::test]
async fn test_rebalance_with_explicit_nodes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/rebalance"))
        .and(form([
            ("knownNodes", "node1,node2"),
            ("ejectedNodes", "node3"),
        ]))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let known = vec!["node1".to_string(), "node2".to_string()];
    cluster
        .rebalance(Some(known.as_slice()), &["node3".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rebalance_defaults_to_pool_members() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pool_document()))
        .expect(1)
        .mount(&server)
        .await;

    // No ejectedNodes field when nothing is ejected
    Mock::given(method("POST"))
        .and(path("/controller/rebalance"))
        .and(form([("knownNodes", "ns_1@10.0.0.1,ns_1@10.0.0.2")]))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    cluster.rebalance(None, &[]).await.unwrap();
}

#[tokio::test]
async fn test_rebalance_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/rebalance"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"mismatch": 1})))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let known = vec!["node1".to_string()];
    let err = cluster.rebalance(Some(known.as_slice()), &[]).await.unwrap_err();
    assert!(matches!(err, ClusterError::Rebalance(body) if body.contains("mismatch")));
}

#[tokio::test]
async fn test_rebalance_is_done() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "none"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "running",
            "ns_1@10.0.0.1": {"progress": 0.42},
        })))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    assert!(cluster.rebalance_is_done().await.unwrap());
    assert!(!cluster.rebalance_is_done().await.unwrap());
}

#[tokio::test]
async fn test_rebalance_without_status_is_not_done() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    assert!(!cluster.rebalance_is_done().await.unwrap());
}

#[tokio::test]
async fn test_wait_for_rebalance_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let err = cluster
        .wait_for_rebalance(3, Duration::from_millis(5))
        .await
        .unwrap_err();

    assert!(matches!(err, ClusterError::RebalanceTimeout { attempts: 3 }));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_wait_for_rebalance_completes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "none"})))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    cluster
        .wait_for_rebalance(10, Duration::from_millis(5))
        .await
        .unwrap();
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_wait_for_rebalance_propagates_http_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let err = cluster
        .wait_for_rebalance(5, Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::OperationFailed { .. }));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_wait_for_rebalance_sleeps_between_checks_only() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/rebalanceProgress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let interval = Duration::from_millis(300);

    let started = Instant::now();
    let err = cluster.wait_for_rebalance(2, interval).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ClusterError::RebalanceTimeout { attempts: 2 }));
    assert_eq!(request_count(&server).await, 2);
    // One pause between the two checks, none after the last
    assert!(elapsed >= interval, "took {elapsed:?}");
    assert!(elapsed < interval * 2, "took {elapsed:?}");
}
