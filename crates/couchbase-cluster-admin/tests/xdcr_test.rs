//! Integration tests for XDCR and the statistics range API

#![allow(clippy::unwrap_used)]

mod common;

use common::{cluster_for, form};
use couchbase_cluster_admin::{ClusterError, XDCR_CHANGES_LEFT_METRIC};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{
    Mock, MockServer, Request, ResponseTemplate,
    matchers::{method, path},
};

#[tokio::test]
async fn test_get_remote_cluster_references() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/remoteClusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "dr", "hostname": "10.1.0.1:8091", "deleted": false},
        ])))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let references = cluster.get_remote_cluster_references().await.unwrap();
    assert_eq!(references[0]["name"], "dr");
}

#[tokio::test]
async fn test_create_remote_cluster_reference() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pools/default/remoteClusters"))
        .and(form([
            ("name", "dr"),
            ("hostname", "10.1.0.1"),
            ("username", "Administrator"),
            ("password", "password"),
        ]))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "dr",
            "uuid": "5f2a",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let reference = cluster
        .create_remote_cluster_reference(&json!({
            "name": "dr",
            "hostname": "10.1.0.1",
            "username": "Administrator",
            "password": "password",
        }))
        .await
        .unwrap();
    assert_eq!(reference["uuid"], "5f2a");
}

#[tokio::test]
async fn test_create_replication() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/createReplication"))
        .and(form([
            ("fromBucket", "travel-sample"),
            ("toCluster", "dr"),
            ("toBucket", "travel-sample"),
            ("replicationType", "continuous"),
        ]))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "5f2a/travel-sample/travel-sample",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let replication = cluster
        .create_replication(&json!({
            "fromBucket": "travel-sample",
            "toCluster": "dr",
            "toBucket": "travel-sample",
            "replicationType": "continuous",
        }))
        .await
        .unwrap();
    assert_eq!(replication["id"], "5f2a/travel-sample/travel-sample");
}

#[tokio::test]
async fn test_create_replication_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/createReplication"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Replication to the same bucket already exists"))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let err = cluster
        .create_replication(&json!({"fromBucket": "travel-sample"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::OperationFailed { operation: "create replication", .. }));
}

#[tokio::test]
async fn test_get_multiple_statistics() {
    let server = MockServer::start().await;

    let queries = json!([{
        "metric": [{"label": "name", "value": "sys_cpu_utilization_rate"}],
        "step": 10,
    }]);

    Mock::given(method("POST"))
        .and(path("/pools/default/stats/range/"))
        .and(wiremock::matchers::body_json(&queries))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "data": [{"values": [[1700000000, "12.5"]]}],
            "errors": [],
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let stats = cluster.get_multiple_statistics(&queries).await.unwrap();
    assert_eq!(stats[0]["data"][0]["values"][0][1], "12.5");
}

#[tokio::test]
async fn test_xdcr_changes_left_total() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pools/default/stats/range/"))
        .and(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            body[0]["metric"][0]["value"] == XDCR_CHANGES_LEFT_METRIC
                && body[0]["metric"][1]["value"] == "travel-sample"
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "data": [{
                "metric": {"nodes": ["10.0.0.1:8091"]},
                "values": [[1700000000, "150"], [1700000010, "42"]],
            }],
            "errors": [],
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let changes_left = cluster
        .get_xdcr_changes_left_total_by_bucket("travel-sample")
        .await
        .unwrap();
    assert!((changes_left - 42.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_xdcr_changes_left_not_populated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pools/default/stats/range/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "data": [],
            "errors": [],
        }])))
        .mount(&server)
        .await;

    let cluster = cluster_for(&server, &["kv"]);
    let err = cluster
        .get_xdcr_changes_left_total_by_bucket("travel-sample")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClusterError::MetricNotPopulated { metric } if metric == XDCR_CHANGES_LEFT_METRIC
    ));
}
