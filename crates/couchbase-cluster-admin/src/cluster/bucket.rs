//! Buckets, scopes, collections and bucket-level tweaks

use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

use super::{Cluster, OK, OK_OR_ACCEPTED, settings_form};
use crate::error::{ClusterError, Result};
use crate::transport::{Body, Request};

impl Cluster {
    pub async fn buckets(&self) -> Result<Value> {
        self.get_json(&["pools", "default", "buckets"], "get buckets")
            .await
    }

    /// Create a bucket; creation completes asynchronously on the server
    pub async fn create_bucket<T: Serialize + ?Sized>(&self, bucket_config: &T) -> Result<()> {
        let url = self.endpoint(&["pools", "default", "buckets"])?;
        let request = Request::post(url)
            .body(settings_form(bucket_config)?)
            .timeout(self.config.transport.long_timeout);

        self.send(request)
            .await?
            .ensure(OK_OR_ACCEPTED, |_, body| ClusterError::BucketCreation(body))?;
        Ok(())
    }

    pub async fn get_scopes(&self, bucket_name: &str) -> Result<Value> {
        self.get_json(
            &["pools", "default", "buckets", bucket_name, "scopes"],
            "get scopes",
        )
        .await
    }

    pub async fn create_scope<T: Serialize + ?Sized>(&self, bucket_name: &str, scope_config: &T) -> Result<()> {
        self.post(
            &["pools", "default", "buckets", bucket_name, "scopes"],
            settings_form(scope_config)?,
            OK_OR_ACCEPTED,
            |_, body| ClusterError::ScopeCreation(body),
        )
        .await?;
        Ok(())
    }

    pub async fn create_collection<T: Serialize + ?Sized>(
        &self,
        bucket_name: &str,
        scope_name: &str,
        collection_config: &T,
    ) -> Result<()> {
        self.post(
            &[
                "pools",
                "default",
                "buckets",
                bucket_name,
                "scopes",
                scope_name,
                "collections",
            ],
            settings_form(collection_config)?,
            OK_OR_ACCEPTED,
            |_, body| ClusterError::CollectionCreation(body),
        )
        .await?;
        Ok(())
    }

    /// Evaluate an Erlang expression on the node and return its output
    pub async fn diag_eval(&self, expression: &str) -> Result<String> {
        let response = self
            .post(
                &["diag", "eval"],
                Body::Text(expression.to_string()),
                OK,
                |status, body| ClusterError::operation_failed("eval", status, body),
            )
            .await?;
        Ok(response.text())
    }

    /// Set an `extra_config_string` property on a bucket through diag/eval
    pub async fn set_bucket_prop(&self, bucket: &str, prop: &str, value: impl Display) -> Result<String> {
        self.diag_eval(&bucket_prop_expression(bucket, prop, value))
            .await
    }
}

fn bucket_prop_expression(bucket: &str, prop: &str, value: impl Display) -> String {
    format!(r#"ns_bucket:update_bucket_props("{bucket}", [{{extra_config_string, "{prop}={value}"}}])"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_prop_expression() {
        assert_eq!(
            bucket_prop_expression("travel-sample", "max_num_shards", 4),
            r#"ns_bucket:update_bucket_props("travel-sample", [{extra_config_string, "max_num_shards=4"}])"#
        );
    }
}
