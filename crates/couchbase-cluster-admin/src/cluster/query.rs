//! Pass-through to the query service

use serde_json::Value;

use super::{Cluster, OK};
use crate::error::{ClusterError, Result};
use crate::transport::{Body, Request};

impl Cluster {
    /// Run a N1QL statement through the admin port's query proxy
    pub async fn query_execute(&self, statement: &str) -> Result<Value> {
        let url = self.endpoint(&["_p", "query", "query", "service"])?;
        let request = Request::post(url)
            .body(Body::form(&[("statement", statement)][..])?)
            .timeout(self.config.transport.long_timeout);

        self.send(request)
            .await?
            .ensure(OK, |status, body| {
                ClusterError::operation_failed("execute query", status, body)
            })?
            .json()
    }
}
