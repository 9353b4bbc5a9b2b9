//! Node provisioning: services, quotas, credentials, naming and joining

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{Cluster, OK, settings_form};
use crate::error::{ClusterError, Result};
use crate::quota::{QuotaValue, quotas_by_field, resolve_quotas};
use crate::transport::{Body, Credentials, Request};

/// Body fragment of a join rejected because the target is not provisioned
const NOT_PROVISIONED_MARKER: &str = "Adding nodes to not provisioned";

/// Body fragment of a join rejected because the target was unreachable
const CONNECT_FAILED_MARKER: &str = "Failed to connect to";

impl Cluster {
    /// Provision the configured services on this node
    pub async fn enable_services(&self) -> Result<()> {
        let services = self.config.services.join(",");
        self.post(
            &["node", "controller", "setupServices"],
            Body::form(&[("services", services.as_str())][..])?,
            OK,
            |status, body| ClusterError::operation_failed("enable services", status, body),
        )
        .await?;
        Ok(())
    }

    /// Rename the cluster; the local name follows on success
    pub async fn set_cluster_name(&mut self, cluster_name: &str) -> Result<()> {
        self.post(
            &["pools", "default"],
            Body::form(&[("clusterName", cluster_name)][..])?,
            OK,
            |_, body| ClusterError::SetClusterName(body),
        )
        .await?;

        self.config.cluster_name = cluster_name.to_string();
        Ok(())
    }

    /// Set memory quotas keyed by wire field (`memoryQuota`, `indexMemoryQuota`...).
    ///
    /// Ratios are turned into megabytes of `total_memory_mb`; a ratio without
    /// a total fails before anything is sent.
    pub async fn set_memory_quotas<K, V, I>(&self, quotas: I, total_memory_mb: Option<u64>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QuotaValue>,
    {
        let quotas: BTreeMap<String, QuotaValue> = quotas
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        let megabytes = resolve_quotas(&quotas, total_memory_mb)?;

        self.post(
            &["pools", "default"],
            Body::form(&megabytes)?,
            OK,
            |_, body| ClusterError::SetMemoryQuota(body),
        )
        .await?;
        Ok(())
    }

    /// Set memory quotas keyed by service name (`kv`, `index`, `fts`...)
    pub async fn set_memory_quotas_by_service_name<K, V, I>(
        &self,
        quotas: I,
        total_memory_mb: Option<u64>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<QuotaValue>,
    {
        let quotas: Vec<(K, QuotaValue)> = quotas
            .into_iter()
            .map(|(service, value)| (service, value.into()))
            .collect();
        let by_field = quotas_by_field(quotas.iter().map(|(service, value)| (service.as_ref(), *value)))?;
        self.set_memory_quotas(by_field, total_memory_mb).await
    }

    /// Set the administrator credentials.
    ///
    /// Missing arguments fall back to the stored ones. The new credentials
    /// are used for every later request once the node accepts them.
    pub async fn set_authentication(
        &mut self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        let username = username
            .map(str::to_string)
            .or_else(|| self.config.username.clone())
            .ok_or_else(|| ClusterError::invalid_argument("a username is required"))?;
        let password = password
            .map(str::to_string)
            .or_else(|| self.config.password.clone())
            .ok_or_else(|| ClusterError::invalid_argument("a password is required"))?;

        self.post(
            &["settings", "web"],
            Body::form(&[
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("port", "SAME"),
            ][..])?,
            OK,
            |_, body| ClusterError::SetAuthentication(body),
        )
        .await?;

        info!("Administrator credentials set for {}", username);
        self.config.username = Some(username);
        self.config.password = Some(password);
        Ok(())
    }

    /// Opt in or out of sending usage statistics to Couchbase
    pub async fn set_stats(&self, send_stats: bool) -> Result<()> {
        let send_stats = if send_stats { "true" } else { "false" };
        self.post(
            &["settings", "stats"],
            Body::form(&[("sendStats", send_stats)][..])?,
            OK,
            |status, body| ClusterError::operation_failed("set stats", status, body),
        )
        .await?;
        Ok(())
    }

    /// Set data, index, analytics and eventing storage paths
    pub async fn set_disk_paths<T: Serialize + ?Sized>(&self, disk_paths: &T) -> Result<()> {
        self.post(
            &["nodes", "self", "controller", "settings"],
            settings_form(disk_paths)?,
            OK,
            |status, body| ClusterError::operation_failed("set disk paths", status, body),
        )
        .await?;
        Ok(())
    }

    pub async fn set_memcached_global_options<T: Serialize + ?Sized>(&self, options: &T) -> Result<()> {
        self.post(
            &["pools", "default", "settings", "memcached", "global"],
            settings_form(options)?,
            OK,
            |status, body| {
                ClusterError::operation_failed("set memcached global options", status, body)
            },
        )
        .await?;
        Ok(())
    }

    /// Rename the node this client is connected to.
    ///
    /// With `update_self`, later requests go to `new_hostname`. Leave it off
    /// when the new name is only reachable from inside the cluster network.
    pub async fn rename_node(&mut self, new_hostname: &str, update_self: bool) -> Result<()> {
        self.post(
            &["node", "controller", "rename"],
            Body::form(&[("hostname", new_hostname)][..])?,
            OK,
            |_, body| ClusterError::NodeRename(body),
        )
        .await?;

        if update_self {
            self.set_host(new_hostname);
        }
        Ok(())
    }

    /// Join this node to the cluster that `target_host` belongs to.
    ///
    /// `credentials` are those of the target cluster and default to this
    /// client's own. Insecure joins go over plain HTTP, which Couchbase 7.1
    /// and later refuse.
    pub async fn join_cluster(
        &self,
        target_host: &str,
        target_port: u16,
        credentials: Option<&Credentials>,
        insecure: bool,
    ) -> Result<()> {
        let credentials = match credentials {
            Some(credentials) => credentials.clone(),
            None => self
                .credentials()
                .ok_or_else(|| ClusterError::invalid_argument("credentials are required to join a cluster"))?,
        };

        let target_host = if insecure {
            warn!("Insecure join will be rejected by Couchbase >= 7.1");
            format!("http://{target_host}")
        } else {
            target_host.to_string()
        };

        let target_port = target_port.to_string();
        let services = self.config.services.join(",");
        let body = Body::form(&[
            ("clusterMemberHostIp", target_host.as_str()),
            ("clusterMemberPort", target_port.as_str()),
            ("services", services.as_str()),
            ("user", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ][..])?;

        let url = self.endpoint(&["node", "controller", "doJoinCluster"])?;
        let request = Request::post(url)
            .body(body)
            .timeout(self.config.transport.long_timeout)
            .retryable(true);

        self.send(request)
            .await?
            .ensure(OK, |status, body| {
                if status == reqwest::StatusCode::BAD_REQUEST {
                    if body.contains(NOT_PROVISIONED_MARKER) {
                        return ClusterError::AddToNotProvisionedNode(body);
                    }
                    if body.contains(CONNECT_FAILED_MARKER) {
                        return ClusterError::ConnectToControllerOnJoin(body);
                    }
                }
                ClusterError::ClusterJoin(body)
            })?;
        Ok(())
    }

    /// `/nodes/self` document
    pub async fn node_info(&self) -> Result<Value> {
        self.get_json(&["nodes", "self"], "get node info").await
    }

    /// Erlang node name of this node (`ns_1@host`)
    pub async fn node_name(&self) -> Result<String> {
        string_field(&self.node_info().await?, "otpNode")
    }

    pub async fn node_uuid(&self) -> Result<String> {
        string_field(&self.node_info().await?, "nodeUUID")
    }

    /// Publish an external hostname for clients outside the cluster network
    pub async fn set_node_alternate_address(&self, hostname: &str) -> Result<()> {
        let url = self.endpoint(&["node", "controller", "setupAlternateAddresses", "external"])?;
        self.send(Request::put(url).body(Body::form(&[("hostname", hostname)][..])?))
            .await?
            .ensure(OK, |_, body| ClusterError::SetAlternateAddress(body))?;
        Ok(())
    }

    pub async fn delete_node_alternate_address(&self) -> Result<()> {
        let url = self.endpoint(&["node", "controller", "setupAlternateAddresses", "external"])?;
        self.send(Request::delete(url))
            .await?
            .ensure(OK, |_, body| ClusterError::DeleteAlternateAddress(body))?;
        Ok(())
    }

    pub async fn set_audit_settings<T: Serialize + ?Sized>(&self, settings: &T) -> Result<()> {
        self.post(
            &["settings", "audit"],
            settings_form(settings)?,
            OK,
            |_, body| ClusterError::SetAuditSettings(body),
        )
        .await?;
        Ok(())
    }

    /// Start collecting (and optionally uploading) logs from the given nodes
    pub async fn start_logs_collection<T: Serialize + ?Sized>(&self, options: &T) -> Result<()> {
        self.post(
            &["controller", "startLogsCollection"],
            settings_form(options)?,
            OK,
            |_, body| ClusterError::LogsCollection(body),
        )
        .await?;
        Ok(())
    }
}

pub(super) fn string_field(document: &Value, field: &'static str) -> Result<String> {
    document
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClusterError::missing_field(field))
}
