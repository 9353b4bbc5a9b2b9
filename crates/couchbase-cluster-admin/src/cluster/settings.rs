//! Cluster-wide service settings

use serde::Serialize;
use serde_json::Value;

use super::{Cluster, OK, settings_form};
use crate::error::{ClusterError, Result};

impl Cluster {
    pub async fn update_index_settings<T: Serialize + ?Sized>(&self, settings: &T) -> Result<()> {
        self.post(
            &["settings", "indexes"],
            settings_form(settings)?,
            OK,
            |status, body| ClusterError::operation_failed("update index settings", status, body),
        )
        .await?;
        Ok(())
    }

    /// Update GSI settings and return the settings now in effect
    pub async fn set_gsi_settings<T: Serialize + ?Sized>(&self, gsi_settings: &T) -> Result<Value> {
        self.post(
            &["settings", "indexes"],
            settings_form(gsi_settings)?,
            OK,
            |_, body| ClusterError::SetGsiSettings(body),
        )
        .await?
        .json()
    }

    pub async fn set_autofailover<T: Serialize + ?Sized>(&self, settings: &T) -> Result<()> {
        self.post(
            &["settings", "autoFailover"],
            settings_form(settings)?,
            OK,
            |status, body| {
                ClusterError::operation_failed("set auto failover settings", status, body)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn get_index_status(&self) -> Result<Value> {
        self.get_json(&["indexStatus"], "get index status").await
    }
}
