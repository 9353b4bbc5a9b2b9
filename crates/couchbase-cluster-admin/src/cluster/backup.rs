//! Backup service: plans, repositories, import and restore
//!
//! Requests go through the `/_p/backup` proxy prefix, which routes them to a
//! node running the backup service without needing the backup port.

use serde_json::Value;
use std::fmt;

use super::{Cluster, OK};
use crate::error::{ClusterError, Result};
use crate::transport::{Body, Request};

const BACKUP_API: [&str; 4] = ["_p", "backup", "api", "v1"];

/// Lifecycle state of a backup repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    Active,
    Imported,
    Archived,
}

impl RepositoryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Imported => "imported",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for RepositoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Cluster {
    /// Create or replace a backup plan.
    ///
    /// `plan_settings` is the plan document: description, services and a
    /// list of scheduled tasks.
    pub async fn create_backup_plan(&self, plan_name: &str, plan_settings: &Value) -> Result<()> {
        ensure_settings(plan_settings, "Backup plan")?;
        self.post_backup_json(
            &["plan", plan_name],
            plan_settings,
            ClusterError::BackupPlanCreation,
        )
        .await
    }

    /// Create an active repository (plan, archive location, optional bucket)
    pub async fn create_backup_repository(
        &self,
        repository_name: &str,
        repository_settings: &Value,
    ) -> Result<()> {
        ensure_settings(repository_settings, "Backup repository")?;
        self.post_backup_json(
            &["cluster", "self", "repository", "active", repository_name],
            repository_settings,
            ClusterError::BackupRepositoryCreation,
        )
        .await
    }

    pub async fn get_backup_repository(&self, state: RepositoryState, repository_name: &str) -> Result<Value> {
        self.get_backup_json(
            &["cluster", "self", "repository", state.as_str(), repository_name],
            "get backup repository",
        )
        .await
    }

    /// Backups held by a repository, with per-bucket details
    pub async fn get_backup_info(&self, state: RepositoryState, repository_name: &str) -> Result<Value> {
        self.get_backup_json(
            &["cluster", "self", "repository", state.as_str(), repository_name, "info"],
            "get backup info",
        )
        .await
    }

    pub async fn get_backup_task_history(
        &self,
        state: RepositoryState,
        repository_name: &str,
    ) -> Result<Value> {
        self.get_backup_json(
            &["cluster", "self", "repository", state.as_str(), repository_name, "taskHistory"],
            "get backup task history",
        )
        .await
    }

    /// Import an existing archive as a read-only repository
    pub async fn import_backup(&self, import_settings: &Value) -> Result<()> {
        ensure_settings(import_settings, "Backup import")?;
        self.post_backup_json(
            &["cluster", "self", "repository", "import"],
            import_settings,
            ClusterError::ImportBackup,
        )
        .await
    }

    /// Restore from a repository into the cluster
    pub async fn restore_backup(
        &self,
        state: RepositoryState,
        repository_name: &str,
        restore_settings: &Value,
    ) -> Result<()> {
        ensure_settings(restore_settings, "Restore")?;
        self.post_backup_json(
            &["cluster", "self", "repository", state.as_str(), repository_name, "restore"],
            restore_settings,
            ClusterError::Restore,
        )
        .await
    }

    async fn get_backup_json(&self, path: &[&str], operation: &'static str) -> Result<Value> {
        self.get_json(&backup_segments(path), operation).await
    }

    async fn post_backup_json(
        &self,
        path: &[&str],
        settings: &Value,
        on_failure: fn(String) -> ClusterError,
    ) -> Result<()> {
        let url = self.endpoint(&backup_segments(path))?;
        let request = Request::post(url)
            .body(Body::Json(settings.clone()))
            .timeout(self.config.transport.long_timeout);

        self.send(request)
            .await?
            .ensure(OK, |_, body| on_failure(body))?;
        Ok(())
    }
}

fn backup_segments<'a>(path: &[&'a str]) -> Vec<&'a str> {
    BACKUP_API.iter().copied().chain(path.iter().copied()).collect()
}

fn ensure_settings(settings: &Value, what: &'static str) -> Result<()> {
    let empty = match settings {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    };
    if empty {
        Err(ClusterError::EmptySettings(what))
    } else {
        Ok(())
    }
}
