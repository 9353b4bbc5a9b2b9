//! Error types for cluster administration

use reqwest::StatusCode;
use thiserror::Error;

use crate::tunnel::TunnelError;

#[derive(Debug, Error)]
pub enum ClusterError {
    // Client-side validation, raised before any request is sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown service name: {0}")]
    UnknownService(String),

    #[error("Service has no memory quota setting: {0}")]
    UnsupportedService(String),

    #[error("{0} settings must be specified")]
    EmptySettings(&'static str),

    // Transport errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Cannot build URL from base {0}")]
    NotABaseUrl(String),

    #[error("Form encoding failed: {0}")]
    FormEncoding(#[from] serde_urlencoded::ser::Error),

    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    // Endpoint-specific failures, each carrying the response body
    #[error("Failed to set cluster name: {0}")]
    SetClusterName(String),

    #[error("Failed to set memory quota: {0}")]
    SetMemoryQuota(String),

    #[error("Failed to set authentication: {0}")]
    SetAuthentication(String),

    #[error("Failed to rename node: {0}")]
    NodeRename(String),

    #[error("Failed to join cluster: {0}")]
    ClusterJoin(String),

    #[error("Cannot add node to a cluster that is not provisioned: {0}")]
    AddToNotProvisionedNode(String),

    #[error("Cluster controller could not connect to the joining node: {0}")]
    ConnectToControllerOnJoin(String),

    #[error("Rebalance failed: {0}")]
    Rebalance(String),

    #[error("Failed to create bucket: {0}")]
    BucketCreation(String),

    #[error("Failed to create scope: {0}")]
    ScopeCreation(String),

    #[error("Failed to create collection: {0}")]
    CollectionCreation(String),

    #[error("Failed to create user: {0}")]
    UserCreation(String),

    #[error("Failed to create backup plan: {0}")]
    BackupPlanCreation(String),

    #[error("Failed to create backup repository: {0}")]
    BackupRepositoryCreation(String),

    #[error("Failed to import backup repository: {0}")]
    ImportBackup(String),

    #[error("Failed to restore backup: {0}")]
    Restore(String),

    #[error("Failed to set GSI settings: {0}")]
    SetGsiSettings(String),

    #[error("Failed to set alternate address: {0}")]
    SetAlternateAddress(String),

    #[error("Failed to delete alternate address: {0}")]
    DeleteAlternateAddress(String),

    #[error("Failed to set audit settings: {0}")]
    SetAuditSettings(String),

    #[error("Failed to start logs collection: {0}")]
    LogsCollection(String),

    // Polling and projections
    #[error("Rebalance did not complete after {attempts} checks")]
    RebalanceTimeout { attempts: u32 },

    #[error("Metric series not populated yet: {metric}")]
    MetricNotPopulated { metric: String },

    #[error("Missing field in response: {field}")]
    MissingField { field: &'static str },

    #[error("Failed to {operation} ({status}): {body}")]
    OperationFailed {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl ClusterError {
    /// Create a generic failure for an endpoint without a dedicated kind
    pub fn operation_failed(
        operation: &'static str,
        status: StatusCode,
        body: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            operation,
            status,
            body: body.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// True for errors raised locally before any request was sent
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::UnknownService(_)
                | Self::UnsupportedService(_)
                | Self::EmptySettings(_)
        )
    }

    /// True when the underlying transport gave up waiting for a response
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Response body attached to an HTTP-level failure, if any
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::SetClusterName(body)
            | Self::SetMemoryQuota(body)
            | Self::SetAuthentication(body)
            | Self::NodeRename(body)
            | Self::ClusterJoin(body)
            | Self::AddToNotProvisionedNode(body)
            | Self::ConnectToControllerOnJoin(body)
            | Self::Rebalance(body)
            | Self::BucketCreation(body)
            | Self::ScopeCreation(body)
            | Self::CollectionCreation(body)
            | Self::UserCreation(body)
            | Self::BackupPlanCreation(body)
            | Self::BackupRepositoryCreation(body)
            | Self::ImportBackup(body)
            | Self::Restore(body)
            | Self::SetGsiSettings(body)
            | Self::SetAlternateAddress(body)
            | Self::DeleteAlternateAddress(body)
            | Self::SetAuditSettings(body)
            | Self::LogsCollection(body)
            | Self::OperationFailed { body, .. } => Some(body),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
