//! Memory quota translation
//!
//! Quotas are given either in megabytes or as a fraction of the node's
//! memory, keyed by wire field (`memoryQuota`) or by service name (`kv`).
//! Everything here is pure: no request is built until the quotas are valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ClusterError, Result};

/// Service name to `/pools/default` quota field.
///
/// `cbbs` (backup) is a real service without a quota setting.
const SERVICE_QUOTA_FIELDS: &[(&str, Option<&str>)] = &[
    ("cbas", Some("cbasMemoryQuota")),
    ("cbbs", None),
    ("eventing", Some("eventingMemoryQuota")),
    ("fts", Some("ftsMemoryQuota")),
    ("index", Some("indexMemoryQuota")),
    ("kv", Some("memoryQuota")),
    ("n1ql", Some("indexMemoryQuota")),
];

/// A quota in megabytes or as a fraction of total memory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuotaValue {
    Megabytes(u64),
    Ratio(f64),
}

impl QuotaValue {
    /// Absolute megabytes; ratios need `total_memory_mb`
    pub fn resolve(self, total_memory_mb: Option<u64>) -> Result<u64> {
        match self {
            Self::Megabytes(mb) => Ok(mb),
            Self::Ratio(ratio) => {
                if !(0.0..=1.0).contains(&ratio) {
                    return Err(ClusterError::invalid_argument(format!(
                        "quota ratio must be within [0, 1], got {ratio}"
                    )));
                }
                let total = total_memory_mb.ok_or_else(|| {
                    ClusterError::invalid_argument("total_memory_mb is required for ratios")
                })?;
                #[allow(clippy::cast_precision_loss)]
                let megabytes = (ratio * total as f64).floor() as u64;
                Ok(megabytes)
            }
        }
    }
}

impl From<u64> for QuotaValue {
    fn from(mb: u64) -> Self {
        Self::Megabytes(mb)
    }
}

impl From<u32> for QuotaValue {
    fn from(mb: u32) -> Self {
        Self::Megabytes(u64::from(mb))
    }
}

impl From<f64> for QuotaValue {
    fn from(ratio: f64) -> Self {
        Self::Ratio(ratio)
    }
}

/// Wire field for a service name
pub fn quota_field(service: &str) -> Result<&'static str> {
    match SERVICE_QUOTA_FIELDS.iter().find(|(name, _)| *name == service) {
        Some((_, Some(field))) => Ok(field),
        Some((_, None)) => Err(ClusterError::UnsupportedService(service.to_string())),
        None => Err(ClusterError::UnknownService(service.to_string())),
    }
}

/// Re-key quotas from service names to wire fields.
///
/// Two services sharing a field (`index` and `n1ql`) must agree on the value.
pub fn quotas_by_field<'a, I>(quotas_by_service: I) -> Result<BTreeMap<String, QuotaValue>>
where
    I: IntoIterator<Item = (&'a str, QuotaValue)>,
{
    let mut quotas = BTreeMap::new();
    for (service, value) in quotas_by_service {
        let field = quota_field(service)?;
        match quotas.insert(field.to_string(), value) {
            Some(previous) if previous != value => {
                return Err(ClusterError::invalid_argument(format!(
                    "conflicting quotas for {field}: {previous:?} and {value:?}"
                )));
            }
            _ => {}
        }
    }
    Ok(quotas)
}

/// Turn every quota into whole megabytes
pub fn resolve_quotas<'a, I>(quotas: I, total_memory_mb: Option<u64>) -> Result<BTreeMap<String, u64>>
where
    I: IntoIterator<Item = (&'a String, &'a QuotaValue)>,
{
    quotas
        .into_iter()
        .map(|(field, value)| Ok((field.clone(), value.resolve(total_memory_mb)?)))
        .collect()
}
