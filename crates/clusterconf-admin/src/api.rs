//! Admin API seam
//!
//! [`AdminApi`] is the only way the reconciler talks to the control plane.
//! The HTTP client implements it for real clusters; tests substitute an
//! in-memory fake.

use crate::config::RetryPolicy;
use crate::error::AdminError;
use crate::retry::with_retry;
use async_trait::async_trait;
use clusterconf_core::codec;
use clusterconf_core::{ClusterSnapshot, NodeId, NodeStatus, Patch, PropertyDefinition, SchemaCatalog, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `GET /v1/cluster_config/schema` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    /// Every property the control plane knows
    pub properties: Vec<PropertyDefinition>,
}

/// `GET /v1/cluster_config` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigResponse {
    /// Version the values were read at
    pub config_version: SchemaVersion,
    /// Explicit overrides in wire form
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// `PUT /v1/cluster_config` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    /// Properties to assign
    #[serde(default)]
    pub upsert: BTreeMap<String, serde_json::Value>,
    /// Properties to reset to their default
    #[serde(default)]
    pub remove: Vec<String>,
}

impl From<&Patch> for PatchRequest {
    fn from(patch: &Patch) -> Self {
        Self {
            upsert: patch
                .upserts()
                .iter()
                .map(|(name, value)| (name.clone(), codec::to_json(value)))
                .collect(),
            remove: patch.removals().iter().cloned().collect(),
        }
    }
}

/// How a patch should be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Validate and commit
    #[default]
    Commit,
    /// Validate only; nothing is committed
    DryRun,
    /// Commit without the control plane's value validation
    Force,
}

impl WriteMode {
    /// Query string appended to the patch URL
    #[must_use]
    pub fn query(self) -> &'static str {
        match self {
            Self::Commit => "",
            Self::DryRun => "?dry_run=true",
            Self::Force => "?force=true",
        }
    }
}

/// Successful patch response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchAccepted {
    /// Version assigned to the new configuration
    pub config_version: SchemaVersion,
}

/// Validation rejection body (HTTP 400)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRejected {
    /// Reason per offending property
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

/// What the control plane did with a patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Patch committed (or, for a dry run, would be)
    Accepted {
        /// Resulting configuration version
        config_version: SchemaVersion,
    },
    /// Patch refused as a whole; nothing was applied
    Rejected {
        /// Reason per offending property
        errors: BTreeMap<String, String>,
    },
}

/// `GET /v1/brokers` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberResponse {
    /// Node identifier
    pub node_id: NodeId,
}

/// Control-plane operations used by the reconciler
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Fetch every property definition
    async fn schema(&self) -> Result<Vec<PropertyDefinition>, AdminError>;

    /// Fetch current overrides and their version
    async fn current_config(&self) -> Result<ConfigResponse, AdminError>;

    /// Submit one atomic patch
    async fn patch_config(&self, request: &PatchRequest, mode: WriteMode) -> Result<PatchOutcome, AdminError>;

    /// List cluster members
    async fn members(&self) -> Result<Vec<NodeId>, AdminError>;

    /// Fetch one node's configuration status
    async fn node_status(&self, node: NodeId) -> Result<NodeStatus, AdminError>;
}

/// Fetch and index the schema
///
/// # Errors
/// Returns [`AdminError::SchemaUnavailable`] if the schema cannot be fetched
/// after retries, or [`AdminError::Schema`] if it is inconsistent.
pub async fn fetch_catalog(api: &dyn AdminApi, retry: &RetryPolicy) -> Result<SchemaCatalog, AdminError> {
    let definitions = with_retry(retry, "fetch schema", || api.schema())
        .await
        .map_err(|e| AdminError::SchemaUnavailable(e.to_string()))?;
    tracing::debug!(properties = definitions.len(), "fetched schema");
    Ok(SchemaCatalog::new(definitions)?)
}

/// Fetch the current configuration and decode it against `catalog`
///
/// Values the catalog cannot decode, and properties it does not know, are
/// kept untyped so a later patch never drops them.
///
/// # Errors
/// Returns the admin error once retries are exhausted.
pub async fn fetch_snapshot(
    api: &dyn AdminApi,
    catalog: &SchemaCatalog,
    retry: &RetryPolicy,
) -> Result<ClusterSnapshot, AdminError> {
    let response = with_retry(retry, "fetch configuration", || api.current_config()).await?;

    let mut properties = BTreeMap::new();
    for (name, raw) in &response.properties {
        let Some(def) = catalog.get(name) else {
            tracing::debug!(property = %name, "override not in schema, keeping as-is");
            properties.insert(name.clone(), codec::decode_untyped(raw));
            continue;
        };
        let value = codec::decode_wire(raw, def).unwrap_or_else(|e| {
            tracing::warn!(property = %name, error = %e, "stored value does not match schema");
            codec::decode_untyped(raw)
        });
        properties.insert(def.name.clone(), value);
    }

    tracing::debug!(
        version = %response.config_version,
        overrides = properties.len(),
        "fetched configuration"
    );
    Ok(ClusterSnapshot::new(properties, response.config_version))
}
