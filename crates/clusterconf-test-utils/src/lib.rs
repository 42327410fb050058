//! Testing utilities for clusterconf workspace
//!
//! Schema fixtures and a scripted in-memory control plane.

#![allow(missing_docs)]

use async_trait::async_trait;
use clusterconf_admin::{AdminApi, AdminError, ConfigResponse, PatchOutcome, PatchRequest, WriteMode};
use clusterconf_core::{NodeId, NodeStatus, PropertyDefinition, SchemaCatalog, SchemaVersion, ValueType, Visibility};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn sample_schema() -> Vec<PropertyDefinition> {
    vec![
        PropertyDefinition::new("retention.ms", ValueType::Duration)
            .with_default(json!(604_800_000))
            .with_range(Some(-1.0), None)
            .with_description("How long to keep log segments")
            .with_alias("log_retention_ms"),
        PropertyDefinition::new("log.segment.bytes", ValueType::Integer)
            .with_default(json!(134_217_728))
            .with_range(Some(1_048_576.0), None)
            .with_description("Size of a single log segment"),
        PropertyDefinition::new("auto_create_topics_enabled", ValueType::Boolean)
            .with_default(json!(false))
            .with_description("Create topics on first use"),
        PropertyDefinition::new(
            "compression.type",
            ValueType::Enum {
                values: ["none", "gzip", "snappy", "lz4", "zstd", "producer"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
        )
        .with_default(json!("producer")),
        PropertyDefinition::new(
            "superusers",
            ValueType::List {
                items: Box::new(ValueType::String),
            },
        )
        .with_default(json!([])),
        PropertyDefinition::new("cloud_storage_secret_key", ValueType::String)
            .nullable()
            .secret(),
        PropertyDefinition::new("cluster_id", ValueType::String).immutable().nullable(),
        PropertyDefinition::new("raft_heartbeat_interval_ms", ValueType::Duration)
            .with_default(json!(150))
            .with_visibility(Visibility::Tunable)
            .restart_required(),
        PropertyDefinition::new("enable_legacy_listener", ValueType::Boolean)
            .with_default(json!(false))
            .with_visibility(Visibility::Deprecated),
    ]
}

pub fn sample_catalog() -> SchemaCatalog {
    SchemaCatalog::new(sample_schema()).unwrap()
}

/// Scripted behavior of one node's status endpoint
#[derive(Debug, Clone)]
pub enum NodeBehavior {
    Report(NodeStatus),
    Fail(String),
    Hang,
}

#[derive(Debug, Default)]
struct FakeState {
    schema: Vec<PropertyDefinition>,
    schema_failure: Option<String>,
    members_failure: Option<String>,
    version: SchemaVersion,
    properties: BTreeMap<String, Value>,
    nodes: BTreeMap<NodeId, NodeBehavior>,
    transient_patch_failures: u32,
    rejection: Option<BTreeMap<String, String>>,
    converge_on_accept: bool,
    patch_attempts: u32,
    patches: Vec<(PatchRequest, WriteMode)>,
}

/// In-memory control plane
#[derive(Debug, Default)]
pub struct FakeAdmin {
    state: Mutex<FakeState>,
}

impl FakeAdmin {
    pub fn new(schema: Vec<PropertyDefinition>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                schema,
                version: SchemaVersion(1),
                ..FakeState::default()
            }),
        }
    }

    pub fn with_config<'a>(self, version: i64, properties: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        {
            let mut state = self.state.lock();
            state.version = SchemaVersion(version);
            state.properties = properties.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        }
        self
    }

    pub fn with_node(self, id: i32, behavior: NodeBehavior) -> Self {
        self.state.lock().nodes.insert(NodeId(id), behavior);
        self
    }

    /// `count` healthy nodes that apply every accepted patch immediately
    pub fn with_converging_nodes(self, count: i32) -> Self {
        {
            let mut state = self.state.lock();
            let version = state.version;
            for id in 1..=count {
                state
                    .nodes
                    .insert(NodeId(id), NodeBehavior::Report(NodeStatus::clean(NodeId(id), version)));
            }
            state.converge_on_accept = true;
        }
        self
    }

    pub fn with_schema_failure(self, reason: &str) -> Self {
        self.state.lock().schema_failure = Some(reason.to_string());
        self
    }

    /// Fail every membership listing with a 503
    pub fn with_members_failure(self, reason: &str) -> Self {
        self.state.lock().members_failure = Some(reason.to_string());
        self
    }

    /// Fail the next `count` patch attempts with a 503
    pub fn with_transient_patch_failures(self, count: u32) -> Self {
        self.state.lock().transient_patch_failures = count;
        self
    }

    pub fn with_rejection<'a>(self, errors: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.state.lock().rejection = Some(
            errors
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn set_node(&self, id: i32, behavior: NodeBehavior) {
        self.state.lock().nodes.insert(NodeId(id), behavior);
    }

    pub fn version(&self) -> SchemaVersion {
        self.state.lock().version
    }

    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.state.lock().properties.clone()
    }

    pub fn patch_attempts(&self) -> u32 {
        self.state.lock().patch_attempts
    }

    /// Patches that reached the control plane logic (after transient failures)
    pub fn patches(&self) -> Vec<(PatchRequest, WriteMode)> {
        self.state.lock().patches.clone()
    }
}

#[async_trait]
impl AdminApi for FakeAdmin {
    async fn schema(&self) -> Result<Vec<PropertyDefinition>, AdminError> {
        let state = self.state.lock();
        match &state.schema_failure {
            Some(reason) => Err(AdminError::Unreachable {
                target: "fake".to_string(),
                reason: reason.clone(),
            }),
            None => Ok(state.schema.clone()),
        }
    }

    async fn current_config(&self) -> Result<ConfigResponse, AdminError> {
        let state = self.state.lock();
        Ok(ConfigResponse {
            config_version: state.version,
            properties: state.properties.clone(),
        })
    }

    async fn patch_config(&self, request: &PatchRequest, mode: WriteMode) -> Result<PatchOutcome, AdminError> {
        let mut state = self.state.lock();
        state.patch_attempts += 1;
        if state.transient_patch_failures > 0 {
            state.transient_patch_failures -= 1;
            return Err(AdminError::Server {
                status: 503,
                message: "leader not available".to_string(),
            });
        }
        state.patches.push((request.clone(), mode));

        if mode != WriteMode::Force {
            if let Some(errors) = &state.rejection {
                return Ok(PatchOutcome::Rejected { errors: errors.clone() });
            }
        }
        if mode == WriteMode::DryRun {
            return Ok(PatchOutcome::Accepted {
                config_version: state.version,
            });
        }

        for name in &request.remove {
            state.properties.remove(name);
        }
        for (name, value) in &request.upsert {
            state.properties.insert(name.clone(), value.clone());
        }
        state.version = SchemaVersion(state.version.0 + 1);
        let version = state.version;
        if state.converge_on_accept {
            for behavior in state.nodes.values_mut() {
                if let NodeBehavior::Report(status) = behavior {
                    if !status.has_divergence() {
                        status.applied_schema_version = version;
                    }
                }
            }
        }
        Ok(PatchOutcome::Accepted { config_version: version })
    }

    async fn members(&self) -> Result<Vec<NodeId>, AdminError> {
        let state = self.state.lock();
        match &state.members_failure {
            Some(reason) => Err(AdminError::Server {
                status: 503,
                message: reason.clone(),
            }),
            None => Ok(state.nodes.keys().copied().collect()),
        }
    }

    async fn node_status(&self, node: NodeId) -> Result<NodeStatus, AdminError> {
        let behavior = self.state.lock().nodes.get(&node).cloned();
        match behavior {
            Some(NodeBehavior::Report(status)) => Ok(status),
            Some(NodeBehavior::Fail(reason)) => Err(AdminError::Unreachable {
                target: format!("node {node}"),
                reason,
            }),
            Some(NodeBehavior::Hang) => std::future::pending().await,
            None => Err(AdminError::Api {
                status: 404,
                message: format!("no such node {node}"),
            }),
        }
    }
}
