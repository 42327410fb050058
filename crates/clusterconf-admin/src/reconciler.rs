//! Convergence tracking
//!
//! After a patch is accepted every member applies it on its own schedule.
//! [`StatusReconciler`] polls each member concurrently and classifies it
//! against the target version. A single slow or dead node never stalls the
//! others: each request has its own timeout, and the poll as a whole obeys a
//! deadline and a cancellation token. Whatever has not answered by then is
//! reported as unreachable.

use crate::api::AdminApi;
use crate::config::RetryPolicy;
use crate::error::AdminError;
use crate::retry::with_retry;
use chrono::{DateTime, Utc};
use clusterconf_core::{NodeId, NodeStatus, SchemaVersion};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Classification of one member against the target version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Applied the target (or later) with nothing rejected
    Converged(NodeStatus),
    /// Still behind the target
    Pending(NodeStatus),
    /// Rejected or did not recognize properties; waiting will not help
    Diverged(NodeStatus),
    /// No status within the time allowed
    Unreachable {
        /// Why no status was obtained
        reason: String,
    },
}

impl NodeState {
    /// Classify a reported status
    #[must_use]
    pub fn classify(status: NodeStatus, target: SchemaVersion) -> Self {
        if status.has_divergence() {
            Self::Diverged(status)
        } else if status.applied_schema_version >= target {
            Self::Converged(status)
        } else {
            Self::Pending(status)
        }
    }

    /// Reported status, if the node answered
    #[must_use]
    pub fn status(&self) -> Option<&NodeStatus> {
        match self {
            Self::Converged(s) | Self::Pending(s) | Self::Diverged(s) => Some(s),
            Self::Unreachable { .. } => None,
        }
    }

    /// Short label for rendering
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Converged(_) => "converged",
            Self::Pending(_) => "pending",
            Self::Diverged(_) => "diverged",
            Self::Unreachable { .. } => "unreachable",
        }
    }
}

/// A node that rejected part of the configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("node {node_id} diverged: invalid [{}], unknown [{}]", join(.invalid), join(.unknown))]
pub struct NodeDivergence {
    /// Diverged node
    pub node_id: NodeId,
    /// Properties whose value the node rejected
    pub invalid: BTreeSet<String>,
    /// Properties the node does not know
    pub unknown: BTreeSet<String>,
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Outcome of one poll across all members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceReport {
    target: SchemaVersion,
    nodes: BTreeMap<NodeId, NodeState>,
    polled_at: DateTime<Utc>,
}

impl ConvergenceReport {
    /// Empty report for `target`
    #[must_use]
    pub fn new(target: SchemaVersion) -> Self {
        Self {
            target,
            nodes: BTreeMap::new(),
            polled_at: Utc::now(),
        }
    }

    /// Record the state of one node
    #[must_use]
    pub fn with_node(mut self, node: NodeId, state: NodeState) -> Self {
        self.nodes.insert(node, state);
        self
    }

    /// Version the nodes were compared against
    #[inline]
    #[must_use]
    pub fn target(&self) -> SchemaVersion {
        self.target
    }

    /// Per-node states
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<NodeId, NodeState> {
        &self.nodes
    }

    /// State of one node
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    /// When the poll finished
    #[inline]
    #[must_use]
    pub fn polled_at(&self) -> DateTime<Utc> {
        self.polled_at
    }

    fn count(&self, pred: impl Fn(&NodeState) -> bool) -> usize {
        self.nodes.values().filter(|s| pred(s)).count()
    }

    /// Nodes at or past the target
    #[must_use]
    pub fn converged_count(&self) -> usize {
        self.count(|s| matches!(s, NodeState::Converged(_)))
    }

    /// Nodes still behind
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.count(|s| matches!(s, NodeState::Pending(_)))
    }

    /// Nodes that rejected properties
    #[must_use]
    pub fn diverged_count(&self) -> usize {
        self.count(|s| matches!(s, NodeState::Diverged(_)))
    }

    /// Nodes that did not answer
    #[must_use]
    pub fn unreachable_count(&self) -> usize {
        self.count(|s| matches!(s, NodeState::Unreachable { .. }))
    }

    /// Every member converged
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.nodes.values().all(|s| matches!(s, NodeState::Converged(_)))
    }

    /// Every member either answered at or past the target, or is unreachable
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.nodes.values().all(|s| match s.status() {
            Some(status) => status.applied_schema_version >= self.target,
            None => true,
        })
    }

    /// No further polling can change the verdict
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.nodes
            .values()
            .all(|s| matches!(s, NodeState::Converged(_) | NodeState::Diverged(_)))
    }

    /// Per-node divergences
    #[must_use]
    pub fn divergences(&self) -> Vec<NodeDivergence> {
        self.nodes
            .iter()
            .filter_map(|(id, state)| match state {
                NodeState::Diverged(status) => Some(NodeDivergence {
                    node_id: *id,
                    invalid: status.invalid_properties.clone(),
                    unknown: status.unknown_properties.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Nodes that need a restart, with the properties waiting on it
    #[must_use]
    pub fn restart_warnings(&self) -> Vec<(NodeId, &BTreeSet<String>)> {
        self.nodes
            .iter()
            .filter_map(|(id, state)| {
                let status = state.status()?;
                (status.restart || !status.restart_required_properties.is_empty())
                    .then_some((*id, &status.restart_required_properties))
            })
            .collect()
    }
}

/// Polls member status until convergence, deadline or cancellation
#[derive(Clone)]
pub struct StatusReconciler {
    api: Arc<dyn AdminApi>,
    retry: RetryPolicy,
    per_node_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for StatusReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReconciler")
            .field("per_node_timeout", &self.per_node_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl StatusReconciler {
    /// Create a reconciler with default timings (5s per node, 1s between polls)
    #[must_use]
    pub fn new(api: Arc<dyn AdminApi>) -> Self {
        Self {
            api,
            retry: RetryPolicy::default(),
            per_node_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// With retry policy for the member listing
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With timeout for a single node's status request
    #[inline]
    #[must_use]
    pub fn with_per_node_timeout(mut self, timeout: Duration) -> Self {
        self.per_node_timeout = timeout;
        self
    }

    /// With delay between polls in [`StatusReconciler::wait_for_convergence`]
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll every member once
    ///
    /// Requests run concurrently. Nodes that have not answered when the
    /// deadline passes or `cancel` fires are reported unreachable, and their
    /// requests are dropped.
    ///
    /// # Errors
    /// - `AdminError::Cancelled` if cancelled before the member list arrived
    /// - the admin error if the member list cannot be fetched
    pub async fn poll(
        &self,
        target: SchemaVersion,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<ConvergenceReport, AdminError> {
        let members = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AdminError::Cancelled),
            members = with_retry(&self.retry, "list members", || self.api.members()) => members?,
        };
        tracing::debug!(members = members.len(), %target, "polling node status");

        let per_node_timeout = self.per_node_timeout;
        let mut in_flight: FuturesUnordered<_> = members
            .iter()
            .map(|&node| {
                let api = Arc::clone(&self.api);
                async move { (node, tokio::time::timeout(per_node_timeout, api.node_status(node)).await) }
            })
            .collect();

        let deadline_reached = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_reached);

        let mut report = ConvergenceReport::new(target);
        let mut interrupted = None;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    interrupted = Some("poll cancelled");
                    break;
                }
                () = &mut deadline_reached => {
                    interrupted = Some("deadline passed before node answered");
                    break;
                }
                next = in_flight.next() => {
                    let Some((node, result)) = next else { break };
                    let state = match result {
                        Ok(Ok(status)) => NodeState::classify(status, target),
                        Ok(Err(e)) => NodeState::Unreachable { reason: e.to_string() },
                        Err(_) => NodeState::Unreachable {
                            reason: format!("no answer within {}ms", per_node_timeout.as_millis()),
                        },
                    };
                    tracing::debug!(node = %node, state = state.label(), "node status");
                    report.nodes.insert(node, state);
                }
            }
        }
        drop(in_flight);

        if let Some(reason) = interrupted {
            for node in members {
                report.nodes.entry(node).or_insert_with(|| NodeState::Unreachable {
                    reason: reason.to_string(),
                });
            }
        }
        report.polled_at = Utc::now();
        Ok(report)
    }

    /// Poll until every node is settled, `timeout` elapses, or `cancel` fires
    ///
    /// Returns the last report either way; callers inspect it. A timeout too
    /// large to represent as a deadline means no deadline.
    ///
    /// # Errors
    /// Same as [`StatusReconciler::poll`] for the first poll. Later failures
    /// after a report exists return that report.
    pub async fn wait_for_convergence(
        &self,
        target: SchemaVersion,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ConvergenceReport, AdminError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut last: Option<ConvergenceReport> = None;

        loop {
            let report = match self.poll(target, deadline, cancel).await {
                Ok(report) => report,
                Err(e) => {
                    return match last {
                        Some(report) => {
                            tracing::warn!(error = %e, "status poll failed, returning last report");
                            Ok(report)
                        }
                        None => Err(e),
                    };
                }
            };

            tracing::info!(
                %target,
                converged = report.converged_count(),
                pending = report.pending_count(),
                diverged = report.diverged_count(),
                unreachable = report.unreachable_count(),
                "convergence poll"
            );

            let out_of_time = deadline.is_some_and(|deadline| {
                Instant::now()
                    .checked_add(self.poll_interval)
                    .map_or(true, |next| next >= deadline)
            });
            if report.is_settled() || cancel.is_cancelled() || out_of_time {
                return Ok(report);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(report),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
            last = Some(report);
        }
    }
}
