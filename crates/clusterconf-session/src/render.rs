//! Human-readable output for patches, readings and convergence reports

use crate::session::{LintReport, PropertyReading, WaitOutcome};
use clusterconf_admin::{ConvergenceReport, NodeState};
use clusterconf_core::{codec, ClusterSnapshot, Patch, PatchEntry, PropertyDefinition, PropertyValue, SchemaCatalog};
use std::fmt::Write as _;

/// Placeholder shown instead of secret values
pub const REDACTED: &str = "[secret]";

/// Summary of a pending patch, used as the confirmation prompt
#[must_use]
pub fn patch_summary(patch: &Patch, baseline: &ClusterSnapshot, catalog: &SchemaCatalog) -> String {
    let mut out = format!("The following changes will be applied ({}):\n", patch.len());
    for entry in patch.entries(baseline) {
        let secret = catalog.get(entry.name()).is_some_and(|def| def.is_secret);
        let show = |value: Option<&PropertyValue>| match value {
            _ if secret => REDACTED.to_string(),
            Some(v) => codec::encode(v),
            None => "(default)".to_string(),
        };
        match entry {
            PatchEntry::Set { name, old, new } => {
                let _ = writeln!(out, "  {name}: {} -> {}", show(old), show(Some(new)));
            }
            PatchEntry::Remove { name, old } => {
                let default = catalog
                    .get(name)
                    .and_then(PropertyDefinition::default_value)
                    .map_or_else(|| "unset".to_string(), |d| codec::encode(&d));
                let _ = writeln!(out, "  {name}: {} -> (default: {default})", show(old));
            }
        }
    }
    let needs_restart: Vec<&str> = patch
        .names()
        .filter(|name| catalog.get(name).is_some_and(|def| def.needs_restart))
        .collect();
    if !needs_restart.is_empty() {
        let _ = writeln!(out, "Nodes must be restarted for: {}", needs_restart.join(", "));
    }
    out.push_str("Apply?");
    out
}

/// One property as printed by `get`
#[must_use]
pub fn reading(reading: &PropertyReading) -> String {
    let value = match (&reading.value, &reading.default) {
        _ if reading.redacted => REDACTED.to_string(),
        (Some(value), _) => codec::encode(value),
        (None, Some(default)) => codec::encode(default),
        (None, None) => String::new(),
    };
    if reading.value.is_none() && !reading.redacted {
        format!("{value} (default)")
    } else {
        value
    }
}

/// Status table for a convergence report
#[must_use]
pub fn convergence(report: &ConvergenceReport) -> String {
    let mut out = format!(
        "Target version {}: {} converged, {} pending, {} diverged, {} unreachable\n",
        report.target(),
        report.converged_count(),
        report.pending_count(),
        report.diverged_count(),
        report.unreachable_count()
    );
    let _ = writeln!(out, "{:<6}{:<13}{:<9}{:<9}{:<20}UNKNOWN", "NODE", "STATE", "VERSION", "RESTART", "INVALID");
    for (id, state) in report.nodes() {
        match state.status() {
            Some(status) => {
                let _ = writeln!(
                    out,
                    "{:<6}{:<13}{:<9}{:<9}{:<20}{}",
                    id.to_string(),
                    state.label(),
                    status.applied_schema_version.to_string(),
                    status.restart.to_string(),
                    join(&status.invalid_properties),
                    join(&status.unknown_properties),
                );
            }
            None => {
                let reason = match state {
                    NodeState::Unreachable { reason } => reason.as_str(),
                    _ => "",
                };
                let _ = writeln!(out, "{:<6}{:<13}{reason}", id.to_string(), state.label());
            }
        }
    }
    for divergence in report.divergences() {
        let _ = writeln!(out, "error: {divergence}");
    }
    for (id, properties) in report.restart_warnings() {
        if properties.is_empty() {
            let _ = writeln!(out, "warning: node {id} needs a restart");
        } else {
            let _ = writeln!(out, "warning: node {id} needs a restart for: {}", join(properties));
        }
    }
    out
}

/// What happened after a patch was accepted
#[must_use]
pub fn wait(outcome: &WaitOutcome) -> String {
    match outcome {
        WaitOutcome::Skipped => "Run `clusterconf status` to follow progress.\n".to_string(),
        WaitOutcome::Finished(report) => convergence(report),
        WaitOutcome::Cancelled(report) => {
            let mut out = report.as_ref().map(convergence).unwrap_or_default();
            out.push_str("Interrupted while waiting; run `clusterconf status` to follow progress.\n");
            out
        }
        WaitOutcome::Untracked(reason) => format!(
            "error: could not track convergence: {reason}\nRun `clusterconf status` to follow progress.\n"
        ),
    }
}

/// Findings of `lint`
#[must_use]
pub fn lint(report: &LintReport) -> String {
    let mut out = String::new();
    for violation in &report.local.violations {
        let _ = writeln!(out, "error: {violation}");
    }
    for (name, reason) in &report.remote {
        let _ = writeln!(out, "error: {name}: {reason} (control plane)");
    }
    for warning in &report.local.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    if report.is_clean() {
        out.push_str("No problems found.\n");
    }
    out
}

fn join<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let joined = names.into_iter().map(String::as_str).collect::<Vec<_>>().join(",");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterconf_core::{NodeId, NodeStatus, PropertyValue, SchemaVersion};
    use std::collections::BTreeMap;

    #[test]
    fn summary_redacts_secrets_and_shows_defaults() {
        let catalog = clusterconf_test_utils::sample_catalog();
        let mut props = BTreeMap::new();
        props.insert("cloud_storage_secret_key".to_string(), PropertyValue::String("hunter2".into()));
        props.insert("log.segment.bytes".to_string(), PropertyValue::Integer(2_000_000));
        let baseline = ClusterSnapshot::new(props, SchemaVersion(2));
        let patch = Patch::default()
            .with_upsert("cloud_storage_secret_key", PropertyValue::String("s3cret".into()))
            .with_removal("log.segment.bytes");

        let text = patch_summary(&patch, &baseline, &catalog);
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("s3cret"));
        assert!(text.contains("log.segment.bytes: 2000000 -> (default: 134217728)"));
        assert!(text.ends_with("Apply?"));
    }

    #[test]
    fn reading_marks_defaults() {
        let unset = PropertyReading {
            name: "retention.ms".into(),
            value: None,
            default: Some(PropertyValue::Integer(5)),
            redacted: false,
        };
        assert_eq!(reading(&unset), "5 (default)");

        let secret = PropertyReading {
            name: "k".into(),
            value: Some(PropertyValue::String("x".into())),
            default: None,
            redacted: true,
        };
        assert_eq!(reading(&secret), REDACTED);
    }

    #[test]
    fn convergence_table_lists_every_node() {
        let target = SchemaVersion(7);
        let report = ConvergenceReport::new(target)
            .with_node(NodeId(1), NodeState::classify(NodeStatus::clean(NodeId(1), target), target))
            .with_node(
                NodeId(2),
                NodeState::Unreachable {
                    reason: "timed out".into(),
                },
            );
        let text = convergence(&report);
        assert!(text.starts_with("Target version 7: 1 converged, 0 pending, 0 diverged, 1 unreachable"));
        assert!(text.contains("timed out"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn convergence_names_what_each_diverged_node_rejected() {
        let target = SchemaVersion(7);
        let mut rejected = NodeStatus::clean(NodeId(2), target);
        rejected.invalid_properties.insert("log.segment.bytes".into());
        let report = ConvergenceReport::new(target)
            .with_node(NodeId(1), NodeState::classify(NodeStatus::clean(NodeId(1), target), target))
            .with_node(NodeId(2), NodeState::classify(rejected, target));

        let text = convergence(&report);
        assert!(text.contains("error: node 2 diverged: invalid [log.segment.bytes], unknown []\n"));
        assert!(!text.contains("node 1 diverged"));
    }

    #[test]
    fn wait_outcomes_explain_themselves() {
        assert!(wait(&WaitOutcome::Skipped).contains("clusterconf status"));
        assert!(wait(&WaitOutcome::Untracked("members unavailable".into()))
            .starts_with("error: could not track convergence: members unavailable"));

        let report = ConvergenceReport::new(SchemaVersion(3)).with_node(
            NodeId(1),
            NodeState::classify(NodeStatus::clean(NodeId(1), SchemaVersion(2)), SchemaVersion(3)),
        );
        let text = wait(&WaitOutcome::Cancelled(Some(report)));
        assert!(text.starts_with("Target version 3: 0 converged, 1 pending"));
        assert!(text.contains("Interrupted while waiting"));
    }
}
