//! End-to-end workflows against the in-memory control plane

use async_trait::async_trait;
use clusterconf_admin::{AdminApi, RetryPolicy, WriteMode};
use clusterconf_core::{CodecError, PropertyValue, SchemaError, SchemaVersion, ValidationErrorKind};
use clusterconf_session::error::{EXIT_CANCELLED, EXIT_NOT_CONVERGED};
use clusterconf_session::{ApplyOutcome, ConfigSession, Confirm, Editor, SessionConfig, SessionError, WaitOutcome};
use clusterconf_test_utils::{sample_schema, FakeAdmin, NodeBehavior};
use tokio_util::sync::CancellationToken;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Applies one text replacement per call; an empty pattern saves unchanged
struct ScriptedEditor {
    steps: Mutex<VecDeque<(String, String)>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedEditor {
    fn new(steps: &[(&str, &str)]) -> Self {
        Self {
            steps: Mutex::new(steps.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Editor for ScriptedEditor {
    async fn edit(&self, text: &str) -> Result<String, SessionError> {
        self.seen.lock().unwrap().push(text.to_string());
        let (from, to) = self.steps.lock().unwrap().pop_front().expect("editor opened too often");
        if from.is_empty() {
            return Ok(text.to_string());
        }
        assert!(text.contains(&from), "{from:?} not in document:\n{text}");
        Ok(text.replacen(&from, &to, 1))
    }
}

/// Answers from a script, then yes
#[derive(Default)]
struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::default(),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, prompt: &str) -> Result<bool, SessionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(true))
    }
}

fn config() -> SessionConfig {
    SessionConfig::new()
        .with_convergence_timeout(Duration::from_secs(2))
        .with_polling(Duration::from_millis(10), Duration::from_millis(100))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
    }
}

fn cluster(properties: Vec<(&str, Value)>) -> Arc<FakeAdmin> {
    Arc::new(
        FakeAdmin::new(sample_schema())
            .with_config(6, properties)
            .with_converging_nodes(3),
    )
}

fn session(admin: &Arc<FakeAdmin>, config: SessionConfig) -> ConfigSession {
    ConfigSession::new(admin.clone(), fast_retry(), config)
}

#[tokio::test]
async fn edit_submits_minimal_patch_and_waits_for_convergence() {
    let admin = cluster(vec![("retention.ms", json!(600_000)), ("log.segment.bytes", json!(2_000_000))]);
    let editor = ScriptedEditor::new(&[("retention.ms: 600000", "retention.ms: 1200000")]);
    let confirm = ScriptedConfirm::default();

    let outcome = session(&admin, config()).edit(&editor, &confirm).await.unwrap();

    let ApplyOutcome::Applied { patch, version, wait } = &outcome else {
        panic!("Expected applied, got {outcome:?}");
    };
    assert_eq!(patch.len(), 1);
    assert_eq!(
        patch.upserts()["retention.ms"],
        PropertyValue::Duration(1_200_000)
    );
    assert_eq!(*version, SchemaVersion(7));
    assert!(matches!(wait, WaitOutcome::Finished(report) if report.is_converged()));
    assert_eq!(outcome.exit_code(), 0);

    assert_eq!(admin.properties()["retention.ms"], json!(1_200_000));
    assert_eq!(admin.properties()["log.segment.bytes"], json!(2_000_000));
    assert!(confirm.prompts()[0].contains("retention.ms: 600000 -> 1200000"));
}

#[tokio::test]
async fn edit_without_changes_submits_nothing() {
    let admin = cluster(vec![("retention.ms", json!(600_000))]);
    let editor = ScriptedEditor::new(&[("", "")]);

    let outcome = session(&admin, config())
        .edit(&editor, &ScriptedConfirm::default())
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::NoChanges);
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn edit_preserves_hidden_tunables() {
    let admin = cluster(vec![
        ("retention.ms", json!(600_000)),
        ("raft_heartbeat_interval_ms", json!(200)),
    ]);
    let editor = ScriptedEditor::new(&[("retention.ms: 600000", "retention.ms: 60000")]);

    session(&admin, config())
        .edit(&editor, &ScriptedConfirm::default())
        .await
        .unwrap();

    assert!(!editor.seen()[0].contains("raft_heartbeat_interval_ms"));
    let (request, _) = &admin.patches()[0];
    assert!(request.remove.is_empty());
    assert_eq!(admin.properties()["raft_heartbeat_interval_ms"], json!(200));
}

#[tokio::test]
async fn edit_reprompts_on_invalid_document() {
    let admin = cluster(vec![("retention.ms", json!(600_000))]);
    let editor = ScriptedEditor::new(&[
        ("retention.ms: 600000", "retention.ms: banana"),
        ("retention.ms: banana", "retention.ms: 5m"),
    ]);
    let confirm = ScriptedConfirm::default();

    let outcome = session(&admin, config()).edit(&editor, &confirm).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));

    let seen = editor.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].starts_with("# The following problems were found"));
    assert!(seen[1].contains("retention.ms"));
    assert!(confirm.prompts()[0].ends_with("Edit again?"));
    assert_eq!(admin.properties()["retention.ms"], json!(300_000));
}

#[tokio::test]
async fn edit_gives_up_when_user_declines_reedit() {
    let admin = cluster(vec![("log.segment.bytes", json!(2_000_000))]);
    let editor = ScriptedEditor::new(&[("log.segment.bytes: 2000000", "log.segment.bytes: 10")]);
    let confirm = ScriptedConfirm::answering(&[false]);

    let err = session(&admin, config()).edit(&editor, &confirm).await.unwrap_err();
    match err {
        SessionError::Validation(report) => assert_eq!(report.offending_names(), vec!["log.segment.bytes"]),
        other => panic!("Expected validation error, got {other:?}"),
    }
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn declined_confirmation_aborts() {
    let admin = cluster(vec![("retention.ms", json!(600_000))]);
    let editor = ScriptedEditor::new(&[("retention.ms: 600000", "retention.ms: 1")]);
    let confirm = ScriptedConfirm::answering(&[false]);

    let outcome = session(&admin, config()).edit(&editor, &confirm).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Aborted);
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn import_replaces_visible_configuration() {
    let admin = cluster(vec![("retention.ms", json!(600_000)), ("log.segment.bytes", json!(2_000_000))]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster.yaml");
    std::fs::write(&path, "log.segment.bytes: 4000000\nsuperusers: [admin, ops]\n").unwrap();

    let config = config().with_assume_yes(true);
    let outcome = session(&admin, config)
        .import(&path, &ScriptedConfirm::default())
        .await
        .unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));

    let (request, mode) = &admin.patches()[0];
    assert_eq!(*mode, WriteMode::Commit);
    assert_eq!(request.remove, vec!["retention.ms".to_string()]);
    assert_eq!(request.upsert["log.segment.bytes"], json!(4_000_000));
    assert_eq!(request.upsert["superusers"], json!(["admin", "ops"]));
}

#[tokio::test]
async fn import_reports_every_violation_and_submits_nothing() {
    let admin = cluster(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(
        &path,
        "log.segment.bytes: 10\ncompression.type: brotli\ncluster_id: abc\n",
    )
    .unwrap();

    let err = session(&admin, config())
        .import(&path, &ScriptedConfirm::default())
        .await
        .unwrap_err();
    let SessionError::Validation(report) = err else {
        panic!("Expected validation error");
    };
    assert_eq!(report.violations.len(), 3);
    assert!(matches!(
        &report.violations[0],
        CodecError::Invalid(e) if matches!(e.kind, ValidationErrorKind::OutOfRange { .. })
    ));
    assert!(matches!(
        &report.violations[1],
        CodecError::Invalid(e) if matches!(e.kind, ValidationErrorKind::NotInEnum { .. })
    ));
    assert!(matches!(&report.violations[2], CodecError::Immutable(_)));
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn export_then_import_is_a_no_op() {
    let admin = cluster(vec![
        ("retention.ms", json!(600_000)),
        ("superusers", json!(["admin"])),
        ("compression.type", json!("zstd")),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.yaml");
    let session = session(&admin, config());

    session.export_to(&path).await.unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("# How long to keep log segments\nretention.ms: 600000"));
    assert!(text.contains("# auto_create_topics_enabled: false"));

    let outcome = session.import(&path, &ScriptedConfirm::default()).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::NoChanges);
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn lint_collects_errors_and_warnings() {
    let admin = cluster(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lint.yaml");
    std::fs::write(
        &path,
        "retention.mss: 1000\nenable_legacy_listener: true\nraft_heartbeat_interval_ms: 200\n",
    )
    .unwrap();

    let report = session(&admin, config()).lint(&path, false).await.unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.local.violations.len(), 1);
    assert!(report.local.violations[0].to_string().contains("retention.ms"));
    assert_eq!(report.local.warnings.len(), 1);
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn lint_remote_uses_dry_run() {
    let admin = Arc::new(
        FakeAdmin::new(sample_schema()).with_rejection([("log.segment.bytes", "exceeds disk size")]),
    );
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lint.yaml");
    std::fs::write(&path, "log.segment.bytes: 900000000000\n").unwrap();

    let report = session(&admin, config()).lint(&path, true).await.unwrap();
    assert!(report.local.is_clean());
    assert_eq!(
        report.remote,
        vec![("log.segment.bytes".to_string(), "exceeds disk size".to_string())]
    );
    assert_eq!(admin.patches()[0].1, WriteMode::DryRun);
}

#[tokio::test]
async fn set_decodes_units_and_skips_confirmation() {
    let admin = cluster(vec![]);
    let confirm_free = session(&admin, config());

    let outcome = confirm_free.set("retention.ms", "20m").await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    assert_eq!(admin.properties()["retention.ms"], json!(1_200_000));

    // Alias resolves to the canonical name
    confirm_free.set("log_retention_ms", "1h").await.unwrap();
    assert_eq!(admin.properties()["retention.ms"], json!(3_600_000));
}

#[tokio::test]
async fn set_rejects_unknown_and_immutable_properties() {
    let admin = cluster(vec![]);
    let session = session(&admin, config());

    match session.set("retention.mss", "1").await.unwrap_err() {
        SessionError::Schema(SchemaError::NotFound { suggestions, .. }) => {
            assert_eq!(suggestions, vec!["retention.ms".to_string()]);
        }
        other => panic!("Expected unknown property, got {other:?}"),
    }
    assert!(matches!(
        session.set("cluster_id", "x").await.unwrap_err(),
        SessionError::Codec(CodecError::Immutable(_))
    ));
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn set_same_value_is_no_change() {
    let admin = cluster(vec![("retention.ms", json!(600_000))]);
    let outcome = session(&admin, config()).set("retention.ms", "10m").await.unwrap();
    assert_eq!(outcome, ApplyOutcome::NoChanges);
}

#[tokio::test]
async fn get_shows_default_and_redacts_secrets() {
    let admin = cluster(vec![("cloud_storage_secret_key", json!("hunter2"))]);
    let session = session(&admin, config());

    let reading = session.get("retention.ms", false).await.unwrap();
    assert_eq!(reading.value, None);
    assert_eq!(
        reading.default,
        Some(PropertyValue::Duration(604_800_000))
    );

    let hidden = session.get("cloud_storage_secret_key", false).await.unwrap();
    assert!(hidden.redacted);
    let shown = session.get("cloud_storage_secret_key", true).await.unwrap();
    assert!(!shown.redacted);
    assert_eq!(shown.value, Some(PropertyValue::String("hunter2".into())));
}

#[tokio::test]
async fn force_reset_removes_exactly_the_non_default_overrides() {
    let admin = cluster(vec![
        ("retention.ms", json!(1_000)),
        ("log.segment.bytes", json!(2_000_000)),
        ("superusers", json!(["admin"])),
        ("compression.type", json!("producer")),
    ]);

    let outcome = session(&admin, config().with_assume_yes(true))
        .force_reset(&[], &ScriptedConfirm::default())
        .await
        .unwrap();

    let ApplyOutcome::Applied { patch, .. } = outcome else {
        panic!("Expected applied");
    };
    assert!(patch.upserts().is_empty());
    assert_eq!(
        patch.removals().iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["log.segment.bytes", "retention.ms", "superusers"]
    );
    let (request, mode) = &admin.patches()[0];
    assert_eq!(*mode, WriteMode::Force);
    assert!(request.upsert.is_empty());
    assert_eq!(admin.properties().len(), 1);
}

#[tokio::test]
async fn force_reset_limited_to_named_properties() {
    let admin = cluster(vec![("retention.ms", json!(1_000)), ("log.segment.bytes", json!(2_000_000))]);
    let session = session(&admin, config().with_assume_yes(true));

    session
        .force_reset(&["log_retention_ms".to_string()], &ScriptedConfirm::default())
        .await
        .unwrap();
    assert_eq!(admin.patches()[0].0.remove, vec!["retention.ms".to_string()]);

    let err = session
        .force_reset(&["no.such.property".to_string()], &ScriptedConfirm::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Schema(_)));
}

#[tokio::test]
async fn rejected_submission_is_an_error() {
    let admin = Arc::new(
        FakeAdmin::new(sample_schema())
            .with_converging_nodes(1)
            .with_rejection([("log.segment.bytes", "exceeds disk size")]),
    );

    let err = session(&admin, config())
        .set("log.segment.bytes", "900000000000")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SubmissionRejected { ref errors } if errors.len() == 1));
    assert!(admin.properties().is_empty());
}

#[tokio::test]
async fn status_polls_current_version() {
    let admin = cluster(vec![]);
    let report = session(&admin, config()).status().await.unwrap();
    assert_eq!(report.target(), SchemaVersion(6));
    assert_eq!(report.converged_count(), 3);
}

#[tokio::test]
async fn untrackable_convergence_is_not_success() {
    let admin = Arc::new(
        FakeAdmin::new(sample_schema())
            .with_config(6, [("retention.ms", json!(600_000))])
            .with_converging_nodes(3)
            .with_members_failure("leader election in progress"),
    );

    let outcome = session(&admin, config()).set("retention.ms", "20m").await.unwrap();

    let ApplyOutcome::Applied { wait, .. } = &outcome else {
        panic!("Expected applied, got {outcome:?}");
    };
    assert!(matches!(wait, WaitOutcome::Untracked(reason) if reason.contains("leader election")));
    assert_eq!(outcome.exit_code(), EXIT_NOT_CONVERGED);
    assert_eq!(admin.properties()["retention.ms"], json!(1_200_000));
}

#[tokio::test]
async fn interrupt_while_waiting_exits_as_cancelled() {
    let admin = Arc::new(
        FakeAdmin::new(sample_schema())
            .with_config(6, [("retention.ms", json!(600_000))])
            .with_converging_nodes(2)
            .with_node(3, NodeBehavior::Hang),
    );
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    });

    let outcome = session(&admin, config())
        .with_cancellation(cancel)
        .set("retention.ms", "20m")
        .await
        .unwrap();

    let ApplyOutcome::Applied { wait, .. } = &outcome else {
        panic!("Expected applied, got {outcome:?}");
    };
    assert!(matches!(wait, WaitOutcome::Cancelled(_)));
    assert_eq!(outcome.exit_code(), EXIT_CANCELLED);
}

#[tokio::test]
async fn unbounded_convergence_timeout_is_accepted() {
    let admin = cluster(vec![("retention.ms", json!(600_000))]);
    let config = config().with_convergence_timeout(Duration::from_secs(u64::MAX));

    let outcome = session(&admin, config).set("retention.ms", "20m").await.unwrap();

    let ApplyOutcome::Applied { wait, .. } = &outcome else {
        panic!("Expected applied, got {outcome:?}");
    };
    assert!(matches!(wait, WaitOutcome::Finished(report) if report.is_converged()));
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn set_accepts_unlimited_retention() {
    let admin = cluster(vec![("retention.ms", json!(600_000))]);
    let session = session(&admin, config());

    let outcome = session.set("retention.ms", "-1").await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    assert_eq!(admin.properties()["retention.ms"], json!(-1));
    assert_eq!(
        session.get("retention.ms", false).await.unwrap().value,
        Some(PropertyValue::Duration(-1))
    );

    let err = session.set("retention.ms", "-2").await.unwrap_err();
    assert!(matches!(err, SessionError::Codec(_)));
}

#[tokio::test]
async fn edit_leaves_stored_value_outside_schema_alone() {
    let admin = cluster(vec![("retention.ms", json!(600_000)), ("compression.type", json!("lz5"))]);
    let editor = ScriptedEditor::new(&[("retention.ms: 600000", "retention.ms: 1200000")]);

    let outcome = session(&admin, config().with_assume_yes(true))
        .edit(&editor, &ScriptedConfirm::default())
        .await
        .unwrap();

    let ApplyOutcome::Applied { patch, .. } = &outcome else {
        panic!("Expected applied, got {outcome:?}");
    };
    assert_eq!(patch.names().collect::<Vec<_>>(), vec!["retention.ms"]);
    assert!(editor.seen()[0].contains("compression.type: lz5"));
    assert_eq!(admin.properties()["compression.type"], json!("lz5"));
}

#[tokio::test]
async fn exported_document_with_stored_value_outside_schema_imports_cleanly() {
    let admin = cluster(vec![("retention.ms", json!(-1)), ("compression.type", json!("lz5"))]);
    let session = session(&admin, config().with_assume_yes(true));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster.yaml");

    session.export_to(&path).await.unwrap();
    let outcome = session.import(&path, &ScriptedConfirm::default()).await.unwrap();

    assert_eq!(outcome, ApplyOutcome::NoChanges);
    assert_eq!(admin.patch_attempts(), 0);
}

#[tokio::test]
async fn schema_failure_stops_every_workflow() {
    let admin = Arc::new(FakeAdmin::new(sample_schema()).with_schema_failure("connection refused"));
    let session = ConfigSession::new(admin.clone() as Arc<dyn AdminApi>, fast_retry(), config());

    let err = session.set("retention.ms", "1s").await.unwrap_err();
    assert!(matches!(err, SessionError::SchemaUnavailable(_)));
    assert_eq!(err.exit_code(), clusterconf_session::error::EXIT_UNAVAILABLE);
}
