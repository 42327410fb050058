//! Configuration workflows
//!
//! A [`ConfigSession`] is one invocation against one cluster. Each workflow
//! composes the catalog, codec, diff engine, submitter and reconciler:
//!
//! ```text
//! schema + snapshot -> document / value -> edits -> diff -> confirm -> submit -> wait
//! ```

use crate::config::SessionConfig;
use crate::editor::{AssumeYes, Confirm, Editor};
use crate::error::{SessionError, EXIT_CANCELLED, EXIT_DIVERGED, EXIT_NOT_CONVERGED};
use crate::render;
use clusterconf_admin::retry::with_retry;
use clusterconf_admin::{
    fetch_catalog, fetch_snapshot, AdminApi, AdminError, ConvergenceReport, PatchSubmitter, RetryPolicy, StatusReconciler,
    SubmitResult, WriteMode,
};
use clusterconf_core::document::{self, shown_names};
use clusterconf_core::{
    codec, diff, force_reset, ClusterSnapshot, CodecError, DocumentError, Patch, PendingEdit, PropertyValue,
    SchemaCatalog, SchemaError, SchemaVersion, ValidationError, ValidationErrorKind, ValidationReport, Visibility,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Result of a workflow that may change the cluster
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Nothing differed from the current configuration
    NoChanges,
    /// User declined the confirmation
    Aborted,
    /// Patch accepted by the control plane
    Applied {
        /// What was submitted
        patch: Patch,
        /// Version assigned to the new configuration
        version: SchemaVersion,
        /// How waiting for the nodes ended
        wait: WaitOutcome,
    },
}

impl ApplyOutcome {
    /// Process exit code: non-zero unless every node was seen to converge
    /// (or waiting was not requested)
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Applied { wait, .. } => wait.exit_code(),
            Self::NoChanges | Self::Aborted => 0,
        }
    }
}

/// How waiting for convergence after an accepted patch ended
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Waiting was not requested
    Skipped,
    /// Every node settled or the timeout passed
    Finished(ConvergenceReport),
    /// Interrupted; the report, if one poll got that far
    Cancelled(Option<ConvergenceReport>),
    /// Node status could not be read at all
    Untracked(String),
}

impl WaitOutcome {
    /// Last convergence report, if any
    #[must_use]
    pub fn report(&self) -> Option<&ConvergenceReport> {
        match self {
            Self::Finished(report) | Self::Cancelled(Some(report)) => Some(report),
            Self::Skipped | Self::Cancelled(None) | Self::Untracked(_) => None,
        }
    }

    /// Exit code for this outcome
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Skipped => 0,
            Self::Finished(report) => report_exit_code(report),
            Self::Cancelled(_) => EXIT_CANCELLED,
            Self::Untracked(_) => EXIT_NOT_CONVERGED,
        }
    }
}

/// Exit code for a convergence report
#[must_use]
pub fn report_exit_code(report: &ConvergenceReport) -> i32 {
    if report.diverged_count() > 0 {
        EXIT_DIVERGED
    } else if report.is_converged() {
        0
    } else {
        EXIT_NOT_CONVERGED
    }
}

/// One property as returned by `get`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyReading {
    /// Canonical name
    pub name: String,
    /// Current override, `None` when at default
    pub value: Option<PropertyValue>,
    /// Schema default
    pub default: Option<PropertyValue>,
    /// Value is secret and was not revealed
    pub redacted: bool,
}

/// Findings of `lint`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LintReport {
    /// Problems found by the local codec
    pub local: ValidationReport,
    /// Problems reported by a control-plane dry run
    pub remote: Vec<(String, String)>,
}

impl LintReport {
    /// Whether no errors were found (warnings allowed)
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.local.is_clean() && self.remote.is_empty()
    }
}

/// One configuration session against one cluster
pub struct ConfigSession {
    api: Arc<dyn AdminApi>,
    retry: RetryPolicy,
    config: SessionConfig,
    catalog: OnceCell<SchemaCatalog>,
    submitter: PatchSubmitter,
    reconciler: StatusReconciler,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ConfigSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSession")
            .field("config", &self.config)
            .field("catalog_loaded", &self.catalog.initialized())
            .finish_non_exhaustive()
    }
}

impl ConfigSession {
    /// Create a session
    #[must_use]
    pub fn new(api: Arc<dyn AdminApi>, retry: RetryPolicy, config: SessionConfig) -> Self {
        let submitter = PatchSubmitter::new(Arc::clone(&api), retry);
        let reconciler = StatusReconciler::new(Arc::clone(&api))
            .with_retry(retry)
            .with_per_node_timeout(config.per_node_timeout())
            .with_poll_interval(config.poll_interval());
        Self {
            api,
            retry,
            config,
            catalog: OnceCell::new(),
            submitter,
            reconciler,
            cancel: CancellationToken::new(),
        }
    }

    /// With cancellation token (e.g. tied to Ctrl-C)
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Session settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Schema, fetched once per session
    ///
    /// # Errors
    /// Returns `SessionError::SchemaUnavailable` if it cannot be fetched.
    pub async fn catalog(&self) -> Result<&SchemaCatalog, SessionError> {
        self.catalog
            .get_or_try_init(|| async {
                fetch_catalog(self.api.as_ref(), &self.retry)
                    .await
                    .map_err(SessionError::from)
            })
            .await
    }

    async fn snapshot(&self, catalog: &SchemaCatalog) -> Result<ClusterSnapshot, SessionError> {
        Ok(fetch_snapshot(self.api.as_ref(), catalog, &self.retry).await?)
    }

    /// Interactive edit of the whole visible configuration
    ///
    /// Invalid documents are annotated and handed back to the editor, up to
    /// `max_edit_rounds` times, if the user agrees.
    ///
    /// # Errors
    /// - `SessionError::Validation` / `Document` if the document stays invalid
    /// - `SessionError::SubmissionRejected` if the control plane refuses it
    /// - connectivity and editor errors
    pub async fn edit(&self, editor: &dyn Editor, confirm: &dyn Confirm) -> Result<ApplyOutcome, SessionError> {
        let catalog = self.catalog().await?;
        let baseline = self.snapshot(catalog).await?;
        let include_tunables = self.config.include_tunables;
        let original = document::render(&baseline, catalog, include_tunables);

        let mut text = original.clone();
        let mut round = 1;
        let parsed = loop {
            text = editor.edit(&text).await?;
            if text == original {
                tracing::info!("document unchanged");
                return Ok(ApplyOutcome::NoChanges);
            }

            let report = match document::parse_against(&text, catalog, include_tunables, &baseline) {
                Ok(parsed) => break parsed,
                Err(DocumentError::Invalid(report)) => report,
                Err(DocumentError::Syntax(msg)) => syntax_report(msg),
            };
            tracing::warn!(round, problems = report.violations.len(), "edited document is invalid");
            if round >= self.config.max_edit_rounds
                || !confirm.confirm(&format!("{report}\nEdit again?")).await?
            {
                return Err(SessionError::Validation(report));
            }
            text = document::annotate(&text, &report);
            round += 1;
        };

        self.apply_document(parsed, &baseline, catalog, confirm).await
    }

    /// Replace the visible configuration with the contents of a file
    ///
    /// # Errors
    /// Same as [`ConfigSession::edit`], plus `SessionError::Io`.
    pub async fn import(&self, path: &Path, confirm: &dyn Confirm) -> Result<ApplyOutcome, SessionError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SessionError::io(path, e))?;
        let catalog = self.catalog().await?;
        let baseline = self.snapshot(catalog).await?;
        let parsed = document::parse_against(&text, catalog, self.config.include_tunables, &baseline)?;

        tracing::info!(path = %path.display(), properties = parsed.present.len(), "importing configuration");
        self.apply_document(parsed, &baseline, catalog, confirm).await
    }

    /// Current visible configuration as a document
    ///
    /// # Errors
    /// Connectivity errors.
    pub async fn export(&self) -> Result<String, SessionError> {
        let catalog = self.catalog().await?;
        let snapshot = self.snapshot(catalog).await?;
        Ok(document::render(&snapshot, catalog, self.config.include_tunables))
    }

    /// Write the current visible configuration to `path`
    ///
    /// # Errors
    /// Connectivity errors or `SessionError::Io`.
    pub async fn export_to(&self, path: &Path) -> Result<(), SessionError> {
        let text = self.export().await?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| SessionError::io(path, e))?;
        tracing::info!(path = %path.display(), "exported configuration");
        Ok(())
    }

    /// Validate a document without applying it
    ///
    /// Every property is checked, tunables included. With `remote`, a clean
    /// document is also sent to the control plane as a dry run.
    ///
    /// # Errors
    /// `SessionError::Document` if the file is not a YAML mapping; I/O and
    /// connectivity errors. Property problems are returned in the report.
    pub async fn lint(&self, path: &Path, remote: bool) -> Result<LintReport, SessionError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SessionError::io(path, e))?;
        let catalog = self.catalog().await?;

        let parsed = match document::parse(&text, catalog, true) {
            Ok(parsed) => parsed,
            Err(DocumentError::Invalid(local)) => {
                return Ok(LintReport {
                    local,
                    remote: Vec::new(),
                })
            }
            Err(DocumentError::Syntax(msg)) => return Err(SessionError::Document(msg)),
        };

        let mut report = LintReport {
            local: ValidationReport {
                violations: Vec::new(),
                warnings: parsed.warnings.clone(),
            },
            remote: Vec::new(),
        };
        if remote {
            let baseline = self.snapshot(catalog).await?;
            let patch = diff(&baseline, &parsed.edits);
            if let SubmitResult::Rejected { errors } = self.submitter.submit_with(&patch, WriteMode::DryRun).await? {
                report.remote = errors;
            }
        }
        Ok(report)
    }

    /// Assign one property
    ///
    /// Accepts tunables by explicit name regardless of the tunables setting.
    ///
    /// # Errors
    /// - `SessionError::Schema` for unknown names (with suggestions)
    /// - `SessionError::Codec` for invalid values or immutable properties
    /// - submission and connectivity errors
    pub async fn set(&self, name: &str, raw: &str) -> Result<ApplyOutcome, SessionError> {
        let catalog = self.catalog().await?;
        let def = catalog.lookup(name)?;
        if def.visibility == Visibility::Deprecated {
            tracing::warn!(property = %def.name, "property is deprecated");
        }
        let value = codec::decode(raw, def)?;
        let baseline = self.snapshot(catalog).await?;

        let patch = diff(&baseline, &[PendingEdit::set(def.name.clone(), value)]);
        self.apply(patch, &baseline, catalog, WriteMode::Commit, &AssumeYes).await
    }

    /// Read one property
    ///
    /// Secrets are redacted unless `reveal` is set.
    ///
    /// # Errors
    /// `SessionError::Schema` for unknown names; connectivity errors.
    pub async fn get(&self, name: &str, reveal: bool) -> Result<PropertyReading, SessionError> {
        let catalog = self.catalog().await?;
        let def = catalog.lookup(name)?;
        let snapshot = self.snapshot(catalog).await?;
        let value = snapshot.get(&def.name).cloned();

        Ok(PropertyReading {
            name: def.name.clone(),
            redacted: def.is_secret && !reveal && value.is_some(),
            value,
            default: def.default_value(),
        })
    }

    /// Clear every non-default override, bypassing value validation
    ///
    /// When `names` is non-empty only those properties are reset.
    ///
    /// # Errors
    /// `SessionError::Schema` if a name is neither known nor overridden;
    /// submission and connectivity errors.
    pub async fn force_reset(&self, names: &[String], confirm: &dyn Confirm) -> Result<ApplyOutcome, SessionError> {
        let catalog = self.catalog().await?;
        let baseline = self.snapshot(catalog).await?;

        let only = names
            .iter()
            .map(|name| match catalog.get(name) {
                Some(def) => Ok(def.name.clone()),
                None if baseline.contains(name) => Ok(name.clone()),
                None => Err(SchemaError::NotFound {
                    name: name.clone(),
                    suggestions: catalog.suggest(name),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let patch = force_reset(&baseline, catalog, &only);
        tracing::info!(removals = patch.len(), "force-resetting overrides");
        self.apply(patch, &baseline, catalog, WriteMode::Force, confirm).await
    }

    /// One convergence poll against the current configuration version
    ///
    /// # Errors
    /// Connectivity errors or `SessionError::Cancelled`.
    pub async fn status(&self) -> Result<ConvergenceReport, SessionError> {
        let current = with_retry(&self.retry, "fetch configuration", || self.api.current_config()).await?;
        Ok(self.reconciler.poll(current.config_version, None, &self.cancel).await?)
    }

    async fn apply_document(
        &self,
        parsed: document::ParsedDocument,
        baseline: &ClusterSnapshot,
        catalog: &SchemaCatalog,
        confirm: &dyn Confirm,
    ) -> Result<ApplyOutcome, SessionError> {
        for warning in &parsed.warnings {
            tracing::warn!("{warning}");
        }
        let shown = shown_names(baseline, catalog, self.config.include_tunables);
        let patch = diff(baseline, &parsed.into_replacement(&shown));
        self.apply(patch, baseline, catalog, WriteMode::Commit, confirm).await
    }

    async fn apply(
        &self,
        patch: Patch,
        baseline: &ClusterSnapshot,
        catalog: &SchemaCatalog,
        mode: WriteMode,
        confirm: &dyn Confirm,
    ) -> Result<ApplyOutcome, SessionError> {
        if patch.is_empty() {
            tracing::info!("no changes to apply");
            return Ok(ApplyOutcome::NoChanges);
        }
        if !self.config.assume_yes && !confirm.confirm(&render::patch_summary(&patch, baseline, catalog)).await? {
            tracing::info!("aborted by user");
            return Ok(ApplyOutcome::Aborted);
        }

        let version = match self.submitter.submit_with(&patch, mode).await? {
            SubmitResult::Accepted { schema_version } => schema_version,
            SubmitResult::Rejected { errors } => return Err(SessionError::SubmissionRejected { errors }),
            SubmitResult::NoChanges => return Ok(ApplyOutcome::NoChanges),
        };

        let wait = if self.config.wait {
            match self
                .reconciler
                .wait_for_convergence(version, self.config.convergence_timeout(), &self.cancel)
                .await
            {
                Ok(report) if self.cancel.is_cancelled() => WaitOutcome::Cancelled(Some(report)),
                Ok(report) => WaitOutcome::Finished(report),
                Err(AdminError::Cancelled) => WaitOutcome::Cancelled(None),
                Err(e) => {
                    tracing::warn!(error = %e, %version, "patch applied but convergence could not be tracked");
                    WaitOutcome::Untracked(e.to_string())
                }
            }
        } else {
            WaitOutcome::Skipped
        };

        Ok(ApplyOutcome::Applied { patch, version, wait })
    }
}

fn syntax_report(msg: String) -> ValidationReport {
    ValidationReport {
        violations: vec![CodecError::from(ValidationError::new(
            "<document>",
            ValidationErrorKind::Malformed(msg),
        ))],
        warnings: Vec::new(),
    }
}
