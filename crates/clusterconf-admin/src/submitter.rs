//! Patch submission
//!
//! Sends a patch as one atomic request. Transient failures are retried with
//! backoff; a validation rejection is final and is returned, not raised.

use crate::api::{AdminApi, PatchOutcome, PatchRequest, WriteMode};
use crate::config::RetryPolicy;
use crate::error::AdminError;
use crate::retry::with_retry;
use clusterconf_core::{Patch, SchemaVersion};
use std::sync::Arc;

/// Result of submitting a patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Control plane committed the patch
    Accepted {
        /// Version to wait for
        schema_version: SchemaVersion,
    },
    /// Control plane refused the patch; nothing changed
    Rejected {
        /// (property, reason) pairs, sorted by property
        errors: Vec<(String, String)>,
    },
    /// Patch was empty and was not sent
    NoChanges,
}

impl SubmitResult {
    /// Whether the control plane accepted the patch
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Submits patches to the control plane
#[derive(Clone)]
pub struct PatchSubmitter {
    api: Arc<dyn AdminApi>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PatchSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchSubmitter").field("retry", &self.retry).finish_non_exhaustive()
    }
}

impl PatchSubmitter {
    /// Create a submitter
    #[must_use]
    pub fn new(api: Arc<dyn AdminApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Submit and commit `patch`
    ///
    /// # Errors
    /// Returns the admin error if the control plane stays unreachable or
    /// answers with a non-validation failure.
    pub async fn submit(&self, patch: &Patch) -> Result<SubmitResult, AdminError> {
        self.submit_with(patch, WriteMode::Commit).await
    }

    /// Submit `patch` in the given write mode
    ///
    /// # Errors
    /// Same as [`PatchSubmitter::submit`].
    pub async fn submit_with(&self, patch: &Patch, mode: WriteMode) -> Result<SubmitResult, AdminError> {
        if patch.is_empty() {
            tracing::debug!("empty patch, nothing to submit");
            return Ok(SubmitResult::NoChanges);
        }

        let request = PatchRequest::from(patch);
        tracing::info!(
            upserts = request.upsert.len(),
            removals = request.remove.len(),
            ?mode,
            "submitting configuration patch"
        );

        let outcome = with_retry(&self.retry, "submit patch", || self.api.patch_config(&request, mode)).await?;
        match outcome {
            PatchOutcome::Accepted { config_version } => {
                tracing::info!(version = %config_version, ?mode, "patch accepted");
                Ok(SubmitResult::Accepted {
                    schema_version: config_version,
                })
            }
            PatchOutcome::Rejected { errors } => {
                tracing::warn!(rejected = errors.len(), "patch rejected by control plane");
                Ok(SubmitResult::Rejected {
                    errors: errors.into_iter().collect(),
                })
            }
        }
    }
}
