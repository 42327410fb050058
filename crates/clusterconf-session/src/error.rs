//! Session error type
//!
//! Every workflow returns [`SessionError`]. Lower-level errors convert into
//! it, and the binary maps it to a process exit code.

use clusterconf_admin::AdminError;
use clusterconf_core::{CodecError, DocumentError, SchemaError, ValidationReport};
use std::path::PathBuf;

/// Exit code for invalid input (bad value, unknown property, bad document)
pub const EXIT_INVALID: i32 = 2;
/// Exit code when the control plane rejected the patch
pub const EXIT_REJECTED: i32 = 3;
/// Exit code when the control plane could not be reached
pub const EXIT_UNAVAILABLE: i32 = 4;
/// Exit code when nodes did not converge in time
pub const EXIT_NOT_CONVERGED: i32 = 5;
/// Exit code when a node rejected the configuration
pub const EXIT_DIVERGED: i32 = 6;
/// Exit code after user interruption
pub const EXIT_CANCELLED: i32 = 130;

/// Errors from a configuration workflow
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Schema could not be obtained; nothing can be validated
    #[error("schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// Control-plane failure
    #[error(transparent)]
    Admin(AdminError),

    /// Unknown property name
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Single value failed to decode
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// One or more properties in a document are invalid
    #[error("{0}")]
    Validation(ValidationReport),

    /// Document is not a YAML mapping
    #[error("invalid document: {0}")]
    Document(String),

    /// Control plane refused the patch; nothing was applied
    #[error("configuration rejected, nothing was applied:{}", describe_rejection(.errors))]
    SubmissionRejected {
        /// (property, reason) pairs
        errors: Vec<(String, String)>,
    },

    /// Reading or writing a file failed
    #[error("{}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The editor could not be run
    #[error("editor failed: {0}")]
    Editor(String),

    /// User interrupted the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Schema(_) | Self::Codec(_) | Self::Validation(_) | Self::Document(_) => EXIT_INVALID,
            Self::SubmissionRejected { .. } => EXIT_REJECTED,
            Self::SchemaUnavailable(_) | Self::Admin(_) => EXIT_UNAVAILABLE,
            Self::Cancelled => EXIT_CANCELLED,
            Self::Io { .. } | Self::Editor(_) => 1,
        }
    }
}

impl From<AdminError> for SessionError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::SchemaUnavailable(reason) => Self::SchemaUnavailable(reason),
            AdminError::Schema(e) => Self::SchemaUnavailable(e.to_string()),
            AdminError::Cancelled => Self::Cancelled,
            other => Self::Admin(other),
        }
    }
}

impl From<DocumentError> for SessionError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Syntax(msg) => Self::Document(msg),
            DocumentError::Invalid(report) => Self::Validation(report),
        }
    }
}

fn describe_rejection(errors: &[(String, String)]) -> String {
    errors.iter().map(|(name, reason)| format!("\n  {name}: {reason}")).collect()
}
