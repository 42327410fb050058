//! Error types for the admin client
//!
//! Distinguishes transient control-plane failures (retried with backoff)
//! from failures that need user action.

use clusterconf_core::SchemaError;

/// Admin API and control-plane errors
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Could not reach the control plane (connect failure, timeout)
    #[error("control plane unreachable at {target}: {reason}")]
    Unreachable { target: String, reason: String },

    /// Control plane answered with a 5xx
    #[error("control plane error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Control plane refused the request (4xx)
    #[error("request refused (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Admin address could not be used
    #[error("invalid admin URL: {0}")]
    InvalidUrl(String),

    /// TLS material could not be loaded
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Schema could not be fetched; the session cannot continue
    #[error("schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// Fetched schema is inconsistent
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl AdminError {
    /// Whether retrying the same request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Server { .. })
    }

    /// Build an error from a non-success HTTP status and body
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                json["message"]
                    .as_str()
                    .or_else(|| json["error"].as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.trim().to_string());

        if status >= 500 {
            Self::Server { status, message }
        } else {
            Self::Api { status, message }
        }
    }
}
