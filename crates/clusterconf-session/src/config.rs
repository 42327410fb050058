//! Session configuration and the optional config file

use crate::error::SessionError;
use clusterconf_admin::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Show and accept tunable properties
    pub include_tunables: bool,
    /// Skip the confirmation prompt
    pub assume_yes: bool,
    /// Wait for nodes to apply an accepted patch
    pub wait: bool,
    /// How long to wait for convergence
    pub convergence_timeout_secs: u64,
    /// Delay between convergence polls
    pub poll_interval_ms: u64,
    /// Timeout for one node's status request
    pub per_node_timeout_ms: u64,
    /// Editor rounds before giving up on an invalid document
    pub max_edit_rounds: u32,
}

impl SessionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With tunables shown
    #[inline]
    #[must_use]
    pub fn with_tunables(mut self, include: bool) -> Self {
        self.include_tunables = include;
        self
    }

    /// With confirmation skipped
    #[inline]
    #[must_use]
    pub fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// With convergence waiting on or off
    #[inline]
    #[must_use]
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// With convergence timeout
    #[inline]
    #[must_use]
    pub fn with_convergence_timeout(mut self, timeout: Duration) -> Self {
        self.convergence_timeout_secs = timeout.as_secs();
        self
    }

    /// With poll timings
    #[inline]
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, per_node_timeout: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.per_node_timeout_ms = u64::try_from(per_node_timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Convergence timeout as a duration
    #[inline]
    #[must_use]
    pub fn convergence_timeout(&self) -> Duration {
        Duration::from_secs(self.convergence_timeout_secs)
    }

    /// Poll interval as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-node timeout as a duration
    #[inline]
    #[must_use]
    pub fn per_node_timeout(&self) -> Duration {
        Duration::from_millis(self.per_node_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            include_tunables: false,
            assume_yes: false,
            wait: true,
            convergence_timeout_secs: 30,
            poll_interval_ms: 500,
            per_node_timeout_ms: 5_000,
            max_edit_rounds: 5,
        }
    }
}

/// Contents of the TOML config file
///
/// ```toml
/// [admin]
/// hosts = ["10.0.0.1:9644", "10.0.0.2:9644"]
///
/// [admin.tls]
/// enabled = true
/// ca_file = "/etc/clusterconf/ca.pem"
///
/// [session]
/// convergence_timeout_secs = 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Admin client settings
    pub admin: ClientConfig,
    /// Workflow settings
    pub session: SessionConfig,
}

impl FileConfig {
    /// Default location, `~/.config/clusterconf/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("clusterconf")
                .join("config.toml")
        })
    }

    /// Parse config file contents
    ///
    /// # Errors
    /// Returns `SessionError::Document` on malformed TOML.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        toml::from_str(text).map_err(|e| SessionError::Document(format!("config file: {e}")))
    }

    /// Load from `path`
    ///
    /// # Errors
    /// Returns `SessionError::Io` if the file cannot be read, or
    /// `SessionError::Document` if it is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path).map_err(|e| SessionError::io(path, e))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::parse(&text)
    }

    /// Load `explicit` if given, else the default file if it exists
    ///
    /// # Errors
    /// Same as [`FileConfig::load`]; a missing default file is not an error.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, SessionError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}
