//! clusterconf Admin
//!
//! Everything that talks to the control plane:
//! - [`AdminApi`]: the seam, with an HTTP implementation ([`HttpAdminClient`])
//! - [`PatchSubmitter`]: atomic patch submission with bounded retries
//! - [`StatusReconciler`]: concurrent per-node convergence polling
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterconf_admin::{fetch_catalog, ClientConfig, HttpAdminClient};
//!
//! # async fn example() -> Result<(), clusterconf_admin::AdminError> {
//! let config = ClientConfig::new().with_hosts(["127.0.0.1:9644"]);
//! let client = HttpAdminClient::new(&config)?;
//! let catalog = fetch_catalog(&client, &config.retry).await?;
//! println!("{} properties", catalog.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod retry;
pub mod submitter;

pub use api::{
    fetch_catalog, fetch_snapshot, AdminApi, ConfigResponse, PatchOutcome, PatchRequest, WriteMode,
};
pub use config::{ClientConfig, RetryPolicy, TlsConfig};
pub use error::AdminError;
pub use http::HttpAdminClient;
pub use reconciler::{ConvergenceReport, NodeDivergence, NodeState, StatusReconciler};
pub use submitter::{PatchSubmitter, SubmitResult};
