//! clusterconf Session
//!
//! User-facing configuration workflows: `edit`, `import`, `export`, `lint`,
//! `set`, `get`, `force-reset` and `status`. Each one is a method on
//! [`ConfigSession`] and is thin glue over the core and admin crates.

#![warn(unreachable_pub)]

pub mod config;
pub mod editor;
pub mod error;
pub mod render;
pub mod session;

pub use config::{FileConfig, SessionConfig};
pub use editor::{AssumeYes, Confirm, Editor, ExternalEditor, StdinConfirm};
pub use error::SessionError;
pub use session::{report_exit_code, ApplyOutcome, ConfigSession, LintReport, PropertyReading, WaitOutcome};
