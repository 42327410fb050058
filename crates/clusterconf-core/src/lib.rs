//! clusterconf Core
//!
//! Pure, side-effect-free building blocks of the cluster configuration
//! reconciler:
//! - **Schema catalog**: every known property with type, default and visibility
//! - **Value codec**: raw text/YAML/JSON into validated typed values and back
//! - **Diff engine**: baseline snapshot + pending edits into a minimal patch
//! - **Documents**: the YAML format used by edit, import, export and lint
//!
//! # Example
//!
//! ```rust
//! use clusterconf_core::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let catalog = SchemaCatalog::new(vec![
//!     PropertyDefinition::new("retention.ms", ValueType::Duration),
//! ])
//! .unwrap();
//! let def = catalog.lookup("retention.ms").unwrap();
//! let value = codec::decode("20m", def).unwrap();
//!
//! let baseline = ClusterSnapshot::new(BTreeMap::new(), SchemaVersion(1));
//! let patch = diff(&baseline, &[PendingEdit::set("retention.ms", value)]);
//! assert_eq!(patch.len(), 1);
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod codec;
pub mod diff;
pub mod document;
pub mod error;
pub mod schema;
pub mod types;

// Re-exports for convenience
pub use diff::{diff, force_reset, Patch, PatchEntry};
pub use document::ParsedDocument;
pub use error::{
    CodecError, DocumentError, ImmutablePropertyError, SchemaError, ValidationError,
    ValidationErrorKind, ValidationReport,
};
pub use schema::{PropertyDefinition, SchemaCatalog, ValidationRules, ValueType, Visibility};
pub use types::{ClusterSnapshot, EditOp, NodeId, NodeStatus, PendingEdit, PropertyValue, SchemaVersion};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with clusterconf core
    pub use crate::codec;
    pub use crate::{
        diff, ClusterSnapshot, CodecError, Patch, PendingEdit, PropertyDefinition, PropertyValue,
        SchemaCatalog, SchemaVersion, ValueType,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
