//! tiershift core - bulk volume tier migration
//!
//! Moves tagged block-storage volumes from one performance tier to another
//! through three strictly ordered stages:
//! - **Select**: snapshot the volumes matching a tag/attribute filter
//! - **Submit**: send a fire-and-forget tier-change request per volume
//! - **Verify/Notify**: observe each volume, append an audit record, then
//!   publish a notification
//!
//! Every stage isolates volumes from each other: one failing volume is
//! reported in the stage result and never stops the rest of the batch.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiershift_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fleet = Arc::new(InMemoryFleet::new());
//! let clients = FleetClients::new(
//!     fleet.clone(),
//!     fleet,
//!     Arc::new(InMemoryAuditStore::new()),
//!     Arc::new(TracingNotifier),
//! );
//!
//! let pipeline = Pipeline::new(PipelineConfig::new(), clients)?;
//! let report = pipeline.run().await?;
//!
//! println!("{} volumes completed", report.count(VolumeStatus::Completed));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod adapters;
pub mod config;
pub mod converter;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod ports;
pub mod selector;
pub mod types;
pub mod verifier;

// Re-exports for convenience
pub use adapters::{InMemoryAuditStore, InMemoryFleet, InMemoryNotifier, JsonlAuditStore, TracingNotifier};
pub use config::{PipelineConfig, SelectionConfig};
pub use converter::{
    ConversionRequestResult, Converter, FailedSubmission, SkipReason, SkippedVolume,
    SubmissionStatus,
};
pub use error::{
    ConfigError, NotificationError, PersistenceError, PipelineError, QueryError, SubmissionError,
};
pub use filter::{FilterAttribute, FilterTerm, SelectionFilter};
pub use pipeline::{Pipeline, PipelineReport, VolumeReport, VolumeStatus};
pub use ports::{AuditStore, FleetClients, FleetInventory, FleetMutator, Notifier, VolumeQuery};
pub use selector::Selector;
pub use types::{
    Attachment, AuditRecord, InstanceId, Notification, RecordId, RunId, Tier, TierModification,
    VolumeDescriptor, VolumeId, VolumeRecord, VolumeState, UNKNOWN_INSTANCE,
};
pub use verifier::{ItemFailure, ItemOutcome, VerificationReport, Verifier};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with tiershift
    pub use crate::{
        FleetClients, InMemoryAuditStore, InMemoryFleet, InMemoryNotifier, Pipeline,
        PipelineConfig, PipelineReport, SelectionFilter, Tier, TracingNotifier, VolumeId,
        VolumeRecord, VolumeStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
