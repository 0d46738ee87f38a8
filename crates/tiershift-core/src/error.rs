//! Error types for tiershift
//!
//! One error type per external collaborator:
//! - Inventory reads ([`QueryError`])
//! - Tier-change submissions ([`SubmissionError`])
//! - Audit writes ([`PersistenceError`])
//! - Notification publishing ([`NotificationError`])
//!
//! Per-volume errors are folded into stage results. Only [`PipelineError`]
//! and [`ConfigError`] ever reach the caller as `Err`.

use crate::types::{Tier, VolumeId};

/// Fleet inventory read failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Volume does not exist
    #[error("volume not found: {0}")]
    NotFound(VolumeId),

    /// Service could not be reached
    #[error("inventory unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected
    #[error("inventory access denied: {0}")]
    Unauthorized(String),

    /// Response could not be interpreted
    #[error("malformed inventory response: {0}")]
    Malformed(String),

    /// Call exceeded its deadline
    #[error("inventory query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl QueryError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }

    /// Whether the failure concerns the service rather than one volume
    #[inline]
    #[must_use]
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Unauthorized(_))
    }
}

/// Tier-change request was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// Volume is already on the requested tier
    #[error("volume already at tier {tier}")]
    AlreadyAtTier { tier: Tier },

    /// A previous modification has not finished
    #[error("modification already in progress")]
    ModificationInProgress,

    /// Volume does not exist
    #[error("volume not found: {0}")]
    NotFound(VolumeId),

    /// Fleet refused the request
    #[error("rejected: {reason}")]
    Rejected { reason: String },

    /// Service could not be reached
    #[error("mutation service unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its deadline
    #[error("submission timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl SubmissionError {
    /// Whether the error means there is nothing left to submit
    ///
    /// Selection snapshots go stale, so a volume may already be converted or
    /// converting by the time its request is sent.
    #[inline]
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyAtTier { .. } | Self::ModificationInProgress)
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Audit write failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Store rejected or failed the write
    #[error("audit write failed: {0}")]
    Write(String),

    /// Record could not be encoded
    #[error("audit record encoding failed: {0}")]
    Encode(String),

    /// Underlying I/O failure
    #[error("audit store I/O error: {0}")]
    Io(String),

    /// Call exceeded its deadline
    #[error("audit write timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Notification publish failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// Channel refused the message
    #[error("publish failed: {0}")]
    Publish(String),

    /// Call exceeded its deadline
    #[error("publish timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Stage-level failure with no per-volume scope
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Selection query failed; nothing was selected
    #[error("selection failed: {0}")]
    Selection(#[from] QueryError),

    /// Every verification query failed against an unreachable inventory
    #[error("inventory unreachable for all {attempted} volumes: {source}")]
    InventoryUnreachable {
        attempted: usize,
        #[source]
        source: QueryError,
    },

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Selection(e) => e.is_retryable(),
            Self::InventoryUnreachable { .. } => true,
            Self::Config(_) => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Tier name is blank
    #[error("{field} must not be empty")]
    EmptyTier { field: &'static str },

    /// Source and target are the same
    #[error("source and target tier are both {0}")]
    SameTier(Tier),

    /// In-flight window of zero
    #[error("max_in_flight must be at least 1")]
    ZeroWindow,

    /// Timeout of zero
    #[error("call_timeout_secs must be greater than 0")]
    ZeroTimeout,

    /// Selection tag key is blank
    #[error("selection tag key must not be empty")]
    EmptyTagKey,

    /// Config file could not be read
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    /// Config file could not be parsed
    #[error("cannot parse configuration: {0}")]
    Parse(String),
}
