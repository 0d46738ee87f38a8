//! Core types for tiershift
//!
//! Defines the data model passed between pipeline stages:
//! - Opaque identifiers (volumes, tiers, instances, audit records, runs)
//! - Volume descriptors as reported by the fleet inventory
//! - Selection records handed from Selector to Converter
//! - Audit records and notifications produced by the Verifier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;
use uuid::Uuid;

/// Sentinel written to audit records when a volume has no attachment
pub const UNKNOWN_INSTANCE: &str = "unknown";

/// Opaque volume identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(String);

impl VolumeId {
    /// Create volume ID
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VolumeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VolumeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named performance/cost class of block storage
///
/// Tier names are opaque; `gp2` and `gp3` are only defaults.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(String);

impl Tier {
    /// Create tier
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Tier name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is blank
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Tier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute instance owning an attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create instance ID
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audit record identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Ulid);

impl RecordId {
    /// Generate new record ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Volume lifecycle state as reported by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    /// Being provisioned
    Creating,
    /// Provisioned, not attached
    Available,
    /// Attached to an instance
    InUse,
    /// Being deleted
    Deleting,
    /// Deleted
    Deleted,
    /// Provider reported an error
    Error,
}

impl VolumeState {
    /// Wire name of the state
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeState::Creating => "creating",
            VolumeState::Available => "available",
            VolumeState::InUse => "in-use",
            VolumeState::Deleting => "deleting",
            VolumeState::Deleted => "deleted",
            VolumeState::Error => "error",
        }
    }
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment of a volume to a compute instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Owning instance
    pub instance_id: InstanceId,
    /// Device name on the instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Attachment {
    /// Create attachment
    #[inline]
    #[must_use]
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: InstanceId::new(instance_id),
            device: None,
        }
    }
}

/// Tier change accepted by the fleet but not yet applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierModification {
    /// Tier the volume is moving to
    pub target_tier: Tier,
}

/// Volume as described by the fleet inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Volume ID
    pub volume_id: VolumeId,
    /// Current tier
    pub volume_type: Tier,
    /// Size in GiB
    pub size_gib: u32,
    /// Locality identifier
    pub availability_zone: String,
    /// Lifecycle state
    pub state: VolumeState,
    /// Resource tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Attachments in provider order
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// In-flight tier change, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<TierModification>,
}

impl VolumeDescriptor {
    /// Tag value by key
    #[inline]
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Instance owning the volume
    ///
    /// Multi-attached volumes report the first attachment in the order the
    /// provider returned them.
    #[inline]
    #[must_use]
    pub fn owning_instance(&self) -> Option<&InstanceId> {
        self.attachments.first().map(|a| &a.instance_id)
    }
}

/// Minimal identifying record emitted by the Selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Volume ID
    pub volume_id: VolumeId,
    /// Locality identifier, carried through unchanged
    pub availability_zone: String,
}

impl VolumeRecord {
    /// Create record
    #[inline]
    #[must_use]
    pub fn new(volume_id: impl Into<VolumeId>, availability_zone: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            availability_zone: availability_zone.into(),
        }
    }
}

impl From<&VolumeDescriptor> for VolumeRecord {
    fn from(descriptor: &VolumeDescriptor) -> Self {
        Self {
            volume_id: descriptor.volume_id.clone(),
            availability_zone: descriptor.availability_zone.clone(),
        }
    }
}

impl From<VolumeRecord> for VolumeId {
    fn from(record: VolumeRecord) -> Self {
        record.volume_id
    }
}

/// Append-only observation of a volume's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Generated key; never the volume ID
    pub record_id: RecordId,
    /// Observed volume
    pub volume_id: VolumeId,
    /// First attachment's instance or [`UNKNOWN_INSTANCE`]
    pub instance_id: String,
    /// Tier at observation time
    pub volume_type: Tier,
    /// Size in GiB
    pub size_gib: u32,
    /// Region the observation was made in
    pub region: String,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Lifecycle state at observation time
    pub status: VolumeState,
}

impl AuditRecord {
    /// Build a fresh record from an inventory observation
    #[must_use]
    pub fn observe(descriptor: &VolumeDescriptor, region: &str, at: DateTime<Utc>) -> Self {
        Self {
            record_id: RecordId::new(),
            volume_id: descriptor.volume_id.clone(),
            instance_id: descriptor
                .owning_instance()
                .map_or_else(|| UNKNOWN_INSTANCE.to_string(), |i| i.as_str().to_string()),
            volume_type: descriptor.volume_type.clone(),
            size_gib: descriptor.size_gib,
            region: region.to_string(),
            timestamp: at,
            status: descriptor.state,
        }
    }
}

/// Message published on the notification channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Subject line
    pub subject: String,
    /// Body
    pub message: String,
}

impl Notification {
    /// Notification describing a persisted observation
    #[must_use]
    pub fn for_record(subject: impl Into<String>, record: &AuditRecord) -> Self {
        Self {
            subject: subject.into(),
            message: format!("Volume ID: {}, Status: {}", record.volume_id, record.status),
        }
    }
}
