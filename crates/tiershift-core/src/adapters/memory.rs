//! In-memory collaborators
//!
//! [`InMemoryFleet`] behaves like an asynchronous fleet control plane: an
//! accepted tier change is only recorded as pending and the volume keeps its
//! old tier until [`InMemoryFleet::settle`] applies it.

use crate::error::{NotificationError, PersistenceError, QueryError, SubmissionError};
use crate::ports::{AuditStore, FleetInventory, FleetMutator, Notifier, VolumeQuery};
use crate::types::{
    AuditRecord, Notification, RecordId, Tier, TierModification, VolumeDescriptor, VolumeId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;

/// Fleet inventory and mutation service held in memory
#[derive(Debug, Default)]
pub struct InMemoryFleet {
    volumes: RwLock<BTreeMap<VolumeId, VolumeDescriptor>>,
}

impl InMemoryFleet {
    /// Create empty fleet
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create fleet from descriptors
    #[must_use]
    pub fn with_volumes(volumes: impl IntoIterator<Item = VolumeDescriptor>) -> Self {
        let fleet = Self::new();
        for volume in volumes {
            fleet.insert(volume);
        }
        fleet
    }

    /// Insert or replace a volume
    pub fn insert(&self, volume: VolumeDescriptor) {
        self.volumes.write().insert(volume.volume_id.clone(), volume);
    }

    /// Current descriptor of a volume
    #[must_use]
    pub fn get(&self, volume_id: &VolumeId) -> Option<VolumeDescriptor> {
        self.volumes.read().get(volume_id).cloned()
    }

    /// All volumes, ordered by ID
    #[must_use]
    pub fn snapshot(&self) -> Vec<VolumeDescriptor> {
        self.volumes.read().values().cloned().collect()
    }

    /// Volumes with a tier change still pending
    #[must_use]
    pub fn pending_modifications(&self) -> Vec<(VolumeId, Tier)> {
        self.volumes
            .read()
            .values()
            .filter_map(|v| {
                v.modification
                    .as_ref()
                    .map(|m| (v.volume_id.clone(), m.target_tier.clone()))
            })
            .collect()
    }

    /// Complete every pending tier change
    ///
    /// Returns the number of volumes whose tier changed.
    pub fn settle(&self) -> usize {
        let mut volumes = self.volumes.write();
        let mut settled = 0;
        for volume in volumes.values_mut() {
            if let Some(modification) = volume.modification.take() {
                volume.volume_type = modification.target_tier;
                settled += 1;
            }
        }
        settled
    }

    /// Number of volumes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.read().len()
    }

    /// Whether the fleet has no volumes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.read().is_empty()
    }
}

#[async_trait::async_trait]
impl FleetInventory for InMemoryFleet {
    async fn describe_volumes(
        &self,
        query: &VolumeQuery,
    ) -> Result<Vec<VolumeDescriptor>, QueryError> {
        let volumes = self.volumes.read();
        let found = match query {
            VolumeQuery::Filter(filter) => volumes
                .values()
                .filter(|v| filter.matches(v))
                .cloned()
                .collect(),
            VolumeQuery::Ids(ids) => ids.iter().filter_map(|id| volumes.get(id).cloned()).collect(),
        };
        Ok(found)
    }
}

#[async_trait::async_trait]
impl FleetMutator for InMemoryFleet {
    async fn modify_volume_tier(
        &self,
        volume_id: &VolumeId,
        target_tier: &Tier,
    ) -> Result<(), SubmissionError> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(volume_id)
            .ok_or_else(|| SubmissionError::NotFound(volume_id.clone()))?;

        if volume.modification.is_some() {
            return Err(SubmissionError::ModificationInProgress);
        }
        if volume.volume_type == *target_tier {
            return Err(SubmissionError::AlreadyAtTier {
                tier: target_tier.clone(),
            });
        }
        volume.modification = Some(TierModification {
            target_tier: target_tier.clone(),
        });
        Ok(())
    }
}

/// Append-only audit store held in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: DashMap<RecordId, AuditRecord>,
}

impl InMemoryAuditStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in record-ID order
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        let mut records: Vec<AuditRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|r| r.record_id);
        records
    }

    /// Records for one volume in record-ID order
    #[must_use]
    pub fn records_for(&self, volume_id: &VolumeId) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.volume_id == *volume_id)
            .collect()
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), PersistenceError> {
        match self.records.entry(record.record_id) {
            Entry::Occupied(_) => Err(PersistenceError::Write(format!(
                "record {} already exists",
                record.record_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }
}

/// Notification channel that keeps every published message
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    published: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    /// Create empty notifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in publish order
    #[must_use]
    pub fn published(&self) -> Vec<Notification> {
        self.published.lock().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for InMemoryNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.published.lock().push(notification.clone());
        Ok(())
    }
}
