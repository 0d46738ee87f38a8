//! Testing utilities for the tiershift workspace
//!
//! Volume fixtures plus fault-injecting wrappers around the in-memory
//! collaborators, bundled by [`TestFleet`].

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tiershift_core::{
    Attachment, AuditRecord, AuditStore, FleetClients, FleetInventory, FleetMutator,
    InMemoryAuditStore, InMemoryFleet, InMemoryNotifier, Notification, NotificationError,
    Notifier, PersistenceError, QueryError, SubmissionError, Tier, VolumeDescriptor, VolumeId,
    VolumeQuery, VolumeState,
};

pub const OPT_IN_TAG: &str = "AutoConvert";

/// Fluent builder for volume descriptors
#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    descriptor: VolumeDescriptor,
}

pub fn volume(id: &str) -> VolumeBuilder {
    VolumeBuilder {
        descriptor: VolumeDescriptor {
            volume_id: VolumeId::new(id),
            volume_type: Tier::new("gp2"),
            size_gib: 100,
            availability_zone: "ap-south-1a".to_string(),
            state: VolumeState::Available,
            tags: BTreeMap::new(),
            attachments: Vec::new(),
            modification: None,
        },
    }
}

impl VolumeBuilder {
    pub fn tier(mut self, tier: &str) -> Self {
        self.descriptor.volume_type = Tier::new(tier);
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.descriptor.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn opted_in(self) -> Self {
        self.tag(OPT_IN_TAG, "true")
    }

    pub fn opted_out(self) -> Self {
        self.tag(OPT_IN_TAG, "false")
    }

    pub fn state(mut self, state: VolumeState) -> Self {
        self.descriptor.state = state;
        self
    }

    pub fn attached_to(mut self, instance: &str) -> Self {
        self.descriptor.attachments.push(Attachment::new(instance));
        self.descriptor.state = VolumeState::InUse;
        self
    }

    pub fn zone(mut self, zone: &str) -> Self {
        self.descriptor.availability_zone = zone.to_string();
        self
    }

    pub fn size(mut self, gib: u32) -> Self {
        self.descriptor.size_gib = gib;
        self
    }

    pub fn build(self) -> VolumeDescriptor {
        self.descriptor
    }
}

/// Opted-in volume on the given tier
pub fn opted_in(id: &str, tier: &str) -> VolumeDescriptor {
    volume(id).tier(tier).opted_in().build()
}

/// Inventory wrapper that fails, hangs or goes down on demand
#[derive(Debug)]
pub struct FaultyInventory {
    inner: Arc<InMemoryFleet>,
    failing: Mutex<HashMap<VolumeId, QueryError>>,
    hanging: Mutex<HashSet<VolumeId>>,
    outage: Mutex<Option<QueryError>>,
}

impl FaultyInventory {
    pub fn new(inner: Arc<InMemoryFleet>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashSet::new()),
            outage: Mutex::new(None),
        }
    }

    /// Lookups naming this volume fail with `error`
    pub fn fail_for(&self, id: &str, error: QueryError) {
        self.failing.lock().insert(VolumeId::new(id), error);
    }

    /// Lookups naming this volume never return
    pub fn hang_for(&self, id: &str) {
        self.hanging.lock().insert(VolumeId::new(id));
    }

    /// Every call fails with `error` until cleared with `None`
    pub fn set_outage(&self, error: Option<QueryError>) {
        *self.outage.lock() = error;
    }
}

#[async_trait::async_trait]
impl FleetInventory for FaultyInventory {
    async fn describe_volumes(
        &self,
        query: &VolumeQuery,
    ) -> Result<Vec<VolumeDescriptor>, QueryError> {
        if let Some(error) = self.outage.lock().clone() {
            return Err(error);
        }
        if let VolumeQuery::Ids(ids) = query {
            let hang = {
                let hanging = self.hanging.lock();
                ids.iter().any(|id| hanging.contains(id))
            };
            if hang {
                std::future::pending::<()>().await;
            }
            let failure = {
                let failing = self.failing.lock();
                ids.iter().find_map(|id| failing.get(id).cloned())
            };
            if let Some(error) = failure {
                return Err(error);
            }
        }
        self.inner.describe_volumes(query).await
    }
}

/// Mutator wrapper that rejects or hangs chosen volumes
#[derive(Debug)]
pub struct FaultyMutator {
    inner: Arc<InMemoryFleet>,
    rejects: Mutex<HashMap<VolumeId, SubmissionError>>,
    hanging: Mutex<HashSet<VolumeId>>,
    calls: Mutex<Vec<VolumeId>>,
}

impl FaultyMutator {
    pub fn new(inner: Arc<InMemoryFleet>) -> Self {
        Self {
            inner,
            rejects: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reject(&self, id: &str, error: SubmissionError) {
        self.rejects.lock().insert(VolumeId::new(id), error);
    }

    pub fn hang_for(&self, id: &str) {
        self.hanging.lock().insert(VolumeId::new(id));
    }

    /// Volumes a request was attempted for, in call order
    pub fn calls(&self) -> Vec<VolumeId> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl FleetMutator for FaultyMutator {
    async fn modify_volume_tier(
        &self,
        volume_id: &VolumeId,
        target_tier: &Tier,
    ) -> Result<(), SubmissionError> {
        self.calls.lock().push(volume_id.clone());
        let hang = self.hanging.lock().contains(volume_id);
        if hang {
            std::future::pending::<()>().await;
        }
        let reject = self.rejects.lock().get(volume_id).cloned();
        if let Some(error) = reject {
            return Err(error);
        }
        self.inner.modify_volume_tier(volume_id, target_tier).await
    }
}

/// Audit store that refuses writes for chosen volumes
#[derive(Debug, Default)]
pub struct FaultyAuditStore {
    inner: InMemoryAuditStore,
    failing: Mutex<HashSet<VolumeId>>,
}

impl FaultyAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: &str) {
        self.failing.lock().insert(VolumeId::new(id));
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.records()
    }

    pub fn records_for(&self, id: &str) -> Vec<AuditRecord> {
        self.inner.records_for(&VolumeId::new(id))
    }
}

#[async_trait::async_trait]
impl AuditStore for FaultyAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), PersistenceError> {
        let fail = self.failing.lock().contains(&record.volume_id);
        if fail {
            return Err(PersistenceError::Write("injected write failure".into()));
        }
        self.inner.append(record).await
    }
}

/// Notifier that refuses messages about chosen volumes
#[derive(Debug, Default)]
pub struct FaultyNotifier {
    inner: InMemoryNotifier,
    failing: Mutex<HashSet<String>>,
}

impl FaultyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn published(&self) -> Vec<Notification> {
        self.inner.published()
    }

    /// Messages mentioning the volume
    pub fn published_for(&self, id: &str) -> Vec<Notification> {
        let needle = format!("Volume ID: {id},");
        self.published()
            .into_iter()
            .filter(|n| n.message.contains(&needle))
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for FaultyNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotificationError> {
        let fail = self
            .failing
            .lock()
            .iter()
            .any(|id| notification.message.contains(&format!("Volume ID: {id},")));
        if fail {
            return Err(NotificationError::Publish("injected publish failure".into()));
        }
        self.inner.publish(notification).await
    }
}

/// In-memory fleet with every collaborator wrapped for fault injection
#[derive(Debug)]
pub struct TestFleet {
    pub fleet: Arc<InMemoryFleet>,
    pub inventory: Arc<FaultyInventory>,
    pub mutator: Arc<FaultyMutator>,
    pub audit: Arc<FaultyAuditStore>,
    pub notifier: Arc<FaultyNotifier>,
}

impl TestFleet {
    pub fn new(volumes: impl IntoIterator<Item = VolumeDescriptor>) -> Self {
        let fleet = Arc::new(InMemoryFleet::with_volumes(volumes));
        Self {
            inventory: Arc::new(FaultyInventory::new(fleet.clone())),
            mutator: Arc::new(FaultyMutator::new(fleet.clone())),
            audit: Arc::new(FaultyAuditStore::new()),
            notifier: Arc::new(FaultyNotifier::new()),
            fleet,
        }
    }

    /// Fresh client handles for one run
    pub fn clients(&self) -> FleetClients {
        FleetClients::new(
            self.inventory.clone(),
            self.mutator.clone(),
            self.audit.clone(),
            self.notifier.clone(),
        )
    }
}
