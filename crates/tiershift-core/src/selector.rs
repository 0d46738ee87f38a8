//! Selector stage
//!
//! Queries the fleet inventory once and returns a point-in-time snapshot of
//! the volumes matching a filter. The result may be stale by the time the
//! Converter acts on it.

use crate::error::QueryError;
use crate::filter::SelectionFilter;
use crate::ports::{with_deadline, FleetInventory, VolumeQuery};
use crate::types::VolumeRecord;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Read-only volume selector
pub struct Selector {
    inventory: Arc<dyn FleetInventory>,
    call_timeout: Duration,
}

impl Selector {
    /// Create selector
    #[inline]
    #[must_use]
    pub fn new(inventory: Arc<dyn FleetInventory>) -> Self {
        Self {
            inventory,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Select volumes matching the filter
    ///
    /// # Errors
    /// Any inventory failure fails the whole call; no partial results are
    /// returned.
    #[tracing::instrument(name = "select", skip_all, fields(stage = "select", filter = %filter))]
    pub async fn select(&self, filter: &SelectionFilter) -> Result<Vec<VolumeRecord>, QueryError> {
        let query = VolumeQuery::Filter(filter.clone());
        let descriptors = with_deadline(
            self.call_timeout,
            self.inventory.describe_volumes(&query),
            |timeout_ms| QueryError::Timeout { timeout_ms },
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "inventory query failed");
            e
        })?;

        // Re-check locally and collapse duplicate IDs.
        let mut seen = HashSet::new();
        let records: Vec<VolumeRecord> = descriptors
            .iter()
            .filter(|d| filter.matches(d))
            .filter(|d| seen.insert(d.volume_id.clone()))
            .map(VolumeRecord::from)
            .collect();

        tracing::info!(
            returned = descriptors.len(),
            selected = records.len(),
            "selection complete"
        );
        Ok(records)
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryFleet;
    use crate::types::{Tier, VolumeDescriptor, VolumeId, VolumeState};
    use std::collections::BTreeMap;

    fn volume(id: &str, tag: &str, tier: &str) -> VolumeDescriptor {
        VolumeDescriptor {
            volume_id: VolumeId::new(id),
            volume_type: Tier::new(tier),
            size_gib: 20,
            availability_zone: format!("az-{id}"),
            state: VolumeState::Available,
            tags: BTreeMap::from([("AutoConvert".to_string(), tag.to_string())]),
            attachments: Vec::new(),
            modification: None,
        }
    }

    /// Inventory that ignores the filter and repeats itself
    struct SloppyInventory(Vec<VolumeDescriptor>);

    #[async_trait::async_trait]
    impl FleetInventory for SloppyInventory {
        async fn describe_volumes(
            &self,
            _query: &VolumeQuery,
        ) -> Result<Vec<VolumeDescriptor>, QueryError> {
            let mut out = self.0.clone();
            out.extend(self.0.clone());
            Ok(out)
        }
    }

    struct DownInventory;

    #[async_trait::async_trait]
    impl FleetInventory for DownInventory {
        async fn describe_volumes(
            &self,
            _query: &VolumeQuery,
        ) -> Result<Vec<VolumeDescriptor>, QueryError> {
            Err(QueryError::Unavailable("connection refused".into()))
        }
    }

    fn migration_filter() -> SelectionFilter {
        SelectionFilter::tier_migration("AutoConvert", "true", &Tier::new("gp2"))
    }

    #[tokio::test]
    async fn selects_exact_matches() {
        let fleet = InMemoryFleet::with_volumes([
            volume("A", "true", "gp2"),
            volume("B", "false", "gp2"),
            volume("C", "true", "gp3"),
        ]);
        let selector = Selector::new(Arc::new(fleet));

        let records = selector.select(&migration_filter()).await.unwrap();

        assert_eq!(records, vec![VolumeRecord::new("A", "az-A")]);
    }

    #[tokio::test]
    async fn rechecks_and_dedupes_provider_output() {
        let inventory = SloppyInventory(vec![volume("A", "true", "gp2"), volume("B", "false", "gp2")]);
        let selector = Selector::new(Arc::new(inventory));

        let records = selector.select(&migration_filter()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].volume_id.as_str(), "A");
    }

    #[tokio::test]
    async fn empty_fleet_yields_empty_selection() {
        let selector = Selector::new(Arc::new(InMemoryFleet::new()));
        let records = selector.select(&migration_filter()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn inventory_failure_fails_whole_call() {
        let selector = Selector::new(Arc::new(DownInventory));
        let result = selector.select(&migration_filter()).await;
        assert!(matches!(result, Err(QueryError::Unavailable(_))));
    }
}
