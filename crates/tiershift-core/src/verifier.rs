//! Verifier/Notifier stage
//!
//! Observes each volume once, persists what it saw, then announces it.
//! Every volume runs its own state machine:
//!
//! ```text
//! Start --query ok--> Observed --append ok--> Persisted --publish ok--> Notified
//!   |                    |                        |
//!   +--query err-->      +--append err-->         +--publish err--> Failed
//! ```
//!
//! Persistence always precedes notification, so a notification is never
//! sent for an observation that was not recorded. A failed publish does not
//! roll the audit record back.

use crate::error::{NotificationError, PersistenceError, PipelineError, QueryError};
use crate::ports::{with_deadline, AuditStore, FleetInventory, Notifier, VolumeQuery};
use crate::types::{AuditRecord, Notification, RecordId, VolumeDescriptor, VolumeId};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Why one volume did not reach `Notified`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemFailure {
    /// Volume could not be observed
    #[error("verification query failed: {0}")]
    Query(QueryError),

    /// Observation could not be recorded
    #[error("audit persistence failed: {0}")]
    Persist(PersistenceError),

    /// Recorded, but the notification failed
    #[error("notification failed after persisting {record_id}: {error}")]
    Notify {
        record_id: RecordId,
        error: NotificationError,
    },
}

/// Terminal state of one volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Observed, persisted and announced
    Notified {
        /// The persisted observation
        record: AuditRecord,
    },
    /// Stopped before `Notified`
    Failed {
        /// Volume ID
        volume_id: VolumeId,
        /// Where and why it stopped
        failure: ItemFailure,
    },
}

impl ItemOutcome {
    /// Volume this outcome belongs to
    #[inline]
    #[must_use]
    pub fn volume_id(&self) -> &VolumeId {
        match self {
            ItemOutcome::Notified { record } => &record.volume_id,
            ItemOutcome::Failed { volume_id, .. } => volume_id,
        }
    }

    /// Whether the volume reached `Notified`
    #[inline]
    #[must_use]
    pub fn is_notified(&self) -> bool {
        matches!(self, ItemOutcome::Notified { .. })
    }
}

/// Aggregate result of a verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Per-volume outcomes, unordered
    pub outcomes: Vec<ItemOutcome>,
}

impl VerificationReport {
    /// Volumes that reached `Notified`
    #[must_use]
    pub fn notified_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_notified()).count()
    }

    /// Volumes that ended in `Failed`
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.notified_count()
    }

    /// Whether no volume was processed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// First outcome for a volume
    #[must_use]
    pub fn outcome_for(&self, volume_id: &VolumeId) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.volume_id() == volume_id)
    }
}

/// Observes, records and announces volume state
pub struct Verifier {
    inventory: Arc<dyn FleetInventory>,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn Notifier>,
    region: String,
    subject: String,
    max_in_flight: usize,
    call_timeout: Duration,
}

impl Verifier {
    /// Create verifier
    #[must_use]
    pub fn new(
        inventory: Arc<dyn FleetInventory>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn Notifier>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            inventory,
            audit,
            notifier,
            region: region.into(),
            subject: "Volume Status Logged".to_string(),
            max_in_flight: 16,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// With notification subject
    #[inline]
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// With in-flight window (minimum 1)
    #[inline]
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Verify, persist and notify every volume
    ///
    /// Accepts records or bare IDs. Duplicates are processed independently
    /// and each produces its own audit record.
    ///
    /// # Errors
    /// `PipelineError::InventoryUnreachable` when the input was non-empty and
    /// every volume failed because the inventory itself was unreachable.
    /// Individual failures never produce an `Err`.
    pub async fn verify_and_notify<I, T>(&self, items: I) -> Result<VerificationReport, PipelineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<VolumeId>,
    {
        let ids: Vec<VolumeId> = items.into_iter().map(Into::into).collect();
        self.run(ids).await
    }

    #[tracing::instrument(name = "verify", skip_all, fields(stage = "verify", volumes = ids.len(), region = %self.region))]
    async fn run(&self, ids: Vec<VolumeId>) -> Result<VerificationReport, PipelineError> {
        if ids.is_empty() {
            tracing::info!("nothing to verify");
            return Ok(VerificationReport::default());
        }

        let attempted = ids.len();
        let outcomes: Vec<ItemOutcome> = stream::iter(ids)
            .map(|id| self.process(id))
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        if let Some(source) = systemic_failure(&outcomes) {
            tracing::error!(attempted, error = %source, "inventory unreachable for every volume");
            return Err(PipelineError::InventoryUnreachable { attempted, source });
        }

        let report = VerificationReport { outcomes };
        tracing::info!(
            notified = report.notified_count(),
            failed = report.failed_count(),
            "verification complete"
        );
        Ok(report)
    }

    async fn process(&self, volume_id: VolumeId) -> ItemOutcome {
        // Start -> Observed
        let descriptor = match self.observe(&volume_id).await {
            Ok(descriptor) => descriptor,
            Err(error) => {
                tracing::warn!(volume_id = %volume_id, error = %error, "verification query failed");
                return ItemOutcome::Failed {
                    volume_id,
                    failure: ItemFailure::Query(error),
                };
            }
        };
        let record = AuditRecord::observe(&descriptor, &self.region, Utc::now());

        // Observed -> Persisted
        let append = with_deadline(self.call_timeout, self.audit.append(&record), |timeout_ms| {
            PersistenceError::Timeout { timeout_ms }
        })
        .await;
        if let Err(error) = append {
            tracing::warn!(volume_id = %volume_id, error = %error, "audit write failed; not notifying");
            return ItemOutcome::Failed {
                volume_id,
                failure: ItemFailure::Persist(error),
            };
        }

        // Persisted -> Notified
        let notification = Notification::for_record(self.subject.as_str(), &record);
        let publish = with_deadline(
            self.call_timeout,
            self.notifier.publish(&notification),
            |timeout_ms| NotificationError::Timeout { timeout_ms },
        )
        .await;
        if let Err(error) = publish {
            tracing::warn!(
                volume_id = %volume_id,
                record_id = %record.record_id,
                error = %error,
                "notification failed; audit record kept"
            );
            return ItemOutcome::Failed {
                volume_id,
                failure: ItemFailure::Notify {
                    record_id: record.record_id,
                    error,
                },
            };
        }

        tracing::debug!(
            volume_id = %volume_id,
            status = %record.status,
            volume_type = %record.volume_type,
            "volume verified"
        );
        ItemOutcome::Notified { record }
    }

    async fn observe(&self, volume_id: &VolumeId) -> Result<VolumeDescriptor, QueryError> {
        let query = VolumeQuery::Ids(vec![volume_id.clone()]);
        let descriptors = with_deadline(
            self.call_timeout,
            self.inventory.describe_volumes(&query),
            |timeout_ms| QueryError::Timeout { timeout_ms },
        )
        .await?;

        if descriptors.is_empty() {
            return Err(QueryError::NotFound(volume_id.clone()));
        }
        descriptors
            .into_iter()
            .find(|d| d.volume_id == *volume_id)
            .ok_or_else(|| {
                QueryError::Malformed(format!("response did not describe {volume_id}"))
            })
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("region", &self.region)
            .field("subject", &self.subject)
            .field("max_in_flight", &self.max_in_flight)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// The shared systemic error when every item failed on it
fn systemic_failure(outcomes: &[ItemOutcome]) -> Option<QueryError> {
    let mut first = None;
    for outcome in outcomes {
        match outcome {
            ItemOutcome::Failed {
                failure: ItemFailure::Query(error),
                ..
            } if error.is_systemic() => {
                first.get_or_insert_with(|| error.clone());
            }
            _ => return None,
        }
    }
    first
}
