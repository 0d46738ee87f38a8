//! External collaborators
//!
//! The pipeline talks to the fleet, the audit store and the notification
//! channel only through these traits. Implementations are injected as
//! `Arc<dyn _>` handles bundled in [`FleetClients`].

use crate::error::{NotificationError, PersistenceError, QueryError, SubmissionError};
use crate::filter::SelectionFilter;
use crate::types::{AuditRecord, Notification, Tier, VolumeDescriptor, VolumeId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Inventory lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeQuery {
    /// Every volume matching the filter
    Filter(SelectionFilter),
    /// Specific volumes by ID
    Ids(Vec<VolumeId>),
}

/// Fleet inventory query service
#[async_trait::async_trait]
pub trait FleetInventory: Send + Sync {
    /// Describe volumes matching the query
    ///
    /// Unknown IDs are omitted from the result rather than reported as errors.
    async fn describe_volumes(&self, query: &VolumeQuery)
        -> Result<Vec<VolumeDescriptor>, QueryError>;
}

/// Fleet mutation service
///
/// `Ok(())` means the fleet accepted the request; the tier change itself
/// completes later and must be observed through [`FleetInventory`].
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FleetMutator: Send + Sync {
    /// Request a tier change
    async fn modify_volume_tier(
        &self,
        volume_id: &VolumeId,
        target_tier: &Tier,
    ) -> Result<(), SubmissionError>;
}

/// Durable append-only audit store
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert one record keyed by its record ID
    async fn append(&self, record: &AuditRecord) -> Result<(), PersistenceError>;
}

/// Notification channel
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a message; delivery is not confirmed
    async fn publish(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Client handles for one pipeline run
///
/// Created once per run by the caller and dropped when the run completes.
#[derive(Clone)]
pub struct FleetClients {
    /// Inventory reads
    pub inventory: Arc<dyn FleetInventory>,
    /// Tier-change submissions
    pub mutator: Arc<dyn FleetMutator>,
    /// Audit persistence
    pub audit: Arc<dyn AuditStore>,
    /// Notification channel
    pub notifier: Arc<dyn Notifier>,
}

impl FleetClients {
    /// Bundle client handles
    #[inline]
    #[must_use]
    pub fn new(
        inventory: Arc<dyn FleetInventory>,
        mutator: Arc<dyn FleetMutator>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inventory,
            mutator,
            audit,
            notifier,
        }
    }
}

impl std::fmt::Debug for FleetClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetClients").finish_non_exhaustive()
    }
}

/// Run an external call under a deadline
///
/// On expiry the future is dropped and `on_timeout` builds the error from
/// the deadline in milliseconds.
pub(crate) async fn with_deadline<T, E, F>(
    deadline: Duration,
    call: F,
    on_timeout: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(
            u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_passes_result_through() {
        let result: Result<u8, QueryError> = with_deadline(
            Duration::from_secs(1),
            async { Ok(7) },
            |timeout_ms| QueryError::Timeout { timeout_ms },
        )
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_converts_hang_into_error() {
        let result: Result<u8, QueryError> = with_deadline(
            Duration::from_millis(250),
            std::future::pending(),
            |timeout_ms| QueryError::Timeout { timeout_ms },
        )
        .await;
        assert_eq!(result, Err(QueryError::Timeout { timeout_ms: 250 }));
    }
}
