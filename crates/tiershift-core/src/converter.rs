//! Converter stage
//!
//! Submits one fire-and-forget tier-change request per selected volume.
//! Requests run concurrently inside a bounded in-flight window, and each
//! volume's outcome is classified independently:
//! - accepted by the fleet
//! - skipped because there is nothing to do (already converted or converting)
//! - failed with a typed [`SubmissionError`]

use crate::error::SubmissionError;
use crate::ports::{with_deadline, FleetMutator};
use crate::types::{Tier, VolumeId, VolumeRecord};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Coarse submission status of a batch (never a completion status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// No volume failed
    Submitted,
    /// Some volumes failed, others succeeded
    Partial,
    /// Every volume failed
    Failed,
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Partial => "partial",
            SubmissionStatus::Failed => "failed",
        })
    }
}

/// Why a volume needed no request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already on the target tier
    AlreadyAtTarget,
    /// An earlier modification is still running
    ModificationInProgress,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SkipReason::AlreadyAtTarget => "already at target tier",
            SkipReason::ModificationInProgress => "modification already in progress",
        })
    }
}

/// Volume classified as a no-op success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedVolume {
    /// Volume ID
    pub volume_id: VolumeId,
    /// Classification
    pub reason: SkipReason,
}

/// Volume whose request was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSubmission {
    /// Volume ID
    pub volume_id: VolumeId,
    /// Rejection
    pub error: SubmissionError,
}

/// Aggregate result of a submission batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequestResult {
    /// Batch status
    pub status: SubmissionStatus,
    /// Volumes whose request the fleet accepted
    pub volume_ids: Vec<VolumeId>,
    /// Volumes that needed no request
    pub skipped: Vec<SkippedVolume>,
    /// Volumes whose request failed
    pub failed: Vec<FailedSubmission>,
}

impl ConversionRequestResult {
    /// Neutral result for an empty batch
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: SubmissionStatus::Submitted,
            volume_ids: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Number of volumes in the batch
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.volume_ids.len() + self.skipped.len() + self.failed.len()
    }

    /// Whether the batch was empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Volumes worth observing afterwards: accepted and skipped
    #[must_use]
    pub fn ids_to_verify(&self) -> Vec<VolumeId> {
        self.volume_ids
            .iter()
            .cloned()
            .chain(self.skipped.iter().map(|s| s.volume_id.clone()))
            .collect()
    }

    fn from_outcomes(outcomes: Vec<SubmitOutcome>) -> Self {
        let mut result = Self::empty();
        for outcome in outcomes {
            match outcome {
                SubmitOutcome::Accepted(id) => result.volume_ids.push(id),
                SubmitOutcome::Skipped(skipped) => result.skipped.push(skipped),
                SubmitOutcome::Failed(failed) => result.failed.push(failed),
            }
        }
        result.status = if result.failed.is_empty() {
            SubmissionStatus::Submitted
        } else if result.failed.len() == result.total() {
            SubmissionStatus::Failed
        } else {
            SubmissionStatus::Partial
        };
        result
    }
}

enum SubmitOutcome {
    Accepted(VolumeId),
    Skipped(SkippedVolume),
    Failed(FailedSubmission),
}

/// Tier-change submitter
pub struct Converter {
    mutator: Arc<dyn FleetMutator>,
    target_tier: Tier,
    max_in_flight: usize,
    call_timeout: Duration,
}

impl Converter {
    /// Create converter
    #[inline]
    #[must_use]
    pub fn new(mutator: Arc<dyn FleetMutator>, target_tier: Tier) -> Self {
        Self {
            mutator,
            target_tier,
            max_in_flight: 16,
            call_timeout: Duration::from_secs(30),
        }
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

    /// Target tier
    #[inline]
    #[must_use]
    pub fn target_tier(&self) -> &Tier {
        &self.target_tier
    }

    /// Submit a tier change for every record
    ///
    /// Never fails as a whole: each volume's rejection is recorded in the
    /// result and the remaining volumes are still submitted.
    #[tracing::instrument(name = "submit", skip_all, fields(stage = "submit", volumes = records.len(), target = %self.target_tier))]
    pub async fn submit(&self, records: Vec<VolumeRecord>) -> ConversionRequestResult {
        if records.is_empty() {
            tracing::info!("nothing to submit");
            return ConversionRequestResult::empty();
        }

        let outcomes: Vec<SubmitOutcome> = stream::iter(records)
            .map(|record| self.submit_one(record.volume_id))
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let result = ConversionRequestResult::from_outcomes(outcomes);
        tracing::info!(
            status = %result.status,
            accepted = result.volume_ids.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "submission complete"
        );
        result
    }

    async fn submit_one(&self, volume_id: VolumeId) -> SubmitOutcome {
        let call = self.mutator.modify_volume_tier(&volume_id, &self.target_tier);
        let result = with_deadline(self.call_timeout, call, |timeout_ms| {
            SubmissionError::Timeout { timeout_ms }
        })
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(volume_id = %volume_id, "tier change accepted");
                SubmitOutcome::Accepted(volume_id)
            }
            Err(SubmissionError::AlreadyAtTier { .. }) => {
                tracing::debug!(volume_id = %volume_id, "already at target tier");
                SubmitOutcome::Skipped(SkippedVolume {
                    volume_id,
                    reason: SkipReason::AlreadyAtTarget,
                })
            }
            Err(SubmissionError::ModificationInProgress) => {
                tracing::debug!(volume_id = %volume_id, "modification already in progress");
                SubmitOutcome::Skipped(SkippedVolume {
                    volume_id,
                    reason: SkipReason::ModificationInProgress,
                })
            }
            Err(error) => {
                tracing::warn!(volume_id = %volume_id, error = %error, "tier change rejected");
                SubmitOutcome::Failed(FailedSubmission { volume_id, error })
            }
        }
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("target_tier", &self.target_tier)
            .field("max_in_flight", &self.max_in_flight)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}
