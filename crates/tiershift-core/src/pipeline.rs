//! Pipeline orchestrator
//!
//! Runs Select -> Submit -> Verify/Notify in strict order over one set of
//! injected clients and folds every stage's per-volume outcome into a
//! single [`PipelineReport`].

use crate::config::PipelineConfig;
use crate::converter::{ConversionRequestResult, Converter, SubmissionStatus};
use crate::error::{ConfigError, PipelineError, QueryError};
use crate::ports::FleetClients;
use crate::selector::Selector;
use crate::types::{RecordId, RunId, Tier, VolumeId, VolumeRecord, VolumeState};
use crate::verifier::{ItemFailure, ItemOutcome, VerificationReport, Verifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Final status of one volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeStatus {
    /// Request accepted; not verified in this run
    Submitted,
    /// Nothing to submit; not verified in this run
    SkippedAlreadyConverted,
    /// Request rejected
    SubmitFailed,
    /// Observation or audit write failed
    VerifyFailed,
    /// Recorded but not announced
    NotifyFailed,
    /// Observed, recorded and announced
    Completed,
}

impl VolumeStatus {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeStatus::Submitted => "submitted",
            VolumeStatus::SkippedAlreadyConverted => "skipped-already-converted",
            VolumeStatus::SubmitFailed => "submit-failed",
            VolumeStatus::VerifyFailed => "verify-failed",
            VolumeStatus::NotifyFailed => "notify-failed",
            VolumeStatus::Completed => "completed",
        }
    }

    /// Whether this status is a failure
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            VolumeStatus::SubmitFailed | VolumeStatus::VerifyFailed | VolumeStatus::NotifyFailed
        )
    }
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-volume line of the pipeline report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeReport {
    /// Volume ID
    pub volume_id: VolumeId,
    /// Locality identifier from selection
    pub availability_zone: String,
    /// Final status
    pub status: VolumeStatus,
    /// Failure or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Audit record written for this volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    /// Tier observed during verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_tier: Option<Tier>,
    /// Lifecycle state observed during verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_state: Option<VolumeState>,
}

impl VolumeReport {
    fn new(record: &VolumeRecord, status: VolumeStatus) -> Self {
        Self {
            volume_id: record.volume_id.clone(),
            availability_zone: record.availability_zone.clone(),
            status,
            detail: None,
            record_id: None,
            observed_tier: None,
            observed_state: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result of a whole pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Run identifier
    pub run_id: RunId,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Converter batch status
    pub submission_status: SubmissionStatus,
    /// One entry per selected volume, ordered by volume ID
    pub volumes: Vec<VolumeReport>,
}

impl PipelineReport {
    /// Number of volumes with the given status
    #[must_use]
    pub fn count(&self, status: VolumeStatus) -> usize {
        self.volumes.iter().filter(|v| v.status == status).count()
    }

    /// Counts per status, only for statuses present
    #[must_use]
    pub fn counts(&self) -> BTreeMap<VolumeStatus, usize> {
        let mut counts = BTreeMap::new();
        for volume in &self.volumes {
            *counts.entry(volume.status).or_insert(0) += 1;
        }
        counts
    }

    /// Whether any volume failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.volumes.iter().any(|v| v.status.is_failure())
    }

    /// Entry for a volume
    #[must_use]
    pub fn volume(&self, volume_id: &VolumeId) -> Option<&VolumeReport> {
        self.volumes.iter().find(|v| v.volume_id == *volume_id)
    }
}

/// Three-stage migration pipeline
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    selector: Selector,
    converter: Converter,
    verifier: Verifier,
}

impl Pipeline {
    /// Build the stages over the given clients
    ///
    /// # Errors
    /// The configuration fails validation.
    pub fn new(config: PipelineConfig, clients: FleetClients) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = config.call_timeout();

        let selector = Selector::new(clients.inventory.clone()).with_call_timeout(timeout);
        let converter = Converter::new(clients.mutator, config.target_tier.clone())
            .with_max_in_flight(config.max_in_flight)
            .with_call_timeout(timeout);
        let verifier = Verifier::new(
            clients.inventory,
            clients.audit,
            clients.notifier,
            config.region.as_str(),
        )
        .with_subject(config.notification_subject.as_str())
        .with_max_in_flight(config.max_in_flight)
        .with_call_timeout(timeout);

        Ok(Self {
            config,
            selector,
            converter,
            verifier,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Selector stage
    #[inline]
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Converter stage
    #[inline]
    #[must_use]
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Verifier/Notifier stage
    #[inline]
    #[must_use]
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Run all three stages
    ///
    /// Volumes whose submission failed are not verified. Accepted and
    /// skipped volumes are verified when `verify_after_submit` is set.
    ///
    /// # Errors
    /// Selection failure only. Per-volume failures, including an inventory
    /// that became unreachable after submission, are reported, never
    /// returned.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        tracing::info!(
            run_id = %run_id,
            source = %self.config.source_tier,
            target = %self.config.target_tier,
            "pipeline run started"
        );

        let records = self.selector.select(&self.config.selection_filter()).await?;
        let conversion = self.converter.submit(records.clone()).await;

        let verification = if self.config.verify_after_submit {
            let ids = conversion.ids_to_verify();
            match self.verifier.verify_and_notify(ids.clone()).await {
                Ok(report) => Some(report),
                // Submissions already landed
                Err(PipelineError::InventoryUnreachable { source, .. }) => {
                    tracing::warn!(
                        run_id = %run_id,
                        error = %source,
                        "inventory unreachable during verification; marking volumes verify-failed"
                    );
                    Some(unreachable_report(ids, &source))
                }
                Err(error) => return Err(error),
            }
        } else {
            None
        };

        let volumes = assemble(&records, &conversion, verification.as_ref());
        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            submission_status: conversion.status,
            volumes,
        };

        tracing::info!(
            run_id = %run_id,
            volumes = report.volumes.len(),
            completed = report.count(VolumeStatus::Completed),
            failed = report.volumes.iter().filter(|v| v.status.is_failure()).count(),
            "pipeline run finished"
        );
        Ok(report)
    }
}

/// Fold stage results into one line per selected volume
fn assemble(
    records: &[VolumeRecord],
    conversion: &ConversionRequestResult,
    verification: Option<&VerificationReport>,
) -> Vec<VolumeReport> {
    let failed: HashMap<&VolumeId, String> = conversion
        .failed
        .iter()
        .map(|f| (&f.volume_id, f.error.to_string()))
        .collect();
    let skipped: HashMap<&VolumeId, String> = conversion
        .skipped
        .iter()
        .map(|s| (&s.volume_id, s.reason.to_string()))
        .collect();
    let outcomes: HashMap<&VolumeId, &ItemOutcome> = verification
        .map(|v| v.outcomes.iter().map(|o| (o.volume_id(), o)).collect())
        .unwrap_or_default();

    let mut volumes: Vec<VolumeReport> = records
        .iter()
        .map(|record| {
            let id = &record.volume_id;
            if let Some(reason) = failed.get(id) {
                return VolumeReport::new(record, VolumeStatus::SubmitFailed).with_detail(reason);
            }
            match outcomes.get(id) {
                Some(outcome) => verified(record, outcome),
                None => match skipped.get(id) {
                    Some(reason) => {
                        VolumeReport::new(record, VolumeStatus::SkippedAlreadyConverted)
                            .with_detail(reason)
                    }
                    None => VolumeReport::new(record, VolumeStatus::Submitted),
                },
            }
        })
        .collect();
    volumes.sort_by(|a, b| a.volume_id.cmp(&b.volume_id));
    volumes
}

/// Every volume failed verification on the same systemic error
fn unreachable_report(ids: Vec<VolumeId>, source: &QueryError) -> VerificationReport {
    VerificationReport {
        outcomes: ids
            .into_iter()
            .map(|volume_id| ItemOutcome::Failed {
                volume_id,
                failure: ItemFailure::Query(source.clone()),
            })
            .collect(),
    }
}

fn verified(record: &VolumeRecord, outcome: &ItemOutcome) -> VolumeReport {
    match outcome {
        ItemOutcome::Notified { record: audit } => {
            let mut report = VolumeReport::new(record, VolumeStatus::Completed);
            report.record_id = Some(audit.record_id);
            report.observed_tier = Some(audit.volume_type.clone());
            report.observed_state = Some(audit.status);
            report
        }
        ItemOutcome::Failed { failure, .. } => {
            let status = match failure {
                ItemFailure::Query(_) | ItemFailure::Persist(_) => VolumeStatus::VerifyFailed,
                ItemFailure::Notify { .. } => VolumeStatus::NotifyFailed,
            };
            let mut report = VolumeReport::new(record, status).with_detail(failure.to_string());
            if let ItemFailure::Notify { record_id, .. } = failure {
                report.record_id = Some(*record_id);
            }
            report
        }
    }
}
