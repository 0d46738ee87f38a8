use pretty_assertions::assert_eq;
use std::sync::Arc;
use tiershift_core::{
    FleetClients, InMemoryNotifier, JsonlAuditStore, Pipeline, PipelineConfig, PipelineError,
    QueryError, SubmissionError, SubmissionStatus, Tier, VolumeId, VolumeState, VolumeStatus,
};
use tiershift_test_utils::{opted_in, volume, TestFleet};

fn id(s: &str) -> VolumeId {
    VolumeId::new(s)
}

fn mixed_fleet() -> TestFleet {
    TestFleet::new([
        opted_in("vol-a", "gp2"),
        volume("vol-b").opted_in().attached_to("i-0b").build(),
        opted_in("vol-c", "gp2"),
        volume("vol-d").opted_out().build(),
        opted_in("vol-e", "gp3"),
        volume("vol-f").build(),
    ])
}

#[tokio::test]
async fn test_end_to_end_run_completes_every_selected_volume() {
    let t = mixed_fleet();
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    let ids: Vec<&str> = report.volumes.iter().map(|v| v.volume_id.as_str()).collect();
    assert_eq!(ids, vec!["vol-a", "vol-b", "vol-c"]);
    assert_eq!(report.count(VolumeStatus::Completed), 3);
    assert_eq!(report.submission_status, SubmissionStatus::Submitted);
    assert!(!report.has_failures());

    // Changes are asynchronous: verification still sees the source tier
    let b = report.volume(&id("vol-b")).unwrap();
    assert_eq!(b.observed_tier, Some(Tier::new("gp2")));
    assert_eq!(b.observed_state, Some(VolumeState::InUse));
    assert_eq!(t.audit.records_for("vol-b")[0].instance_id, "i-0b");
    assert_eq!(t.fleet.pending_modifications().len(), 3);

    let published = t.notifier.published_for("vol-a");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "Volume Status Logged");
    assert_eq!(published[0].message, "Volume ID: vol-a, Status: available");
}

#[tokio::test]
async fn test_settled_fleet_is_not_selected_again() {
    let t = mixed_fleet();
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();
    pipeline.run().await.unwrap();

    assert_eq!(t.fleet.settle(), 3);
    let report = pipeline.run().await.unwrap();
    assert!(report.volumes.is_empty());

    let verification = pipeline
        .verifier()
        .verify_and_notify(["vol-a", "vol-c"])
        .await
        .unwrap();
    assert_eq!(verification.notified_count(), 2);
    let latest = t.audit.records_for("vol-a");
    assert_eq!(latest.len(), 2);
    assert!(latest.iter().any(|r| r.volume_type == Tier::new("gp3")));
}

#[tokio::test]
async fn test_rerun_before_settle_is_idempotent() {
    let t = mixed_fleet();
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    pipeline.run().await.unwrap();
    let second = pipeline.run().await.unwrap();

    assert_eq!(second.count(VolumeStatus::Completed), 3);
    assert_eq!(second.submission_status, SubmissionStatus::Submitted);
    assert_eq!(t.fleet.pending_modifications().len(), 3);
    // Every verification appends its own record
    assert_eq!(t.audit.records_for("vol-a").len(), 2);
}

#[tokio::test]
async fn test_rejected_volume_does_not_stop_the_batch() {
    let t = mixed_fleet();
    t.mutator.reject(
        "vol-a",
        SubmissionError::Rejected {
            reason: "unsupported".into(),
        },
    );
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.submission_status, SubmissionStatus::Partial);
    let a = report.volume(&id("vol-a")).unwrap();
    assert_eq!(a.status, VolumeStatus::SubmitFailed);
    assert_eq!(a.detail.as_deref(), Some("rejected: unsupported"));
    assert_eq!(report.count(VolumeStatus::Completed), 2);
    assert!(t.audit.records_for("vol-a").is_empty());
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_every_rejection_fails_the_submission() {
    let t = TestFleet::new([opted_in("vol-a", "gp2"), opted_in("vol-b", "gp2")]);
    for v in ["vol-a", "vol-b"] {
        t.mutator
            .reject(v, SubmissionError::Unavailable("throttled".into()));
    }
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.submission_status, SubmissionStatus::Failed);
    assert_eq!(report.count(VolumeStatus::SubmitFailed), 2);
    assert!(t.audit.records().is_empty());
    assert!(t.notifier.published().is_empty());
}

#[tokio::test]
async fn test_failed_audit_write_suppresses_notification() {
    let t = mixed_fleet();
    t.audit.fail_for("vol-b");
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.volume(&id("vol-b")).unwrap().status, VolumeStatus::VerifyFailed);
    assert!(t.notifier.published_for("vol-b").is_empty());
    assert_eq!(t.notifier.published_for("vol-a").len(), 1);
}

#[tokio::test]
async fn test_failed_notification_keeps_audit_record() {
    let t = mixed_fleet();
    t.notifier.fail_for("vol-c");
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    let c = report.volume(&id("vol-c")).unwrap();
    assert_eq!(c.status, VolumeStatus::NotifyFailed);
    let records = t.audit.records_for("vol-c");
    assert_eq!(records.len(), 1);
    assert_eq!(c.record_id, Some(records[0].record_id));
}

#[tokio::test]
async fn test_missing_volume_during_verification_is_isolated() {
    let t = mixed_fleet();
    t.inventory
        .fail_for("vol-c", QueryError::NotFound(id("vol-c")));
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.volume(&id("vol-c")).unwrap().status, VolumeStatus::VerifyFailed);
    assert_eq!(report.count(VolumeStatus::Completed), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_calls_become_item_failures() {
    let t = mixed_fleet();
    t.inventory.hang_for("vol-b");
    t.mutator.hang_for("vol-c");
    let config = PipelineConfig::new().with_call_timeout_secs(1);
    let pipeline = Pipeline::new(config, t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    let b = report.volume(&id("vol-b")).unwrap();
    assert_eq!(b.status, VolumeStatus::VerifyFailed);
    assert!(b.detail.as_deref().unwrap().contains("timed out after 1000ms"));
    let c = report.volume(&id("vol-c")).unwrap();
    assert_eq!(c.status, VolumeStatus::SubmitFailed);
    assert_eq!(
        report.volume(&id("vol-a")).unwrap().status,
        VolumeStatus::Completed
    );
}

#[tokio::test]
async fn test_inventory_outage_fails_the_run() {
    let t = mixed_fleet();
    t.inventory
        .set_outage(Some(QueryError::Unauthorized("expired token".into())));
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let result = pipeline.run().await;

    assert!(matches!(result, Err(PipelineError::Selection(QueryError::Unauthorized(_)))));
    assert!(t.mutator.calls().is_empty());
}

#[tokio::test]
async fn test_inventory_lost_after_submission_still_reports() {
    let t = mixed_fleet();
    for volume_id in ["vol-a", "vol-b", "vol-c"] {
        t.inventory
            .fail_for(volume_id, QueryError::Unavailable("region offline".into()));
    }
    let pipeline = Pipeline::new(PipelineConfig::new(), t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.submission_status, SubmissionStatus::Submitted);
    assert_eq!(report.count(VolumeStatus::VerifyFailed), 3);
    assert_eq!(t.fleet.pending_modifications().len(), 3);
    assert!(report
        .volume(&id("vol-b"))
        .unwrap()
        .detail
        .as_deref()
        .unwrap()
        .contains("region offline"));
    assert!(t.audit.records().is_empty());
    assert!(t.notifier.published().is_empty());
}

#[tokio::test]
async fn test_skipping_verification_leaves_submitted_volumes() {
    let t = mixed_fleet();
    let config = PipelineConfig::new().with_verify_after_submit(false);
    let pipeline = Pipeline::new(config, t.clients()).unwrap();

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.count(VolumeStatus::Submitted), 3);
    assert!(t.audit.records().is_empty());
}

#[tokio::test]
async fn test_audit_log_file_collects_every_observation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let t = mixed_fleet();
    let audit = Arc::new(JsonlAuditStore::open(&path).await.unwrap());
    let clients = FleetClients::new(
        t.inventory.clone(),
        t.mutator.clone(),
        audit,
        Arc::new(InMemoryNotifier::new()),
    );
    let pipeline = Pipeline::new(PipelineConfig::new().with_region("eu-west-1"), clients).unwrap();

    pipeline.run().await.unwrap();

    let mut records = JsonlAuditStore::read_all(&path).await.unwrap();
    records.sort_by(|a, b| a.volume_id.cmp(&b.volume_id));
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].volume_id, id("vol-a"));
    assert!(records.iter().all(|r| r.region == "eu-west-1"));
}
