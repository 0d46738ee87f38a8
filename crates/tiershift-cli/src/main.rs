//! tiershift command-line driver
//!
//! Runs the migration stages against a fleet snapshot file, appending audit
//! records to a JSON-lines log and announcing them through `tracing`.

mod input;
mod snapshot;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tiershift_core::{
    ConversionRequestResult, FleetClients, InMemoryFleet, ItemOutcome, JsonlAuditStore, Pipeline,
    PipelineConfig, PipelineReport, Selector, SubmissionStatus, TracingNotifier,
    VerificationReport, VolumeId,
};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::snapshot::FleetSnapshot;

fn cli() -> Command {
    Command::new("tiershift")
        .version(tiershift_core::VERSION)
        .about("Bulk volume tier migration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("fleet")
                .long("fleet")
                .global(true)
                .default_value("fleet.json")
                .value_parser(value_parser!(PathBuf))
                .help("Fleet snapshot file"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration (TOML)"),
        )
        .arg(
            Arg::new("audit-log")
                .long("audit-log")
                .global(true)
                .default_value("tiershift-audit.jsonl")
                .value_parser(value_parser!(PathBuf))
                .help("JSON-lines audit log to append to"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON on stderr"),
        )
        .subcommand(Command::new("select").about("List volumes eligible for migration"))
        .subcommand(
            Command::new("convert").about("Select volumes and submit tier changes"),
        )
        .subcommand(
            Command::new("verify")
                .about("Observe, record and announce volume state")
                .arg(
                    Arg::new("volume")
                        .num_args(0..)
                        .help("Volume IDs; read JSON from --input when omitted"),
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .default_value("-")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON volume, ID, list or convert output ('-' for stdin)"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Select, submit and verify in one pass")
                .arg(
                    Arg::new("no-verify")
                        .long("no-verify")
                        .action(ArgAction::SetTrue)
                        .help("Stop after submitting"),
                ),
        )
        .subcommand(
            Command::new("settle").about("Apply every pending tier change in the snapshot"),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let Some((name, args)) = matches.subcommand() else {
        return;
    };
    init_logging(args.get_flag("log-json"));

    match dispatch(name, args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Returns whether every volume succeeded
async fn dispatch(name: &str, args: &ArgMatches) -> anyhow::Result<bool> {
    let session = Session::open(args).await?;
    match name {
        "select" => session.select().await,
        "convert" => session.convert().await,
        "verify" => {
            let ids = verify_input(args).await?;
            session.verify(ids).await
        }
        "run" => session.run(!args.get_flag("no-verify")).await,
        "settle" => session.settle().await,
        other => anyhow::bail!("unknown command {other}"),
    }
}

struct Session {
    fleet_path: PathBuf,
    fleet: Arc<InMemoryFleet>,
    config: PipelineConfig,
    audit_log: PathBuf,
    json: bool,
}

impl Session {
    async fn open(args: &ArgMatches) -> anyhow::Result<Self> {
        let fleet_path = args
            .get_one::<PathBuf>("fleet")
            .cloned()
            .context("--fleet is required")?;
        let audit_log = args
            .get_one::<PathBuf>("audit-log")
            .cloned()
            .context("--audit-log is required")?;
        let config = match args.get_one::<PathBuf>("config") {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::new(),
        };
        let fleet = FleetSnapshot::load(&fleet_path).await?.into_fleet();
        tracing::debug!(path = %fleet_path.display(), volumes = fleet.len(), "fleet loaded");

        Ok(Self {
            fleet_path,
            fleet: Arc::new(fleet),
            config,
            audit_log,
            json: args.get_flag("json"),
        })
    }

    async fn pipeline(&self, config: PipelineConfig) -> anyhow::Result<Pipeline> {
        let audit = JsonlAuditStore::open(&self.audit_log)
            .await
            .with_context(|| format!("opening audit log {}", self.audit_log.display()))?;
        let clients = FleetClients::new(
            self.fleet.clone(),
            self.fleet.clone(),
            Arc::new(audit),
            Arc::new(TracingNotifier),
        );
        Ok(Pipeline::new(config, clients)?)
    }

    async fn persist(&self) -> anyhow::Result<()> {
        FleetSnapshot::from_fleet(&self.fleet)
            .save(&self.fleet_path)
            .await
    }

    async fn select(&self) -> anyhow::Result<bool> {
        self.config.validate()?;
        let records = Selector::new(self.fleet.clone())
            .with_call_timeout(self.config.call_timeout())
            .select(&self.config.selection_filter())
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else {
            for record in &records {
                println!("{}\t{}", record.volume_id, record.availability_zone);
            }
            println!("{} volumes selected", records.len());
        }
        Ok(true)
    }

    async fn convert(&self) -> anyhow::Result<bool> {
        let pipeline = self.pipeline(self.config.clone()).await?;
        let records = pipeline
            .selector()
            .select(&self.config.selection_filter())
            .await?;
        let result = pipeline.converter().submit(records).await;
        self.persist().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&conversion_json(&result))?);
        } else {
            for failed in &result.failed {
                println!("{}\tfailed\t{}", failed.volume_id, failed.error);
            }
            for skipped in &result.skipped {
                println!("{}\tskipped\t{}", skipped.volume_id, skipped.reason);
            }
            println!(
                "{}: {} accepted, {} skipped, {} failed",
                result.status,
                result.volume_ids.len(),
                result.skipped.len(),
                result.failed.len()
            );
        }
        Ok(result.status == SubmissionStatus::Submitted)
    }

    async fn verify(&self, ids: Vec<VolumeId>) -> anyhow::Result<bool> {
        let pipeline = self.pipeline(self.config.clone()).await?;
        let report = pipeline.verifier().verify_and_notify(ids).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&verification_json(&report))?);
        } else {
            for outcome in &report.outcomes {
                match outcome {
                    ItemOutcome::Notified { record } => println!(
                        "{}\t{}\t{}\t{}",
                        record.volume_id, record.status, record.volume_type, record.record_id
                    ),
                    ItemOutcome::Failed { volume_id, failure } => {
                        println!("{volume_id}\tfailed\t{failure}");
                    }
                }
            }
            println!(
                "{} notified, {} failed",
                report.notified_count(),
                report.failed_count()
            );
        }
        Ok(report.failed_count() == 0)
    }

    async fn run(&self, verify: bool) -> anyhow::Result<bool> {
        let config = self.config.clone().with_verify_after_submit(verify);
        let pipeline = self.pipeline(config).await?;
        let report = pipeline.run().await?;
        self.persist().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(!report.has_failures())
    }

    async fn settle(&self) -> anyhow::Result<bool> {
        let settled = self.fleet.settle();
        self.persist().await?;
        if self.json {
            println!("{}", json!({ "settled": settled }));
        } else {
            println!("{settled} volumes settled");
        }
        Ok(true)
    }
}

async fn verify_input(args: &ArgMatches) -> anyhow::Result<Vec<VolumeId>> {
    if let Some(ids) = args.get_many::<String>("volume") {
        return Ok(ids.map(VolumeId::new).collect());
    }
    let text = match args.get_one::<PathBuf>("input") {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        _ => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("reading stdin")?;
            text
        }
    };
    input::parse_volume_ids(&text)
}

fn conversion_json(result: &ConversionRequestResult) -> serde_json::Value {
    json!({
        "status": result.status,
        "volume_ids": result.volume_ids,
        "skipped": result.skipped,
        "failed": result
            .failed
            .iter()
            .map(|f| json!({ "volume_id": f.volume_id, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
    })
}

fn verification_json(report: &VerificationReport) -> serde_json::Value {
    let outcomes: Vec<_> = report
        .outcomes
        .iter()
        .map(|outcome| match outcome {
            ItemOutcome::Notified { record } => json!({
                "volume_id": record.volume_id,
                "outcome": "notified",
                "record": record,
            }),
            ItemOutcome::Failed { volume_id, failure } => json!({
                "volume_id": volume_id,
                "outcome": "failed",
                "error": failure.to_string(),
            }),
        })
        .collect();
    json!({
        "notified": report.notified_count(),
        "failed": report.failed_count(),
        "outcomes": outcomes,
    })
}

fn print_report(report: &PipelineReport) {
    for volume in &report.volumes {
        println!(
            "{:<24} {:<26} {}",
            volume.volume_id.as_str(),
            volume.status.as_str(),
            volume.detail.as_deref().unwrap_or("")
        );
    }
    let counts: Vec<String> = report
        .counts()
        .iter()
        .map(|(status, n)| format!("{status}={n}"))
        .collect();
    println!(
        "run {} ({}): {} volumes [{}]",
        report.run_id,
        report.submission_status,
        report.volumes.len(),
        counts.join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["tiershift", "run", "--fleet", "f.json", "--json", "--no-verify"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(args.get_one::<PathBuf>("fleet"), Some(&PathBuf::from("f.json")));
        assert!(args.get_flag("json"));
        assert!(args.get_flag("no-verify"));
    }

    #[tokio::test]
    async fn test_verify_prefers_positional_ids() {
        let matches = cli()
            .try_get_matches_from(["tiershift", "verify", "vol-1", "vol-2"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let ids = verify_input(args).await.unwrap();
        assert_eq!(ids, vec![VolumeId::new("vol-1"), VolumeId::new("vol-2")]);
    }

    #[tokio::test]
    async fn test_run_then_settle_against_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = dir.path().join("fleet.json");
        let audit = dir.path().join("audit.jsonl");
        tokio::fs::write(
            &fleet,
            r#"{"volumes": [{
                "volume_id": "vol-1", "volume_type": "gp2", "size_gib": 8,
                "availability_zone": "az-1", "state": "available",
                "tags": {"AutoConvert": "true"}
            }]}"#,
        )
        .await
        .unwrap();
        let argv = |cmd: &str| {
            vec![
                "tiershift".to_string(),
                cmd.to_string(),
                "--fleet".to_string(),
                fleet.display().to_string(),
                "--audit-log".to_string(),
                audit.display().to_string(),
            ]
        };

        let matches = cli().try_get_matches_from(argv("run")).unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert!(dispatch(name, args).await.unwrap());
        let pending = FleetSnapshot::load(&fleet).await.unwrap();
        assert!(pending.volumes[0].modification.is_some());
        assert_eq!(JsonlAuditStore::read_all(&audit).await.unwrap().len(), 1);

        let matches = cli().try_get_matches_from(argv("settle")).unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert!(dispatch(name, args).await.unwrap());
        let settled = FleetSnapshot::load(&fleet).await.unwrap();
        assert_eq!(settled.volumes[0].volume_type.as_str(), "gp3");
        assert!(settled.volumes[0].modification.is_none());
    }

    #[tokio::test]
    async fn test_select_leaves_no_audit_log_behind() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = dir.path().join("fleet.json");
        let audit = dir.path().join("audit.jsonl");
        tokio::fs::write(
            &fleet,
            r#"{"volumes": [{
                "volume_id": "vol-1", "volume_type": "gp2", "size_gib": 8,
                "availability_zone": "az-1", "state": "available",
                "tags": {"AutoConvert": "true"}
            }]}"#,
        )
        .await
        .unwrap();
        let before = tokio::fs::read_to_string(&fleet).await.unwrap();

        let matches = cli()
            .try_get_matches_from([
                "tiershift".to_string(),
                "select".to_string(),
                "--fleet".to_string(),
                fleet.display().to_string(),
                "--audit-log".to_string(),
                audit.display().to_string(),
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert!(dispatch(name, args).await.unwrap());

        assert!(!audit.exists());
        assert_eq!(tokio::fs::read_to_string(&fleet).await.unwrap(), before);
    }
}
