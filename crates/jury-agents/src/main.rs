use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jury_agents::telemetry::init_tracing;
use jury_agents::{BillingSignal, FestivalAgent, JuryConfig};
use jury_consensus::{
    normalize, DecisionStats, DecisionStore, JsonFileStore, RawSubmission, SharedDecisionStore,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Multi-agent jury for film festival submissions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one submission (or a JSON array of them) and print the consensus
    Evaluate {
        /// JSON file holding a raw submission record or an array of records
        #[arg(long)]
        submission: PathBuf,

        /// TOML configuration (overridden by JURY_* environment variables)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Decision store to record results in; created if missing
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Print statistics over a decision store
    Stats {
        #[arg(long)]
        store: PathBuf,
    },
    /// Print the effective roster and agent-set version
    Roster {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubmissionFile {
    Many(Vec<RawSubmission>),
    One(RawSubmission),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Evaluate {
            submission,
            config,
            store,
        } => evaluate(&submission, config.as_deref(), store.as_deref()).await,
        Command::Stats { store } => stats(&store),
        Command::Roster { config } => roster(config.as_deref()),
    }
}

async fn evaluate(submission: &Path, config: Option<&Path>, store: Option<&Path>) -> Result<()> {
    let config = JuryConfig::load(config).context("Failed to load jury configuration")?;
    let raw = std::fs::read_to_string(submission)
        .with_context(|| format!("Failed to read {}", submission.display()))?;
    let records = match serde_json::from_str::<SubmissionFile>(&raw)
        .with_context(|| format!("Failed to parse {}", submission.display()))?
    {
        SubmissionFile::Many(records) => records,
        SubmissionFile::One(record) => vec![record],
    };

    let mut pipeline = config
        .build_pipeline(None)
        .context("Failed to build jury pipeline")?;
    let store: Option<SharedDecisionStore> = match store {
        Some(path) => Some(
            JsonFileStore::open(path)
                .with_context(|| format!("Failed to open decision store {}", path.display()))?
                .shared(),
        ),
        None => None,
    };
    if let Some(store) = &store {
        pipeline = pipeline
            .with_store(store.clone())
            .context("Failed to load recorded decisions")?;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling evaluation");
            ctrl_c.cancel();
        }
    });

    let version = pipeline.engine().agent_set_version().to_string();
    let mut reports = Vec::with_capacity(records.len());
    let mut failed = 0usize;
    for record in records {
        let submission_id = record.id.clone().unwrap_or_default();
        let mut shortlist = Vec::new();
        let outcome = match normalize(record) {
            Ok(submission) => {
                shortlist = FestivalAgent.shortlist(&submission);
                pipeline.evaluate(submission, &cancel).await
            }
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(outcome) => {
                info!(summary = %outcome.result.summary_line(), "Consensus");
                reports.push(serde_json::json!({
                    "result": outcome.result.as_ref(),
                    "festival_shortlist": shortlist,
                    "failures": outcome.failures,
                    "billing": outcome.billing_signal(),
                }));
            }
            Err(e) => {
                failed += 1;
                error!(submission_id = %submission_id, code = e.code(), error = %e, "Evaluation failed");
                reports.push(serde_json::json!({
                    "error": { "code": e.code(), "message": e.to_string(), "retriable": e.is_retriable() },
                    "billing": BillingSignal::not_produced(&submission_id, &version),
                }));
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);

    if let Some(store) = store {
        store.close().context("Failed to close decision store")?;
    }
    if failed > 0 {
        bail!("{} of {} submissions failed", failed, reports.len());
    }
    Ok(())
}

fn stats(path: &Path) -> Result<()> {
    let store = JsonFileStore::open_existing(path)
        .with_context(|| format!("Failed to open decision store {}", path.display()))?;
    let decisions = store.list().context("Failed to read decisions")?;
    let stats = DecisionStats::from_results(&decisions);
    info!("{}", stats.summary_line());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn roster(config: Option<&Path>) -> Result<()> {
    let config = JuryConfig::load(config).context("Failed to load jury configuration")?;
    let engine = jury_consensus::ConsensusEngine::with_config(
        config.effective_roster(),
        config.consensus.clone(),
    )
    .context("Invalid roster or consensus configuration")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "agent_set_version": engine.agent_set_version(),
            "roster": engine.roster(),
            "consensus": engine.config(),
            "agent_timeout_ms": config.agent_timeout_ms,
        }))?
    );
    Ok(())
}
