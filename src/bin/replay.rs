//! Historical replay CLI: runs the detection pipeline against a block
//! range with ground truth from the subgraph and writes JSONL artifacts.
//!
//! Exit codes: 0 success, 1 fatal error (including replay input
//! validation errors), matching the CLI exit-code contract.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::InMemorySubgraphClient;
use liquidator_chain::multicall::MicroVerifier;
use liquidator_core::candidate::{CandidateSet, CandidateSetConfig};
use liquidator_core::config::EngineConfig;
use liquidator_core::replay::{
    index_by_user, parse_block_range, GroundTruthConfig, GroundTruthLoader, ReplayController,
    ReplayControllerConfig, UniverseBuilder,
};

fn print_banner() {
    println!("liquidation-engine replay harness");
}

#[tokio::main]
async fn main() {
    print_banner();
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    if let Err(err) = run().await {
        error!(%err, "replay run failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = EngineConfig::from_env();

    let raw_range = config
        .replay
        .block_range
        .clone()
        .context("REPLAY_BLOCK_RANGE must be set (format \"start-end\") to run the replay harness")?;

    let range = parse_block_range(&raw_range)
        .map_err(|e| anyhow::anyhow!("invalid REPLAY_BLOCK_RANGE {raw_range:?}: {e}"))?;

    info!(
        start = range.start,
        end = range.end,
        count = range.count(),
        "parsed replay block range"
    );

    // The live subgraph GraphQL client is an out-of-scope external
    // collaborator; replay runs against the documented in-memory
    // stand-in until a concrete client is wired in by the caller.
    let subgraph = Arc::new(InMemorySubgraphClient::new(Vec::new(), Vec::new()));

    let ground_truth_loader = GroundTruthLoader::new(GroundTruthConfig::default(), subgraph);
    let ground_truth = ground_truth_loader.load(0, u64::MAX).await;
    if ground_truth.partial {
        warn!(
            error = ?ground_truth.error,
            "ground truth load returned partial data, proceeding with what was collected"
        );
    }
    let ground_truth_available = !ground_truth.events.is_empty();
    info!(
        events = ground_truth.events.len(),
        ground_truth_available, "ground truth loaded"
    );

    let candidate_set = Arc::new(CandidateSet::new(CandidateSetConfig {
        max_accounts_per_block: config.replay.max_accounts_per_block,
        ..CandidateSetConfig::default()
    }));
    UniverseBuilder::seed(&candidate_set, &ground_truth.events, range.start);

    if candidate_set.is_empty() {
        bail!(
            "no ground-truth users to seed the replay universe over [{}, {}]; \
             nothing to replay",
            range.start,
            range.end
        );
    }

    let verifier = Arc::new(MicroVerifier::new(
        config.ambient.rpc_http_url.clone(),
        config.ambient.pool_address,
        config.ambient.multicall3_address,
        Default::default(),
    ));

    let mut controller = ReplayController::new(
        ReplayControllerConfig {
            hf_threshold: config.detection.execution_hf_threshold_bps as f64 / 10_000.0,
        },
        candidate_set,
        verifier,
        index_by_user(&ground_truth.events),
    );

    let started = Instant::now();
    let reporter = controller.run(range).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let summary = reporter.build_summary(
        ground_truth.events.len(),
        duration_ms,
        ground_truth_available,
        ground_truth.partial,
    );

    info!(
        detected = summary.detected,
        missed = summary.missed,
        coverage = summary.coverage_ratio,
        duration_ms,
        "replay complete"
    );

    let output_dir = PathBuf::from(&config.replay.output_dir);
    reporter
        .flush(&output_dir, summary)
        .await
        .with_context(|| format!("failed writing replay artifacts to {output_dir:?}"))?;

    info!(output_dir = %output_dir.display(), "replay artifacts written");

    Ok(())
}
