//! Presence-Crypto CLI
//!
//! Demonstrates the full activity-threshold proof flow against the native
//! reference backend: assemble a witness from raw activity timestamps,
//! generate a proof (artifacts flowing through the versioned cache), verify
//! it, and inspect or invalidate the cache.
//!
//! Run with: cargo run --release -- demo --days 5 --threshold 3

use clap::{ArgAction, Parser, Subcommand};
use presence_crypto::{
    api::{ActivityProver, CircuitSpec},
    backend::{NativeBackend, NativeSetup},
    cache::ArtifactCache,
    witness::{assemble_witness, PublicInputs},
    ProofRecord,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory for the persistent artifact cache
    #[arg(long, default_value = "artifact-cache")]
    cache_dir: PathBuf,

    /// Increase output verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a proof from a JSON file of activity timestamps
    Prove {
        /// JSON array of unix timestamps, one per active day
        #[arg(long)]
        activity: PathBuf,

        /// Minimum number of distinct active days to claim
        #[arg(long)]
        threshold: u64,

        /// Freshness timestamp (defaults to now)
        #[arg(long)]
        freshness: Option<u64>,

        /// Where to write the proof record JSON
        #[arg(long, default_value = "proof.json")]
        out: PathBuf,
    },

    /// Verify a proof record produced by `prove`
    Verify {
        /// Proof record JSON file
        #[arg(long)]
        record: PathBuf,
    },

    /// End-to-end demo with synthetic activity
    Demo {
        /// Number of distinct active days to synthesize
        #[arg(long, default_value_t = 5)]
        days: u64,

        /// Threshold to prove against
        #[arg(long, default_value_t = 3)]
        threshold: u64,
    },

    /// Print per-kind artifact cache statistics
    CacheStats,

    /// Drop every cached artifact for a circuit
    Invalidate {
        #[arg(long, default_value = "activity-threshold")]
        circuit_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let spec = CircuitSpec::activity_default();

    match cli.command {
        Command::Prove {
            activity,
            threshold,
            freshness,
            out,
        } => {
            let raw = std::fs::read_to_string(&activity)?;
            let values: Vec<u64> = serde_json::from_str(&raw)?;
            let freshness = freshness.unwrap_or_else(now_secs);

            let record =
                prove(&cli.cache_dir, &spec, &values, threshold, freshness).await?;

            std::fs::write(&out, serde_json::to_string_pretty(&record)?)?;
            info!(
                record_id = %record.id,
                out = %out.display(),
                meets_threshold = record.proof.meets_threshold().unwrap_or(false),
                "proof record written"
            );
        }

        Command::Verify { record } => {
            let raw = std::fs::read_to_string(&record)?;
            let record: ProofRecord = serde_json::from_str(&raw)?;
            verify(&cli.cache_dir, &record).await?;
        }

        Command::Demo { days, threshold } => {
            let start = now_secs();
            let values: Vec<u64> = (0..days).map(|i| start - i * 86_400).collect();

            info!("[1/3] Assembling witness for {days} synthetic active days");
            let record = prove(&cli.cache_dir, &spec, &values, threshold, start).await?;

            info!("[2/3] Proof generated: record {}", record.id);
            info!(
                "      meets_threshold = {}",
                record.proof.meets_threshold().unwrap_or(false)
            );

            info!("[3/3] Verifying");
            verify(&cli.cache_dir, &record).await?;
        }

        Command::CacheStats => {
            let cache = ArtifactCache::open(&cli.cache_dir).await?;
            let stats = cache.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Invalidate { circuit_id } => {
            let cache = ArtifactCache::open(&cli.cache_dir).await?;
            cache.invalidate_circuit(&circuit_id).await?;
            info!(circuit_id = %circuit_id, "cache invalidated");
        }
    }

    Ok(())
}

async fn prove(
    cache_dir: &PathBuf,
    spec: &CircuitSpec,
    values: &[u64],
    threshold: u64,
    freshness: u64,
) -> Result<ProofRecord, Box<dyn std::error::Error>> {
    let witness = assemble_witness(values, threshold, freshness, spec.depth, spec.max_slots)?;

    let prover = build_prover(cache_dir, spec).await?;

    let started = Instant::now();
    let record = prover.generate(&witness, spec).await?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        active_days = witness.active_count(),
        "proof generation finished"
    );

    Ok(record)
}

async fn verify(
    cache_dir: &PathBuf,
    record: &ProofRecord,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = &record.circuit;
    let prover = build_prover(cache_dir, spec).await?;

    // The record's own signals are the claim being checked; a tampered
    // record fails the cryptographic check.
    let expected = PublicInputs {
        root: record.proof.root().ok_or("record is missing its root signal")?,
        threshold: record
            .proof
            .threshold()
            .ok_or("record is missing its threshold signal")?,
        freshness_timestamp: record
            .proof
            .freshness_timestamp()
            .ok_or("record is missing its freshness signal")?,
    };

    let outcome = prover.verify(&record.proof, &expected, spec).await?;
    match outcome.is_valid {
        true => {
            info!(
                meets_threshold = record.proof.meets_threshold().unwrap_or(false),
                "proof is valid"
            );
        }
        false => {
            error!(
                reason = outcome.reason.as_deref().unwrap_or("unknown"),
                "proof is INVALID"
            );
            std::process::exit(2);
        }
    }
    Ok(())
}

async fn build_prover(
    cache_dir: &PathBuf,
    spec: &CircuitSpec,
) -> Result<ActivityProver, Box<dyn std::error::Error>> {
    let cache = Arc::new(ArtifactCache::open(cache_dir).await?);
    let source = Arc::new(NativeSetup {
        depth: spec.depth,
        max_slots: spec.max_slots,
    });
    Ok(ActivityProver::new(
        Arc::new(NativeBackend::new()),
        cache,
        source,
    ))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
