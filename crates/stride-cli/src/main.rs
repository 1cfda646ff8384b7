//! Stride CLI - record health samples and sync them between devices
//!
//! The `record`/`list`/`status` commands stand in for the sampling pipeline
//! and watch face; `demo` runs the full sync protocol between two in-memory
//! devices over a loopback transport.

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stride_core::db::{Database, SampleStore, SqliteSampleStore};
use stride_core::models::{NewSample, TIMESTAMP_FORMAT};
use stride_core::sync::{run_retention_sweep, MemoryTransport, SyncEngine};
use stride_core::SyncConfig;
use tracing::info;

use error::CliError;

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "Durable health-sample log with companion-device sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the local database file
    #[arg(long, value_name = "PATH", default_value = "stride.db")]
    db_path: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a sample (stands in for the sensor pipeline)
    Record {
        /// Step count for this observation
        #[arg(long)]
        steps: Option<u32>,
        /// Heart rate in bpm
        #[arg(long)]
        heart_rate: Option<f64>,
        /// Timestamp (%Y-%m-%d %H:%M:%S); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// List recent samples
    List {
        /// Number of samples to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync state counts and today's aggregates
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Purge synced samples and confirmed batches past the retention age
    Purge {
        /// Retention age in days
        #[arg(long, default_value = "7")]
        days: u64,
        /// Also delete old samples that were never synced
        #[arg(long)]
        all: bool,
    },
    /// Run a two-device loopback sync demo with in-memory stores
    Demo {
        /// Number of samples to seed on the watch side
        #[arg(long, default_value = "650")]
        samples: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stride=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            steps,
            heart_rate,
            at,
        } => record(&open_store(&cli.db_path)?, steps, heart_rate, at),
        Commands::List { limit, json } => list(&open_store(&cli.db_path)?, limit, json),
        Commands::Status { json } => status(&open_store(&cli.db_path)?, json),
        Commands::Purge { days, all } => purge(&open_store(&cli.db_path)?, days, all),
        Commands::Demo { samples } => demo(samples).await,
    }
}

fn open_store(path: &PathBuf) -> Result<SqliteSampleStore, CliError> {
    Ok(SqliteSampleStore::new(Database::open(path)?))
}

fn record(
    store: &SqliteSampleStore,
    steps: Option<u32>,
    heart_rate: Option<f64>,
    at: Option<String>,
) -> Result<(), CliError> {
    if steps.is_none() && heart_rate.is_none() {
        return Err(CliError::EmptyMeasurement);
    }

    let sample = match at {
        Some(ts) => {
            chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT)
                .map_err(|_| CliError::InvalidTimestamp(ts.clone()))?;
            NewSample::new(ts, steps, heart_rate)?
        }
        None => NewSample::now(steps, heart_rate)?,
    };

    let outcome = store.upsert(&sample)?;
    match outcome {
        stride_core::db::UpsertOutcome::Inserted(id) => {
            info!(id, recorded_at = %sample.recorded_at, "sample recorded");
            println!("Recorded sample {id} at {}", sample.recorded_at);
        }
        stride_core::db::UpsertOutcome::AlreadyPresent(id) => {
            println!("Already recorded as sample {id}");
        }
    }
    Ok(())
}

fn list(store: &SqliteSampleStore, limit: usize, json: bool) -> Result<(), CliError> {
    let samples = store.list_recent(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }
    if samples.is_empty() {
        println!("No samples recorded.");
        return Ok(());
    }
    for sample in samples {
        let steps = sample
            .steps
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let bpm = sample
            .heart_rate
            .map_or_else(|| "-".to_string(), |h| format!("{h:.1}"));
        println!(
            "{:>6}  {}  steps {:>6}  bpm {:>6}  [{}]",
            sample.id, sample.recorded_at, steps, bpm, sample.sync_state
        );
    }
    Ok(())
}

fn status(store: &SqliteSampleStore, json: bool) -> Result<(), CliError> {
    let counts = store.state_counts()?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let steps = store.steps_for_day(&today)?;
    let avg_bpm = store.avg_heart_rate_for_day(&today)?;
    let last_bpm = store.last_heart_rate()?;
    let outstanding = store.unconfirmed_batches()?.len();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "unsynced": counts.unsynced,
                "pendingAck": counts.pending_ack,
                "synced": counts.synced,
                "outstandingBatches": outstanding,
                "today": {
                    "date": today,
                    "steps": steps,
                    "avgHeartRate": avg_bpm,
                    "lastHeartRate": last_bpm,
                },
            }))?
        );
        return Ok(());
    }

    println!("Samples: {} unsynced, {} pending ack, {} synced", counts.unsynced, counts.pending_ack, counts.synced);
    println!("Outstanding batches: {outstanding}");
    println!("Today ({today}): {} steps", steps.unwrap_or(0));
    match (avg_bpm, last_bpm) {
        (Some(avg), Some(last)) => println!("Heart rate: avg {avg:.1} bpm, last {last:.1} bpm"),
        (None, Some(last)) => println!("Heart rate: last {last:.1} bpm"),
        _ => println!("Heart rate: no readings"),
    }
    Ok(())
}

fn purge(store: &SqliteSampleStore, days: u64, all: bool) -> Result<(), CliError> {
    let config =
        SyncConfig::default().with_retention_age(Duration::from_secs(days * 24 * 60 * 60));
    let (samples, batches) = run_retention_sweep(store, &config)?;
    if all {
        let cutoff = (chrono::Local::now()
            - chrono::Duration::seconds(i64::try_from(days * 24 * 60 * 60).unwrap_or(i64::MAX)))
        .format(TIMESTAMP_FORMAT)
        .to_string();
        let unsynced = store.purge_samples_older_than(&cutoff, false)?;
        info!(synced = samples, unsynced, batches, "purge complete");
        println!(
            "Purged {} samples ({unsynced} never synced) and {batches} confirmed batches older than {days} days",
            samples + unsynced
        );
        return Ok(());
    }
    info!(synced = samples, batches, "purge complete");
    println!("Purged {samples} synced samples and {batches} confirmed batches older than {days} days");
    Ok(())
}

/// Seed a watch-side store, then let two engines converge over a loopback
/// transport.
async fn demo(samples: usize) -> Result<(), CliError> {
    let config = SyncConfig::default()
        .with_tick_period(Duration::from_millis(250))
        .with_send_cooldown(Duration::from_millis(250));

    let watch_store: Arc<dyn SampleStore> =
        Arc::new(SqliteSampleStore::new(Database::open_in_memory()?));
    let phone_store: Arc<dyn SampleStore> =
        Arc::new(SqliteSampleStore::new(Database::open_in_memory()?));

    let base = chrono::Local::now() - chrono::Duration::seconds(i64::try_from(samples).unwrap_or(0));
    for i in 0..samples {
        let ts = (base + chrono::Duration::seconds(i64::try_from(i).unwrap_or(0)))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        watch_store.upsert(&NewSample::new(ts, Some(1), Some(60.0 + (i % 40) as f64))?)?;
    }
    info!(samples, "watch-side store seeded");
    println!("Seeded {samples} samples on the watch side");

    let (watch_end, phone_end) = MemoryTransport::pair("watch", "phone");
    let watch_engine =
        SyncEngine::start(Arc::clone(&watch_store), Arc::new(watch_end), config.clone())?;
    let phone_engine =
        SyncEngine::start(Arc::clone(&phone_store), Arc::new(phone_end), config)?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let counts = watch_store.state_counts()?;
        println!(
            "watch: {} unsynced, {} pending, {} synced | phone holds {}",
            counts.unsynced,
            counts.pending_ack,
            counts.synced,
            phone_store.state_counts()?.synced,
        );
        if counts.synced == samples {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            eprintln!("demo did not converge within 30s");
            break;
        }
    }

    watch_engine.shutdown().await;
    phone_engine.shutdown().await;
    println!("Done.");
    Ok(())
}
