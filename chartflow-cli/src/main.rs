//! chartflow CLI: trigger, fetch, process, and inspect chart ingestion.
//!
//! Commands:
//! - `trigger`: publish ingestion requests for due sources to a spool file
//! - `fetch`: fetch one source, or every request in a spool file
//! - `process`: normalize a raw snapshot (by key or notification file)
//! - `run`: trigger, fetch, and normalize in one go
//! - `status`: latest ingestion and due state per source
//! - `inspect`: print the rows of a processed artifact

use anyhow::{bail, Context, Result};
use chartflow_core::data::{notification_keys, read_artifact, IexClient};
use chartflow_core::{
    load_definitions, read_spool, IngestionRequest, LocalStore, ObjectStore, Pipeline,
    RecencyTracker, Scheduler, Settings, SpoolBus, StorageLayout, SystemClock,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chartflow",
    about = "chartflow: incremental chart ingestion into object storage",
    version
)]
struct Cli {
    /// Settings file (TOML). CHARTFLOW_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish ingestion requests for every due source.
    Trigger {
        /// Spool file the requests are appended to.
        #[arg(long, default_value = "events.jsonl")]
        spool: PathBuf,
    },
    /// Fetch raw chart data for one request or a whole spool file.
    Fetch {
        /// Source key.
        #[arg(long, conflicts_with = "spool", requires = "symbol")]
        key: Option<String>,

        /// Symbol passed to the chart API.
        #[arg(long, requires = "key")]
        symbol: Option<String>,

        /// Earliest instant needed (RFC 3339). Omit for full history.
        #[arg(long, requires = "key")]
        start: Option<String>,

        /// Consume every request in this spool file instead.
        #[arg(long)]
        spool: Option<PathBuf>,
    },
    /// Normalize raw snapshots into processed artifacts.
    Process {
        /// Object keys of raw snapshots.
        keys: Vec<String>,

        /// Object-created notification JSON file naming the snapshots.
        #[arg(long)]
        notification: Option<PathBuf>,
    },
    /// Trigger, fetch, and normalize in one invocation.
    Run,
    /// Report latest ingestion and due state per source.
    Status,
    /// Print the rows of a processed artifact.
    Inspect {
        /// Object key of the artifact.
        key: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("chartflow={0},chartflow_core={0}", cli.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(&settings.store_root));
    let layout = StorageLayout::new(&settings.prefix);

    match cli.command {
        Commands::Trigger { spool } => run_trigger(&settings, store, layout, &spool),
        Commands::Fetch {
            key,
            symbol,
            start,
            spool,
        } => run_fetch(&settings, store, layout, key, symbol, start, spool),
        Commands::Process { keys, notification } => {
            run_process(store, layout, keys, notification.as_deref())
        }
        Commands::Run => run_pipeline(&settings, store, layout),
        Commands::Status => run_status(&settings, store, layout),
        Commands::Inspect { key } => run_inspect(store.as_ref(), &key),
    }
}

fn pipeline(settings: &Settings, store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Result<Pipeline> {
    let (endpoint, token) = settings.api_credentials()?;
    let api = IexClient::new(endpoint, token)?;
    Ok(Pipeline {
        store,
        api: Arc::new(api),
        clock: Arc::new(SystemClock),
        layout,
        bus_name: settings.event_bus.clone(),
    })
}

fn run_trigger(
    settings: &Settings,
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    spool: &Path,
) -> Result<()> {
    let definitions = load_definitions(store.as_ref(), &layout)?;
    let scheduler = Scheduler::new(
        RecencyTracker::new(store, layout),
        Arc::new(SpoolBus::new(spool)),
        Arc::new(SystemClock),
        settings.event_bus.clone(),
    );

    let report = scheduler.run(&definitions);
    println!(
        "Published {} request(s) to {}, {} source(s) not due",
        report.published.len(),
        spool.display(),
        report.not_due.len()
    );

    if !report.all_succeeded() {
        for (key, err) in &report.failed {
            eprintln!("Error for {key}: {err}");
        }
        bail!("{} source(s) failed", report.failed.len());
    }
    Ok(())
}

fn run_fetch(
    settings: &Settings,
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    key: Option<String>,
    symbol: Option<String>,
    start: Option<String>,
    spool: Option<PathBuf>,
) -> Result<()> {
    let requests = match (key, symbol, spool) {
        (Some(key), Some(symbol), None) => {
            let start = start
                .as_deref()
                .map(|s| {
                    DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .with_context(|| format!("invalid --start '{s}'"))
                })
                .transpose()?;
            vec![IngestionRequest { key, symbol, start }]
        }
        (None, None, Some(spool)) => read_spool(&spool)?
            .into_iter()
            .filter(|e| e.is_trigger())
            .map(|e| e.detail)
            .collect(),
        _ => bail!("pass either --key and --symbol, or --spool"),
    };

    let fetcher = pipeline(settings, store, layout)?.fetcher();
    let mut failed = 0;
    for request in &requests {
        match fetcher.fetch(request) {
            Ok(outcome) => {
                println!(
                    "{} [{}] HTTP {} -> {}",
                    outcome.key, outcome.range, outcome.status, outcome.raw_key
                );
            }
            Err(e) => {
                error!(key = %request.key, error = %e, "fetch failed");
                eprintln!("Error for {}: {e}", request.key);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed}/{} fetch(es) failed", requests.len());
    }
    Ok(())
}

fn run_process(
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    mut keys: Vec<String>,
    notification: Option<&Path>,
) -> Result<()> {
    if let Some(path) = notification {
        let payload =
            std::fs::read(path).with_context(|| format!("read notification {}", path.display()))?;
        keys.extend(notification_keys(&payload)?);
    }
    if keys.is_empty() {
        bail!("no raw snapshot keys given");
    }

    let normalizer = chartflow_core::data::Normalizer::new(store, layout);
    let mut failed = 0;
    for key in &keys {
        match normalizer.normalize(key) {
            Ok(outcome) => println!(
                "{} -> {} ({} rows)",
                outcome.raw_key, outcome.processed_key, outcome.rows
            ),
            Err(e) => {
                eprintln!("Error for {key}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed}/{} snapshot(s) failed", keys.len());
    }
    Ok(())
}

fn run_pipeline(settings: &Settings, store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Result<()> {
    let summary = pipeline(settings, store, layout)?.run_once()?;

    println!(
        "Run complete: {} published, {} not due, {} fetched, {} normalized",
        summary.published,
        summary.not_due,
        summary.fetched.len(),
        summary.normalized.len()
    );

    if !summary.all_succeeded() {
        for (unit, err) in &summary.errors {
            eprintln!("Error for {unit}: {err}");
        }
        bail!("{} unit(s) failed", summary.errors.len());
    }
    Ok(())
}

fn run_status(settings: &Settings, store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Result<()> {
    let definitions = load_definitions(store.as_ref(), &layout)?;
    let scheduler = Scheduler::new(
        RecencyTracker::new(store, layout),
        Arc::new(chartflow_core::MemoryBus::new()),
        Arc::new(SystemClock),
        settings.event_bus.clone(),
    );

    println!(
        "{:<20} {:<10} {:>12} {:<26} {:<4}",
        "KEY", "SYMBOL", "FREQUENCY", "LATEST", "DUE"
    );
    println!("{}", "-".repeat(76));

    for definition in &definitions {
        match scheduler.evaluate(definition) {
            Ok(decision) => {
                let latest = decision
                    .latest
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{:<20} {:<10} {:>12} {:<26} {:<4}",
                    decision.key,
                    decision.symbol,
                    format_frequency(definition.frequency),
                    latest,
                    if decision.due { "yes" } else { "no" }
                );
            }
            Err(e) => println!("{:<20} error: {e}", definition.key),
        }
    }
    Ok(())
}

fn format_frequency(frequency: chrono::Duration) -> String {
    let secs = frequency.num_seconds();
    match secs {
        s if s % 86_400 == 0 && s > 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 && s > 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 && s > 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

fn run_inspect(store: &dyn ObjectStore, key: &str) -> Result<()> {
    let records = read_artifact(&store.get(key)?)?;
    let rows: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "timestamp": r.timestamp.to_rfc3339(),
                "key": r.key,
                "percent_change": r.percent_change,
                "volume": r.volume,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
