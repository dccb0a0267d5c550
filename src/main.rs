use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser, ValueEnum};
use tracing::{info, warn};

use address_enricher::geocode::GeocodeMarkers;
use address_enricher::http::{ReqwestFetcher, DEFAULT_TIMEOUT_SECS};
use address_enricher::monitor::{
    FailurePolicy, RunStats, DEFAULT_MIN_SAMPLE, DEFAULT_MIN_SUCCESS_PERCENT,
};
use address_enricher::property_search::{AddressMarkers, SessionTokens};
use address_enricher::scraper::{EnrichMode, ScraperConfig, ScraperEngine};

const PROGRESS_EVERY: usize = 100;

const USAGE_HINT: &str =
    "Please provide a valid CSV file to parse. Example usage: address-enricher path/to/csvfile.csv";

struct RunReport {
    stats: RunStats,
    duration_secs: f64,
    rows_per_minute: f64,
    finished_at: chrono::DateTime<chrono::Local>,
}

impl RunReport {
    fn new(stats: RunStats, duration_secs: f64) -> Self {
        let rows_per_minute = if duration_secs > 0.0 {
            (stats.processed as f64 / duration_secs) * 60.0
        } else {
            0.0
        };

        Self {
            stats,
            duration_secs,
            rows_per_minute,
            finished_at: chrono::Local::now(),
        }
    }

    fn format_duration(&self) -> String {
        let total_secs = self.duration_secs as u64;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    fn display(&self) {
        println!("\n╔══════════════════════════════════════════════════════════╗");
        println!("║              ENRICHMENT REPORT                           ║");
        println!("╠══════════════════════════════════════════════════════════╣");
        println!("║  Rows:                    {:>30} ║", self.stats.processed);
        println!("║  Listed:                  {:>30} ║", self.stats.listed());
        println!("║  Unlisted:                {:>30} ║", self.stats.unlisted);
        println!("║  Rejected upstream:       {:>30} ║", self.stats.rejected);
        println!("║  Geocoded:                {:>30} ║", self.stats.geocoded);
        println!(
            "║  Duration:                {:>30} ║",
            self.format_duration()
        );
        println!(
            "║  Throughput:              {:>26.2}/min ║",
            self.rows_per_minute
        );
        println!(
            "║  Success Rate:            {:>27.1}%   ║",
            self.stats.success_rate()
        );
        println!(
            "║  Finished:                {:>30} ║",
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("╚══════════════════════════════════════════════════════════╝\n");
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// Prepend the property address only
    Address,
    /// Prepend street, city, zip and the search URL
    Geocode,
}

impl From<ModeArg> for EnrichMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Address => EnrichMode::AddressOnly,
            ModeArg::Geocode => EnrichMode::WithGeocode,
        }
    }
}

#[derive(Parser)]
#[command(name = "address-enricher", version)]
#[command(about = "Prepend property addresses to the rows of a CSV file", long_about = None)]
struct Cli {
    /// Headerless CSV whose second column holds the property lookup ID
    input: PathBuf,

    #[arg(long, value_enum, env = "ENRICH_MODE", default_value_t = ModeArg::Geocode)]
    mode: ModeArg,

    /// Rows looked up at the same time
    #[arg(short, long, env = "ENRICH_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    #[arg(long, env = "ENRICH_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Rows processed before the failure rate is checked
    #[arg(long, env = "ENRICH_MIN_SAMPLE", default_value_t = DEFAULT_MIN_SAMPLE)]
    min_sample: usize,

    /// Abort when the lookup success rate (percent) drops below this
    #[arg(long, env = "ENRICH_MIN_SUCCESS_RATE", default_value_t = DEFAULT_MIN_SUCCESS_PERCENT)]
    min_success_rate: f64,

    /// Text every geocoded "City, ST 12345" line must contain
    #[arg(long, env = "ENRICH_REGION_MARKER", default_value = ", IL")]
    region_marker: String,

    /// Form-encoded __VIEWSTATE token for the property search
    #[arg(long, env = "PROPERTY_SEARCH_VIEWSTATE", hide_env_values = true)]
    viewstate: Option<String>,

    /// Form-encoded __EVENTVALIDATION token for the property search
    #[arg(long, env = "PROPERTY_SEARCH_EVENT_VALIDATION", hide_env_values = true)]
    event_validation: Option<String>,
}

impl Cli {
    fn into_config(self) -> (PathBuf, ScraperConfig) {
        if self.concurrency > 1 {
            warn!(
                "Running {} lookups at once, the upstream sites may throttle or block this client",
                self.concurrency
            );
        }

        let config = ScraperConfig {
            mode: self.mode.into(),
            max_concurrent: self.concurrency.max(1),
            timeout_secs: self.timeout_secs,
            policy: FailurePolicy {
                min_sample: self.min_sample,
                min_success_percent: self.min_success_rate,
            },
            tokens: SessionTokens::with_overrides(self.viewstate, self.event_validation),
            address_markers: AddressMarkers::default(),
            geocode_markers: GeocodeMarkers::default().with_region(self.region_marker),
        };

        (self.input, config)
    }
}

/// `--help` and `--version` surface as clap errors but are not failures.
fn is_informational(e: &clap::Error) -> bool {
    matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if is_informational(&e) => e.exit(),
        Err(e) => {
            tracing::debug!("Argument error: {}", e);
            eprintln!("{}", USAGE_HINT);
            std::process::exit(1);
        }
    }
}

fn progress_line(stats: &RunStats, total: usize) -> Option<String> {
    if stats.processed == 0 || stats.processed % PROGRESS_EVERY != 0 {
        return None;
    }
    Some(format!(
        "Processed: {}/{}. Unlisted count: {}",
        stats.processed, total, stats.unlisted
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let start_time = Instant::now();
    let (input, config) = cli.into_config();

    if !input.is_file() || input.extension().and_then(|e| e.to_str()) != Some("csv") {
        anyhow::bail!(USAGE_HINT);
    }

    println!("Running property-search. This may take a few minutes while addresses are looked up.");

    let fetcher = ReqwestFetcher::new(config.timeout()).context("Failed to create HTTP client")?;
    let engine = ScraperEngine::new(config, Arc::new(fetcher));

    let summary = engine
        .run_file(&input, |stats, total| {
            if let Some(line) = progress_line(stats, total) {
                println!("{}", line);
            }
        })
        .await
        .context("An error occurred during script processing")?;

    if summary.stats.rejected > 0 {
        warn!(
            "{} lookups were rejected upstream, refresh the session tokens if this keeps happening",
            summary.stats.rejected
        );
    }

    println!(
        "Processing complete. New file created: {}",
        summary.output_path.display()
    );
    info!("Finished {}", input.display());

    RunReport::new(summary.stats, start_time.elapsed().as_secs_f64()).display();
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_cli();

    if let Err(e) = run(cli).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
