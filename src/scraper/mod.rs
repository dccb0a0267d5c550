use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::csv_io::{self, EnrichedRow, Row};
use crate::error::Result;
use crate::geocode::{GeocodeClient, GeocodeMarkers};
use crate::http::{HttpFetch, DEFAULT_TIMEOUT_SECS};
use crate::monitor::{FailureMonitor, FailurePolicy, RowOutcome, RunStats};
use crate::property_search::{
    AddressMarkers, PropertyLookup, PropertySearchClient, SessionTokens,
};

pub const UNLISTED_ADDRESS: &str = "Unlisted Address";
pub const UNKNOWN: &str = "unknown";
pub const UNAVAILABLE: &str = "unavailable";

/// Which derived columns are prepended to each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichMode {
    /// `address`
    AddressOnly,
    /// `street, city, zip, google`
    #[default]
    WithGeocode,
}

impl EnrichMode {
    pub fn derived_columns(&self) -> usize {
        match self {
            EnrichMode::AddressOnly => 1,
            EnrichMode::WithGeocode => 4,
        }
    }
}

pub struct ScraperConfig {
    pub mode: EnrichMode,
    /// Rows whose lookups may be in flight at once. 1 keeps the upstream
    /// sites at one request at a time.
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub policy: FailurePolicy,
    pub tokens: SessionTokens,
    pub address_markers: AddressMarkers,
    pub geocode_markers: GeocodeMarkers,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            mode: EnrichMode::default(),
            max_concurrent: 1,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            policy: FailurePolicy::default(),
            tokens: SessionTokens::default(),
            address_markers: AddressMarkers::default(),
            geocode_markers: GeocodeMarkers::default(),
        }
    }
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Turns one input row into one output row.
pub struct Enricher {
    mode: EnrichMode,
    property: PropertySearchClient,
    geocode: GeocodeClient,
}

impl Enricher {
    pub fn new(mode: EnrichMode, property: PropertySearchClient, geocode: GeocodeClient) -> Self {
        Self {
            mode,
            property,
            geocode,
        }
    }

    pub async fn enrich_row(&self, row: &Row) -> (EnrichedRow, RowOutcome) {
        let lookup = match row.lookup_id() {
            Some(id) => self.property.lookup(id).await,
            None => {
                warn!("Row has no lookup identifier in column {}", csv_io::LOOKUP_COLUMN);
                PropertyLookup::Unlisted
            }
        };

        let mut outcome = RowOutcome {
            unlisted: lookup.is_unlisted(),
            rejected: lookup.is_rejected(),
            geocoded: false,
        };

        let derived = match self.mode {
            EnrichMode::AddressOnly => {
                vec![lookup.address().unwrap_or(UNLISTED_ADDRESS).to_string()]
            }
            EnrichMode::WithGeocode => {
                let street = lookup.address().unwrap_or(UNKNOWN).to_string();
                let location = match lookup.address() {
                    Some(address) => self.geocode.locate(address).await,
                    None => None,
                };

                match location {
                    Some(location) => {
                        outcome.geocoded = true;
                        vec![street, location.city, location.zip, location.reference_url]
                    }
                    None => vec![
                        street,
                        UNKNOWN.to_string(),
                        UNKNOWN.to_string(),
                        UNAVAILABLE.to_string(),
                    ],
                }
            }
        };

        debug_assert_eq!(derived.len(), self.mode.derived_columns());
        (EnrichedRow::new(derived, row.clone()), outcome)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub stats: RunStats,
}

pub struct ScraperEngine {
    config: ScraperConfig,
    enricher: Enricher,
}

impl ScraperEngine {
    pub fn new(config: ScraperConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        let property = PropertySearchClient::new(fetcher.clone(), config.tokens.clone())
            .with_markers(config.address_markers.clone());
        let geocode = GeocodeClient::new(fetcher, config.geocode_markers.clone());
        let enricher = Enricher::new(config.mode, property, geocode);

        Self { config, enricher }
    }

    /// Enriches `rows` in input order. Each outcome reaches the failure
    /// monitor before the next one is looked at; a tripped monitor ends the
    /// batch with an error and the collected rows are dropped.
    pub async fn process_rows<F>(
        &self,
        rows: &[Row],
        mut progress_callback: F,
    ) -> Result<(Vec<EnrichedRow>, RunStats)>
    where
        F: FnMut(&RunStats, usize),
    {
        let total = rows.len();
        let mut monitor = FailureMonitor::new(self.config.policy);
        let mut enriched = Vec::with_capacity(total);

        let mut results = stream::iter(rows)
            .map(|row| self.enricher.enrich_row(row))
            .buffered(self.config.max_concurrent.max(1));

        while let Some((row, outcome)) = results.next().await {
            monitor.record(outcome)?;
            enriched.push(row);
            progress_callback(monitor.stats(), total);
        }

        Ok((enriched, *monitor.stats()))
    }

    /// Load, enrich and write one file. Nothing is written unless every row
    /// was processed.
    pub async fn run_file<F>(&self, input: &Path, progress_callback: F) -> Result<RunSummary>
    where
        F: FnMut(&RunStats, usize),
    {
        let output_path = csv_io::output_path(input)?;
        let rows = csv_io::load_rows(input)?;

        info!(
            "Enriching {} rows ({:?}, {} in flight)",
            rows.len(),
            self.config.mode,
            self.config.max_concurrent.max(1)
        );

        let (enriched, stats) = self.process_rows(&rows, progress_callback).await?;

        csv_io::write_rows(&output_path, &enriched)?;
        debug!("Output written to {}", output_path.display());

        Ok(RunSummary { output_path, stats })
    }
}
