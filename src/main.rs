//! # KBO Publications
//!
//! Collects the official-gazette publications of Belgian enterprises from
//! the paginated ejustice listing, deduplicates and validates them, and
//! merges them into a local JSON store keyed by enterprise number.
//!
//! ## Features
//!
//! - Walks every listing page of an enterprise, stopping on empty pages,
//!   missing next links, or when the site loops back to a visited page
//! - Reads both the structured `.list-item` layout and the older flat
//!   `<hr>`/`<br>` layout
//! - Set-union merge per enterprise, so re-running never duplicates notices
//! - Optionally collects published financial deposits from the CBSO API
//!
//! ## Usage
//!
//! ```sh
//! kbo_publications -s ./store -e 0123.456.789,0987.654.321
//! kbo_publications -s ./store --input-csv enterprise.csv --limit 50 --deposits
//! ```
//!
//! ## Architecture
//!
//! Each enterprise runs through the same pipeline, several at a time:
//! 1. **Walking**: fetch and extract listing pages until the walk terminates
//! 2. **Processing**: dedup, validate, then persist to the store
//! 3. **Deposits**: when enabled, fetch and replace the enterprise's deposits

use clap::Parser;
use futures::stream::{self, StreamExt};
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetch;
mod inputs;
mod models;
mod pagination;
mod pipelines;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use config::PipelineConfig;
use fetch::{Fetch, build_fetcher};
use pipelines::dedup::SeenKeys;
use pipelines::{EntityOutcome, RunSummary, persist::persist_deposits, process_batch};
use store::{JsonStore, PublicationStore};
use utils::ensure_writable_dir;

/// Walk, process and optionally enrich one enterprise.
///
/// Returns the pages the walk fetched along with the batch outcome.
#[instrument(level = "info", skip(fetcher, store, config))]
async fn process_entity<F: Fetch, S: PublicationStore>(
    fetcher: &F,
    store: &S,
    config: &PipelineConfig,
    entity_id: &str,
    with_deposits: bool,
) -> (u32, EntityOutcome) {
    let first_url = config.search_url_for(entity_id);
    let report = pagination::walk(fetcher, entity_id, &first_url, config).await;
    if let pagination::Termination::FetchFailed { url, reason } = &report.termination {
        warn!(
            entity_id = %report.entity_id,
            %url,
            %reason,
            kept = report.records.len(),
            "Walk cut short by a failed fetch"
        );
    }
    let pages = report.pages_fetched;

    let mut seen = SeenKeys::new();
    let outcome = process_batch(store, entity_id, report.records, &mut seen).await;
    debug!(seen = seen.len(), "Batch processed");

    if with_deposits {
        match scrapers::cbso::fetch_deposits(fetcher, config, entity_id).await {
            Some(listing) => {
                if let Err(e) = persist_deposits(store, entity_id, &listing.url, &listing.deposits).await {
                    error!(error = %e, "Deposits not saved");
                }
            }
            None => warn!("Deposits skipped; previous deposits kept"),
        }
    }

    (pages, outcome)
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("kbo_publications starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = PipelineConfig::load(args.config.as_deref())?;

    // Early check: ensure store dir is writable
    if let Err(e) = ensure_writable_dir(&args.store_dir).await {
        error!(
            path = %args.store_dir,
            error = %e,
            "Store directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    let store = JsonStore::open(&args.store_dir).await?;

    if args.stats {
        let stats = store.stats().await?;
        info!(
            enterprises = stats.enterprises,
            with_publications = stats.with_publications,
            total_publications = stats.total_publications,
            flat_records = stats.flat_records,
            last_updated = ?stats.last_updated,
            "Store statistics"
        );
        return Ok(());
    }

    // ---- Enterprise numbers ----
    let numbers = inputs::resolve_numbers(
        args.enterprise_numbers.clone(),
        args.input_csv.as_deref(),
        args.limit,
        &store,
    )
    .await?;
    if numbers.is_empty() {
        warn!("No enterprise numbers given and the store is empty; nothing to do");
        return Ok(());
    }

    let fetcher = build_fetcher(&config.fetch)?;
    let concurrency = config.concurrency.max(1);
    let with_deposits = args.deposits;
    info!(count = numbers.len(), concurrency, with_deposits, "Starting collection");

    // ---- Process enterprises in parallel ----
    let outcomes: Vec<(String, u32, EntityOutcome)> = stream::iter(numbers)
        .map(|entity_id| {
            let fetcher = &fetcher;
            let store = &store;
            let config = &config;
            async move {
                let (pages, outcome) = process_entity(fetcher, store, config, &entity_id, with_deposits).await;
                (entity_id, pages, outcome)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut summary = RunSummary::default();
    for (entity_id, pages, outcome) in &outcomes {
        if let EntityOutcome::Failed(e) = outcome {
            error!(%entity_id, error = %e, "Enterprise not saved");
        }
        summary.record(*pages, outcome);
    }

    let elapsed = start_time.elapsed();
    info!(
        enterprises = outcomes.len(),
        pages = summary.pages,
        persisted = summary.persisted,
        no_publications = summary.no_publications,
        dropped = summary.dropped,
        failed = summary.failed,
        records = summary.records,
        added = summary.added,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
