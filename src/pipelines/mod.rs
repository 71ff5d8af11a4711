//! Post-walk processing for one enterprise.
//!
//! # Stages
//!
//! 1. [`dedup`]: drop notices already emitted in this run
//! 2. [`validation`]: repair and reject records without identifying fields
//! 3. [`persist`]: set-union merge into the aggregate, upsert flat records
//!
//! [`process_batch`] runs the three in order and folds the result into an
//! [`EntityOutcome`]; [`RunSummary`] counts outcomes across enterprises.

pub mod dedup;
pub mod persist;
pub mod validation;

use crate::error::PersistError;
use crate::models::PublicationRecord;
use crate::store::PublicationStore;
use dedup::SeenKeys;
use tracing::{debug, info, warn};

/// What happened to one enterprise's batch.
#[derive(Debug)]
pub enum EntityOutcome {
    Persisted {
        records: usize,
        added: usize,
        duplicates: usize,
        rejected: usize,
    },
    /// The listing had no publications at all.
    NoPublications,
    /// Publications were found but none passed validation.
    Dropped { rejected: usize },
    Failed(PersistError),
}

/// Deduplicate, validate and persist one enterprise's walk result.
pub async fn process_batch<S: PublicationStore>(
    store: &S,
    entity_id: &str,
    records: Vec<PublicationRecord>,
    seen: &mut SeenKeys,
) -> EntityOutcome {
    if records.is_empty() {
        info!(entity_id, "No publications found");
        return EntityOutcome::NoPublications;
    }

    let raw = records.len();
    let unique = dedup::dedup(records, seen);
    let duplicates = raw - unique.len();

    let report = validation::validate(unique);
    if report.nothing_usable() {
        warn!(entity_id, rejected = report.rejected, "No valid publication after validation");
        return EntityOutcome::Dropped {
            rejected: report.rejected,
        };
    }
    if report.valid.is_empty() {
        debug!(entity_id, duplicates, "Every publication was already seen this run");
        return EntityOutcome::NoPublications;
    }

    match persist::persist(store, entity_id, &report.valid).await {
        Ok(saved) => EntityOutcome::Persisted {
            records: saved.written,
            added: saved.added,
            duplicates,
            rejected: report.rejected,
        },
        Err(e) => EntityOutcome::Failed(e),
    }
}

/// Outcome counts for a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Listing pages fetched across all walks.
    pub pages: u32,
    pub persisted: usize,
    pub no_publications: usize,
    pub dropped: usize,
    pub failed: usize,
    pub records: usize,
    pub added: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl RunSummary {
    /// Count one enterprise: the pages its walk fetched and its outcome.
    pub fn record(&mut self, pages: u32, outcome: &EntityOutcome) {
        self.pages += pages;
        match outcome {
            EntityOutcome::Persisted {
                records,
                added,
                duplicates,
                rejected,
            } => {
                self.persisted += 1;
                self.records += records;
                self.added += added;
                self.duplicates += duplicates;
                self.rejected += rejected;
            }
            EntityOutcome::NoPublications => self.no_publications += 1,
            EntityOutcome::Dropped { rejected } => {
                self.dropped += 1;
                self.rejected += rejected;
            }
            EntityOutcome::Failed(_) => self.failed += 1,
        }
    }
}
