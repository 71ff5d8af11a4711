//! Merge persistence.
//!
//! One batch for one enterprise is written twice: merged into the enterprise
//! aggregate (set union, so re-delivery adds nothing) and upserted record by
//! record into the flat publications collection under a deterministic key.
//! Each write commits on its own; a failure stops this enterprise's batch
//! and is returned, it never touches other enterprises.

use crate::error::{Collection, PersistError};
use crate::models::{Deposit, PublicationRecord};
use crate::store::PublicationStore;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    /// Records that were new to the aggregate.
    pub added: usize,
    /// Flat documents written (new or replaced).
    pub written: usize,
}

#[instrument(level = "info", skip(store, records), fields(count = records.len()))]
pub async fn persist<S: PublicationStore>(
    store: &S,
    entity_id: &str,
    records: &[PublicationRecord],
) -> Result<PersistReport, PersistError> {
    let added = store.upsert_aggregate(entity_id, records).await.map_err(|source| {
        error!(entity_id, error = %source, "Aggregate merge failed");
        PersistError {
            entity_id: entity_id.to_string(),
            collection: Collection::Aggregate,
            source,
        }
    })?;

    let mut written = 0;
    for record in records {
        let key = record.record_key();
        store.upsert_flat_record(&key, record).await.map_err(|source| {
            error!(entity_id, %key, error = %source, "Publication upsert failed");
            PersistError {
                entity_id: entity_id.to_string(),
                collection: Collection::FlatRecord,
                source,
            }
        })?;
        written += 1;
    }

    info!(entity_id, added, written, "Publications saved");
    Ok(PersistReport { added, written })
}

#[instrument(level = "info", skip(store, deposits), fields(count = deposits.len()))]
pub async fn persist_deposits<S: PublicationStore>(
    store: &S,
    entity_id: &str,
    url: &str,
    deposits: &[Deposit],
) -> Result<(), PersistError> {
    store
        .upsert_deposits(entity_id, url, deposits)
        .await
        .map_err(|source| {
            error!(entity_id, error = %source, "Deposits write failed");
            PersistError {
                entity_id: entity_id.to_string(),
                collection: Collection::Deposits,
                source,
            }
        })
}
