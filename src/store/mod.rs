//! Durable store collaborator.
//!
//! Two collections are maintained:
//!
//! - **enterprises**: one [`EntityAggregate`] per enterprise number, merged
//!   with set-union semantics so re-delivering a publication is a no-op
//! - **publications**: one document per publication, keyed by
//!   [`PublicationRecord::record_key`] and replaced on every delivery
//!
//! Writes to the same key must be serialized by the implementation.

pub mod json;
#[cfg(test)]
pub mod memory;

use crate::error::StoreError;
use crate::models::{Deposit, PublicationRecord};
use chrono::{DateTime, Utc};

pub use json::JsonStore;

/// Store-wide counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    /// Aggregates in the enterprises collection.
    pub enterprises: usize,
    /// Aggregates holding at least one publication.
    pub with_publications: usize,
    /// Publications summed over all aggregates.
    pub total_publications: usize,
    /// Documents in the flat publications collection.
    pub flat_records: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Persistence collaborator for publications and deposits.
///
/// Implementations serialize writes to the same key.
pub trait PublicationStore {
    /// Merge `records` into the enterprise's aggregate and refresh its
    /// `last_updated`. Returns how many records were new.
    async fn upsert_aggregate(&self, entity_id: &str, records: &[PublicationRecord]) -> Result<usize, StoreError>;

    /// Insert or replace one publication document.
    async fn upsert_flat_record(&self, record_key: &str, record: &PublicationRecord) -> Result<(), StoreError>;

    /// Replace the enterprise's deposits.
    async fn upsert_deposits(&self, entity_id: &str, url: &str, deposits: &[Deposit]) -> Result<(), StoreError>;

    /// Count enterprises and publications across both collections.
    ///
    /// # Returns
    ///
    /// [`StoreStats`] with the most recent `last_updated` of any aggregate.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

impl<T: PublicationStore> PublicationStore for &T {
    async fn upsert_aggregate(&self, entity_id: &str, records: &[PublicationRecord]) -> Result<usize, StoreError> {
        (**self).upsert_aggregate(entity_id, records).await
    }

    async fn upsert_flat_record(&self, record_key: &str, record: &PublicationRecord) -> Result<(), StoreError> {
        (**self).upsert_flat_record(record_key, record).await
    }

    async fn upsert_deposits(&self, entity_id: &str, url: &str, deposits: &[Deposit]) -> Result<(), StoreError> {
        (**self).upsert_deposits(entity_id, url, deposits).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        (**self).stats().await
    }
}

/// Fold one aggregate into running statistics.
pub(crate) fn tally(stats: &mut StoreStats, aggregate: &crate::models::EntityAggregate) {
    stats.enterprises += 1;
    if !aggregate.publications.is_empty() {
        stats.with_publications += 1;
    }
    stats.total_publications += aggregate.publications.len();
    stats.last_updated = stats.last_updated.max(aggregate.last_updated);
}
