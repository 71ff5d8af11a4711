//! In-memory store for tests.

use super::{PublicationStore, StoreStats, tally};
use crate::error::StoreError;
use crate::models::{Deposit, EntityAggregate, PublicationRecord, StoredPublication};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    aggregates: RwLock<HashMap<String, EntityAggregate>>,
    records: RwLock<HashMap<String, StoredPublication>>,
    rejected: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write for `entity_id` fail.
    pub fn reject_writes_for(&self, entity_id: &str) {
        self.rejected.write().unwrap().insert(entity_id.to_string());
    }

    pub fn aggregate(&self, entity_id: &str) -> Option<EntityAggregate> {
        self.aggregates.read().unwrap().get(entity_id).cloned()
    }

    pub fn record(&self, record_key: &str) -> Option<StoredPublication> {
        self.records.read().unwrap().get(record_key).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    fn check(&self, entity_id: &str, key: &str) -> Result<(), StoreError> {
        if self.rejected.read().unwrap().contains(entity_id) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl PublicationStore for MemoryStore {
    async fn upsert_aggregate(&self, entity_id: &str, records: &[PublicationRecord]) -> Result<usize, StoreError> {
        self.check(entity_id, entity_id)?;
        let mut aggregates = self.aggregates.write().unwrap();
        let aggregate = aggregates
            .entry(entity_id.to_string())
            .or_insert_with(|| EntityAggregate::new(entity_id));
        Ok(aggregate.merge_publications(records, Utc::now()))
    }

    async fn upsert_flat_record(&self, record_key: &str, record: &PublicationRecord) -> Result<(), StoreError> {
        self.check(&record.entity_id, record_key)?;
        self.records.write().unwrap().insert(
            record_key.to_string(),
            StoredPublication {
                record: record.clone(),
                scraped_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn upsert_deposits(&self, entity_id: &str, url: &str, deposits: &[Deposit]) -> Result<(), StoreError> {
        self.check(entity_id, entity_id)?;
        let mut aggregates = self.aggregates.write().unwrap();
        aggregates
            .entry(entity_id.to_string())
            .or_insert_with(|| EntityAggregate::new(entity_id))
            .set_deposits(url, deposits.to_vec(), Utc::now());
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        for aggregate in self.aggregates.read().unwrap().values() {
            tally(&mut stats, aggregate);
        }
        stats.flat_records = self.record_count();
        Ok(stats)
    }
}
