//! Directory-backed JSON store.
//!
//! # Layout
//!
//! ```text
//! store_dir/
//! ├── enterprises/
//! │   └── 0123.456.789.json                          # EntityAggregate
//! └── publications/
//!     └── 0123.456.789_24012345_2024-01-15.json      # StoredPublication
//! ```
//!
//! File names are the percent-encoded keys; blank keys are rejected. Every write goes to a temporary
//! sibling first and is renamed into place, so a reader never sees a half
//! written document. A single async mutex serializes writers, which makes
//! each read-merge-write on one key atomic.

use super::{PublicationStore, StoreStats, tally};
use crate::error::StoreError;
use crate::models::{Deposit, EntityAggregate, PublicationRecord, StoredPublication};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

const ENTERPRISES: &str = "enterprises";
const PUBLICATIONS: &str = "publications";

#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn file_name(key: &str) -> String {
    format!("{}.json", urlencoding::encode(key))
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() {
        return Err(StoreError::Rejected {
            key: key.to_string(),
            reason: "blank key".to_string(),
        });
    }
    Ok(())
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `root`.
    #[instrument(level = "info", skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        for collection in [ENTERPRISES, PUBLICATIONS] {
            let dir = root.join(collection);
            if let Err(e) = fs::create_dir_all(&dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to create store collection");
                return Err(io_error(&dir, e));
            }
        }
        info!("Store opened");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn aggregate_path(&self, entity_id: &str) -> PathBuf {
        self.root.join(ENTERPRISES).join(file_name(entity_id))
    }

    fn record_path(&self, record_key: &str) -> PathBuf {
        self.root.join(PUBLICATIONS).join(file_name(record_key))
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|source| StoreError::Json {
                key: path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            key: path.display().to_string(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, path).await.map_err(|e| io_error(path, e))?;
        debug!(path = %path.display(), "Wrote document");
        Ok(())
    }

    /// Read an enterprise aggregate, if present.
    pub async fn aggregate(&self, entity_id: &str) -> Result<Option<EntityAggregate>, StoreError> {
        self.read_json(&self.aggregate_path(entity_id)).await
    }

    /// Read one publication document, if present.
    #[cfg(test)]
    pub async fn record(&self, record_key: &str) -> Result<Option<StoredPublication>, StoreError> {
        self.read_json(&self.record_path(record_key)).await
    }

    async fn load_or_new(&self, entity_id: &str) -> Result<EntityAggregate, StoreError> {
        Ok(self
            .aggregate(entity_id)
            .await?
            .unwrap_or_else(|| EntityAggregate::new(entity_id)))
    }

    /// Enterprise numbers of every stored aggregate, sorted.
    pub async fn enterprise_numbers(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(ENTERPRISES);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| io_error(&dir, e))?;
        let mut numbers = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(aggregate) = self.read_json::<EntityAggregate>(&path).await? {
                numbers.push(aggregate.enterprise_number);
            }
        }
        numbers.sort();
        debug!(count = numbers.len(), "Listed stored enterprises");
        Ok(numbers)
    }

    async fn count_files(&self, dir: &Path) -> Result<usize, StoreError> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| io_error(dir, e))?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl PublicationStore for JsonStore {
    #[instrument(level = "debug", skip(self, records), fields(count = records.len()))]
    async fn upsert_aggregate(&self, entity_id: &str, records: &[PublicationRecord]) -> Result<usize, StoreError> {
        check_key(entity_id)?;
        let _guard = self.write_lock.lock().await;
        let mut aggregate = self.load_or_new(entity_id).await?;
        let added = aggregate.merge_publications(records, Utc::now());
        self.write_json(&self.aggregate_path(entity_id), &aggregate).await?;
        Ok(added)
    }

    #[instrument(level = "debug", skip(self, record))]
    async fn upsert_flat_record(&self, record_key: &str, record: &PublicationRecord) -> Result<(), StoreError> {
        check_key(record_key)?;
        let _guard = self.write_lock.lock().await;
        let doc = StoredPublication {
            record: record.clone(),
            scraped_at: Utc::now(),
        };
        self.write_json(&self.record_path(record_key), &doc).await
    }

    #[instrument(level = "debug", skip(self, deposits), fields(count = deposits.len()))]
    async fn upsert_deposits(&self, entity_id: &str, url: &str, deposits: &[Deposit]) -> Result<(), StoreError> {
        check_key(entity_id)?;
        let _guard = self.write_lock.lock().await;
        let mut aggregate = self.load_or_new(entity_id).await?;
        aggregate.set_deposits(url, deposits.to_vec(), Utc::now());
        self.write_json(&self.aggregate_path(entity_id), &aggregate).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();

        let dir = self.root.join(ENTERPRISES);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| io_error(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(aggregate) = self.read_json::<EntityAggregate>(&path).await? {
                tally(&mut stats, &aggregate);
            }
        }

        stats.flat_records = self.count_files(&self.root.join(PUBLICATIONS)).await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "kbo_json_store_{}_{}_{}",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    fn record(number: &str, title: &str) -> PublicationRecord {
        PublicationRecord {
            title: Some(title.to_string()),
            publication_number: Some(number.to_string()),
            publication_date: Some("2024-01-15".to_string()),
            ..PublicationRecord::new("0123.456.789", 1)
        }
    }

    #[tokio::test]
    async fn test_aggregate_merge_survives_reopen() {
        let root = temp_root("reopen");
        {
            let store = JsonStore::open(&root).await.unwrap();
            let added = store
                .upsert_aggregate("0123.456.789", &[record("1", "A"), record("2", "B")])
                .await
                .unwrap();
            assert_eq!(added, 2);
        }

        let store = JsonStore::open(&root).await.unwrap();
        let added = store
            .upsert_aggregate("0123.456.789", &[record("2", "B"), record("3", "C")])
            .await
            .unwrap();
        assert_eq!(added, 1);

        let aggregate = store.aggregate("0123.456.789").await.unwrap().unwrap();
        assert_eq!(aggregate.publications.len(), 3);
        assert!(aggregate.last_updated.is_some());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_flat_record_is_replaced_not_duplicated() {
        let root = temp_root("flat");
        let store = JsonStore::open(&root).await.unwrap();
        let r = record("24012345", "ACME");
        let key = r.record_key();

        store.upsert_flat_record(&key, &r).await.unwrap();
        let mut changed = r.clone();
        changed.detail_url = Some("https://example.test/d".to_string());
        store.upsert_flat_record(&key, &changed).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.flat_records, 1);
        let stored = store.record(&key).await.unwrap().unwrap();
        assert_eq!(stored.record.detail_url.as_deref(), Some("https://example.test/d"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_keys_with_separators_stay_inside_collection() {
        let root = temp_root("names");
        let store = JsonStore::open(&root).await.unwrap();
        let key = "../0123.456.789_a/b_nodate";
        store.upsert_flat_record(key, &record("a/b", "X")).await.unwrap();

        assert!(store.record(key).await.unwrap().is_some());
        assert_eq!(store.stats().await.unwrap().flat_records, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_deposits_replace_and_keep_publications() {
        let root = temp_root("deposits");
        let store = JsonStore::open(&root).await.unwrap();
        store.upsert_aggregate("0123.456.789", &[record("1", "A")]).await.unwrap();

        let first = vec![Deposit { reference: "r1".into(), ..Deposit::default() }];
        let second = vec![Deposit { reference: "r2".into(), ..Deposit::default() }];
        store.upsert_deposits("0123.456.789", "https://cbso.test", &first).await.unwrap();
        store.upsert_deposits("0123.456.789", "https://cbso.test", &second).await.unwrap();

        let aggregate = store.aggregate("0123.456.789").await.unwrap().unwrap();
        assert_eq!(aggregate.deposits.unwrap(), second);
        assert_eq!(aggregate.publications.len(), 1);
        assert_eq!(aggregate.deposits_url.as_deref(), Some("https://cbso.test"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_stats_over_collections() {
        let root = temp_root("stats");
        let store = JsonStore::open(&root).await.unwrap();
        store.upsert_aggregate("0123.456.789", &[record("1", "A"), record("2", "B")]).await.unwrap();
        store.upsert_deposits("0987.654.321", "u", &[]).await.unwrap();
        for r in [record("1", "A"), record("2", "B")] {
            store.upsert_flat_record(&r.record_key(), &r).await.unwrap();
        }

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.enterprises, 2);
        assert_eq!(stats.with_publications, 1);
        assert_eq!(stats.total_publications, 2);
        assert_eq!(stats.flat_records, 2);
        assert!(stats.last_updated.is_some());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_blank_keys_are_rejected() {
        let root = temp_root("blank");
        let store = JsonStore::open(&root).await.unwrap();

        let err = store.upsert_aggregate("  ", &[record("1", "A")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        let err = store.upsert_flat_record("", &record("1", "A")).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_enterprise_numbers_lists_stored_aggregates() {
        let root = temp_root("numbers");
        let store = JsonStore::open(&root).await.unwrap();
        assert!(store.enterprise_numbers().await.unwrap().is_empty());

        store.upsert_deposits("0987.654.321", "u", &[]).await.unwrap();
        store.upsert_aggregate("0123.456.789", &[record("1", "A")]).await.unwrap();
        assert_eq!(
            store.enterprise_numbers().await.unwrap(),
            vec!["0123.456.789", "0987.654.321"]
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_corrupted_aggregate_is_reported() {
        let root = temp_root("corrupt");
        let store = JsonStore::open(&root).await.unwrap();
        std::fs::write(store.aggregate_path("0123.456.789"), b"{ not json").unwrap();

        let err = store.upsert_aggregate("0123.456.789", &[record("1", "A")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }
}
