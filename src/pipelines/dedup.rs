//! In-batch deduplication.
//!
//! Sites repeat notices across overlapping pages; the same notice must only
//! be written once per pass. The seen set is owned by the caller and scoped
//! to one enterprise's run, so concurrent walks never share it. Duplicates
//! across runs are absorbed by the store's set-union merge instead.

use crate::models::{PublicationKey, PublicationRecord};
use std::collections::HashSet;
use tracing::debug;

/// Keys already emitted during this run.
#[derive(Debug, Default, Clone)]
pub struct SeenKeys {
    keys: HashSet<PublicationKey>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn contains(&self, key: &PublicationKey) -> bool {
        self.keys.contains(key)
    }
}

/// Drop records whose identity key was already seen. First occurrence wins
/// and survivors keep their input order. `seen` is updated in place.
pub fn dedup(records: Vec<PublicationRecord>, seen: &mut SeenKeys) -> Vec<PublicationRecord> {
    records
        .into_iter()
        .filter(|record| {
            let key = record.key();
            if seen.contains(&key) {
                debug!(%key, "Duplicate publication skipped");
                false
            } else {
                seen.keys.insert(key);
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: &str, date: &str, title: &str, detail: &str) -> PublicationRecord {
        PublicationRecord {
            publication_number: Some(number.to_string()),
            publication_date: Some(date.to_string()),
            title: Some(title.to_string()),
            detail_url: Some(detail.to_string()),
            ..PublicationRecord::new("0123.456.789", 1)
        }
    }

    #[test]
    fn test_first_seen_wins_despite_other_fields() {
        let records = vec![
            record("1", "2024-01-01", "ACME", "https://a.test/first"),
            record("1", "2024-01-01", "ACME", "https://a.test/second"),
        ];
        let mut seen = SeenKeys::new();
        let unique = dedup(records, &mut seen);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].detail_url.as_deref(), Some("https://a.test/first"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_order_preserved() {
        let records = vec![
            record("3", "d", "C", "x"),
            record("1", "d", "A", "x"),
            record("3", "d", "C", "y"),
            record("2", "d", "B", "x"),
        ];
        let unique = dedup(records, &mut SeenKeys::new());
        let numbers: Vec<_> = unique.iter().map(|r| r.publication_number.clone().unwrap()).collect();
        assert_eq!(numbers, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_title_beyond_prefix_does_not_matter() {
        let base = "T".repeat(50);
        let records = vec![
            record("1", "d", &format!("{base} first"), "x"),
            record("1", "d", &format!("{base} second"), "x"),
        ];
        assert_eq!(dedup(records, &mut SeenKeys::new()).len(), 1);
    }

    #[test]
    fn test_seen_keys_carry_across_batches() {
        let mut seen = SeenKeys::new();
        dedup(vec![record("1", "d", "A", "x")], &mut seen);
        let second = dedup(vec![record("1", "d", "A", "x"), record("2", "d", "B", "x")], &mut seen);
        assert_eq!(second.len(), 1);
        assert!(seen.contains(&record("2", "d", "B", "x").key()));
    }

    #[test]
    fn test_different_entities_are_distinct() {
        let mut other = record("1", "d", "A", "x");
        other.entity_id = "0987.654.321".to_string();
        let unique = dedup(vec![record("1", "d", "A", "x"), other], &mut SeenKeys::new());
        assert_eq!(unique.len(), 2);
    }
}
