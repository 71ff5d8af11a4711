//! Data models for gazette publications, financial deposits and the stored
//! enterprise aggregate.
//!
//! - [`PublicationRecord`]: one notice extracted from a listing page
//! - [`PublicationKey`]: identity used by deduplication and set-union merges
//! - [`StoredPublication`]: a record as kept in the aggregate, with its scrape time
//! - [`EntityAggregate`]: the per-enterprise document in the store
//! - [`Deposit`]: one financial-statement deposit from the deposits API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of title characters that take part in a record's identity.
pub const TITLE_KEY_CHARS: usize = 50;

/// One gazette notice belonging to one enterprise.
///
/// Serializes to the flat per-publication JSON shape. `source_page` is
/// bookkeeping for the walk and stays out of the serialized document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// Enterprise number in the form it was requested with.
    pub entity_id: String,
    /// Enterprise name as printed on the listing.
    pub title: Option<String>,
    /// Gazette publication number, usually the PDF file stem.
    pub publication_number: Option<String>,
    /// Publication date, `YYYY-MM-DD` when the listing shows one.
    pub publication_date: Option<String>,
    /// Registered address at the time of publication.
    pub address: Option<String>,
    /// Kind of notice (nomination, statutes, dissolution, ...).
    pub publication_type: Option<String>,
    /// Gazette reference printed after the date.
    pub reference: Option<String>,
    /// Absolute URL of the scanned PDF.
    pub document_url: Option<String>,
    /// Absolute URL of the notice's detail page.
    pub detail_url: Option<String>,
    /// Short code from the listing subtitle, usually the legal form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Second line of a structured title block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    /// Listing page the record came from.
    #[serde(skip)]
    pub source_page: u32,
}

impl PublicationRecord {
    /// Empty record for `entity_id` extracted from page `source_page`.
    pub fn new(entity_id: &str, source_page: u32) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            source_page,
            ..Self::default()
        }
    }

    pub fn key(&self) -> PublicationKey {
        PublicationKey::of(self)
    }

    /// Deterministic id of this record in the flat publications collection:
    /// `entity_publicationNumberOrUnknown_publicationDateOrNodate`.
    pub fn record_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.entity_id,
            self.publication_number.as_deref().unwrap_or("unknown"),
            self.publication_date.as_deref().unwrap_or("nodate"),
        )
    }
}

/// Identity of a publication within one enterprise's record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicationKey {
    pub entity_id: String,
    pub publication_number: String,
    pub publication_date: String,
    pub title_prefix: String,
}

impl PublicationKey {
    pub fn of(record: &PublicationRecord) -> Self {
        Self {
            entity_id: record.entity_id.clone(),
            publication_number: record.publication_number.clone().unwrap_or_default(),
            publication_date: record.publication_date.clone().unwrap_or_default(),
            title_prefix: record
                .title
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(TITLE_KEY_CHARS)
                .collect(),
        }
    }
}

impl std::fmt::Display for PublicationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {:?})",
            self.entity_id, self.publication_number, self.publication_date, self.title_prefix
        )
    }
}

/// A publication as kept inside an [`EntityAggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPublication {
    #[serde(flatten)]
    pub record: PublicationRecord,
    pub scraped_at: DateTime<Utc>,
}

/// One financial-statement deposit for an enterprise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Model name of the filed statement.
    pub title: String,
    pub reference: String,
    /// Deposit date.
    pub start_date: String,
    /// End of the accounting period covered.
    pub end_date: String,
    pub language: String,
}

/// The per-enterprise document held by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAggregate {
    pub enterprise_number: String,
    /// Union of every publication ever delivered, first-seen order.
    #[serde(default)]
    pub publications: Vec<StoredPublication>,
    /// Time of the last publication merge.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Latest complete deposits listing; `None` until one was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposits: Option<Vec<Deposit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposits_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposits_updated: Option<DateTime<Utc>>,
}

impl EntityAggregate {
    pub fn new(enterprise_number: &str) -> Self {
        Self {
            enterprise_number: enterprise_number.to_string(),
            ..Self::default()
        }
    }

    /// Set-union merge keyed by [`PublicationKey`].
    ///
    /// Entries already present keep their position and their original
    /// `scraped_at`; unseen records are appended in input order. Always
    /// refreshes `last_updated`. Returns how many records were added.
    pub fn merge_publications(&mut self, records: &[PublicationRecord], now: DateTime<Utc>) -> usize {
        let mut present: std::collections::HashSet<PublicationKey> =
            self.publications.iter().map(|p| p.record.key()).collect();

        let mut added = 0;
        for record in records {
            if present.insert(record.key()) {
                self.publications.push(StoredPublication {
                    record: record.clone(),
                    scraped_at: now,
                });
                added += 1;
            }
        }
        self.last_updated = Some(now);
        added
    }

    /// Replace the deposits list wholesale.
    pub fn set_deposits(&mut self, url: &str, deposits: Vec<Deposit>, now: DateTime<Utc>) {
        self.deposits = Some(deposits);
        self.deposits_url = Some(url.to_string());
        self.deposits_updated = Some(now);
    }
}
