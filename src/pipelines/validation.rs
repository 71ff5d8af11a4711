//! Record validation and light repair.
//!
//! Text fields are trimmed and blank values become `None` before checking.
//! A record needs an entity id and either a title or a publication number.
//! A publication date without a 4-digit year is logged as suspect and kept.

use crate::models::PublicationRecord;
use crate::utils::has_year;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: Vec<PublicationRecord>,
    pub rejected: usize,
    pub suspect_dates: usize,
}

impl ValidationReport {
    /// Records came in but none survived: the batch carries nothing usable.
    pub fn nothing_usable(&self) -> bool {
        self.valid.is_empty() && self.rejected > 0
    }
}

fn repair_field(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Trim every optional text field, turning blanks into `None`.
pub fn repair(mut record: PublicationRecord) -> PublicationRecord {
    record.entity_id = record.entity_id.trim().to_string();
    for field in [
        &mut record.title,
        &mut record.publication_number,
        &mut record.publication_date,
        &mut record.address,
        &mut record.publication_type,
        &mut record.reference,
        &mut record.document_url,
        &mut record.detail_url,
        &mut record.code,
        &mut record.secondary_id,
    ] {
        *field = repair_field(field.take());
    }
    record
}

pub fn is_valid(record: &PublicationRecord) -> bool {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    !record.entity_id.trim().is_empty() && (filled(&record.title) || filled(&record.publication_number))
}

pub fn validate(records: Vec<PublicationRecord>) -> ValidationReport {
    let mut report = ValidationReport::default();

    for record in records.into_iter().map(repair) {
        if !is_valid(&record) {
            warn!(
                entity_id = %record.entity_id,
                source_page = record.source_page,
                "Publication rejected: neither title nor number"
            );
            report.rejected += 1;
            continue;
        }
        if let Some(date) = record.publication_date.as_deref().filter(|d| !has_year(d)) {
            warn!(entity_id = %record.entity_id, date, "Suspect publication date");
            report.suspect_dates += 1;
        }
        report.valid.push(record);
    }

    debug!(
        valid = report.valid.len(),
        rejected = report.rejected,
        suspect_dates = report.suspect_dates,
        "Validated batch"
    );
    report
}
