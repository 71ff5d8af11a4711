//! Enterprise numbers to process.
//!
//! Numbers come from the command line list and from the `EnterpriseNumber`
//! column of an optional CSV file. With neither given, the enterprises
//! already in the store are refreshed. Blank cells are skipped, duplicates
//! are removed keeping the first occurrence, and `limit` truncates the result.

use crate::error::InputError;
use crate::store::JsonStore;
use itertools::Itertools;
use std::mem::take;
use std::path::Path;
use tracing::{debug, info, instrument};

pub const ENTERPRISE_COLUMN: &str = "EnterpriseNumber";

/// Quote and CRLF tolerant CSV row splitter.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Values of the `EnterpriseNumber` column, in file order.
pub fn numbers_from_csv(text: &str, path: &str) -> Result<Vec<String>, InputError> {
    let mut rows = parse_rows(text.trim_start_matches('\u{feff}')).into_iter();
    let header = rows.next().unwrap_or_default();
    let column = header
        .iter()
        .position(|h| h.trim() == ENTERPRISE_COLUMN)
        .ok_or_else(|| InputError::MissingColumn {
            path: path.to_string(),
            column: ENTERPRISE_COLUMN.to_string(),
        })?;

    Ok(rows.filter_map(|row| row.get(column).cloned()).collect())
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_csv(path: &Path) -> Result<Vec<String>, InputError> {
    let shown = path.display().to_string();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Read {
            path: shown.clone(),
            source,
        })?;
    let numbers = numbers_from_csv(&text, &shown)?;
    info!(count = numbers.len(), "Read enterprise numbers");
    Ok(numbers)
}

/// Merge the sources, drop blanks and duplicates, then apply `limit`.
pub fn collect_numbers(
    listed: impl IntoIterator<Item = String>,
    from_csv: impl IntoIterator<Item = String>,
    limit: Option<usize>,
) -> Vec<String> {
    let numbers = listed
        .into_iter()
        .chain(from_csv)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unique()
        .take(limit.unwrap_or(usize::MAX))
        .collect::<Vec<_>>();
    debug!(count = numbers.len(), ?limit, "Enterprise numbers selected");
    numbers
}

/// Enterprise numbers for this run.
///
/// Explicit inputs win. Without any, falls back to the enterprises the
/// store already holds.
pub async fn resolve_numbers(
    listed: Vec<String>,
    csv: Option<&Path>,
    limit: Option<usize>,
    store: &JsonStore,
) -> Result<Vec<String>, InputError> {
    if listed.is_empty() && csv.is_none() {
        let stored = store.enterprise_numbers().await?;
        info!(count = stored.len(), "No input given; refreshing stored enterprises");
        return Ok(collect_numbers(stored, Vec::new(), limit));
    }

    let from_csv = match csv {
        Some(path) => read_csv(path).await?,
        None => Vec::new(),
    };
    Ok(collect_numbers(listed, from_csv, limit))
}
