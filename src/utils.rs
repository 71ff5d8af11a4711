//! Utility functions for text cleanup, enterprise-number handling and file
//! system checks.
//!
//! - Whitespace normalization shared by both extraction shapes
//! - String truncation for logging
//! - Enterprise-number normalization for the two remote services
//! - File system validation for the store directory

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static YEAR_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("static regex"));

/// Collapse runs of whitespace into a single space and trim the ends.
///
/// Non-breaking spaces count as whitespace. Returns `None` when nothing is
/// left, so callers can map straight into optional record fields.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(clean_text("  Rue de la Loi\n\t 1 "), Some("Rue de la Loi 1".into()));
/// assert_eq!(clean_text(" \n "), None);
/// ```
pub fn clean_text(s: &str) -> Option<String> {
    let cleaned = WHITESPACE.replace_all(s.trim(), " ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_owned())
    }
}

/// `true` when the string holds something that looks like a 4-digit year.
pub fn has_year(s: &str) -> bool {
    YEAR_LIKE.is_match(s)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary at or before `max`
/// bytes with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Enterprise number without dots or surrounding whitespace.
///
/// The deposits API expects this form (`0123.456.789` → `0123456789`).
pub fn compact_enterprise_number(number: &str) -> String {
    number.trim().replace('.', "").replace(' ', "")
}

/// Enterprise number as the gazette search expects it: compact, with one
/// leading zero dropped (`0123.456.789` → `123456789`).
pub fn gazette_search_number(number: &str) -> String {
    let compact = compact_enterprise_number(number);
    match compact.strip_prefix('0') {
        Some(rest) => rest.to_string(),
        None => compact,
    }
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a scratch file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let scratch_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Store directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
