//! National Bank (CBSO) published-deposits API.
//!
//! The API answers paged JSON (`content`, `totalPages`, `last`). Each entry
//! becomes a [`Deposit`]. Deposits are stored with replace semantics, so a
//! listing is only returned when every page was read: a partial list would
//! overwrite a complete one from an earlier run.

use crate::config::PipelineConfig;
use crate::fetch::Fetch;
use crate::models::Deposit;
use crate::utils::truncate_for_log;
use serde::Deserialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Deserialize)]
struct DepositPage {
    #[serde(default)]
    content: Vec<RawDeposit>,
    #[serde(default, rename = "totalPages")]
    total_pages: Option<u32>,
    #[serde(default)]
    last: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawDeposit {
    #[serde(default, rename = "modelName")]
    model_name: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default, rename = "depositDate")]
    deposit_date: Option<String>,
    #[serde(default, rename = "periodEndDate")]
    period_end_date: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

impl From<RawDeposit> for Deposit {
    fn from(raw: RawDeposit) -> Self {
        Deposit {
            title: trimmed(raw.model_name),
            reference: trimmed(raw.reference),
            start_date: trimmed(raw.deposit_date),
            end_date: trimmed(raw.period_end_date),
            language: trimmed(raw.language),
        }
    }
}

/// One parsed API page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDeposits {
    pub deposits: Vec<Deposit>,
    pub has_more: bool,
}

/// Parse one page of the deposits API for page number `page` (0-based).
pub fn parse_deposits(body: &str, page: u32) -> Result<ParsedDeposits, serde_json::Error> {
    let parsed: DepositPage = serde_json::from_str(body)?;
    let has_more = !parsed.content.is_empty()
        && match (parsed.last, parsed.total_pages) {
            (Some(last), _) => !last,
            (None, Some(total)) => page + 1 < total,
            (None, None) => false,
        };
    Ok(ParsedDeposits {
        deposits: parsed.content.into_iter().map(Deposit::from).collect(),
        has_more,
    })
}

/// All deposits of one enterprise, with the URL of the first page.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositListing {
    pub url: String,
    pub deposits: Vec<Deposit>,
}

/// Read every page of an enterprise's deposits.
///
/// Returns `None` when any page fails to fetch or parse.
#[instrument(level = "info", skip(fetcher, config))]
pub async fn fetch_deposits<F: Fetch>(
    fetcher: &F,
    config: &PipelineConfig,
    entity_id: &str,
) -> Option<DepositListing> {
    let first_url = config.deposits_url_for(entity_id, 0);
    let mut deposits = Vec::new();

    for page in 0..config.deposits.max_pages.max(1) {
        let url = config.deposits_url_for(entity_id, page);
        let body = match fetcher.fetch(&url).await {
            Ok(p) if p.is_success() => p.body,
            Ok(p) => {
                warn!(%url, status = p.status, "Deposits page refused");
                return None;
            }
            Err(e) => {
                warn!(%url, error = %e, "Deposits fetch failed");
                return None;
            }
        };

        let parsed = match parse_deposits(&body, page) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    %url,
                    error = %e,
                    body_preview = %truncate_for_log(&body, 200),
                    "Deposits page is not the expected JSON"
                );
                return None;
            }
        };
        deposits.extend(parsed.deposits);
        if !parsed.has_more {
            break;
        }
    }

    info!(count = deposits.len(), "Collected deposits");
    Some(DepositListing {
        url: first_url,
        deposits,
    })
}
