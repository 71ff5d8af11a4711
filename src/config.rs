//! Pipeline configuration loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration for the public gazette and deposits services.
//!
//! ```yaml
//! language: nl
//! max_pages: 50
//! fetch:
//!   download_delay_ms: 5000
//! deposits:
//!   page_size: 100
//! ```

use crate::error::ConfigError;
use crate::utils::{compact_enterprise_number, gazette_search_number};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gazette search endpoint.
    pub search_url: String,
    /// Interface language requested from the gazette.
    pub language: String,
    /// Query parameter carrying the page index in listing URLs.
    pub page_param: String,
    /// Index assumed for the first listing page when its URL carries none.
    pub first_page: u32,
    /// Hard cap on pages fetched per walk.
    pub max_pages: u32,
    /// Enterprises processed in parallel.
    pub concurrency: usize,
    pub fetch: FetchConfig,
    pub deposits: DepositsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.ejustice.just.fgov.be/cgi_tsv/article.pl".to_string(),
            language: "fr".to_string(),
            page_param: "page".to_string(),
            first_page: 1,
            max_pages: 200,
            concurrency: 4,
            fetch: FetchConfig::default(),
            deposits: DepositsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to each backoff.
    pub max_jitter_ms: u64,
    /// Politeness delay before every request.
    pub download_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
    /// Statuses that are retried instead of returned.
    pub retry_statuses: Vec<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 250,
            download_delay_ms: 3_000,
            timeout_secs: 30,
            user_agent: concat!("kbo_publications/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_language: "fr-BE,fr;q=0.9,en;q=0.8".to_string(),
            retry_statuses: vec![500, 502, 503, 504, 408, 429],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepositsConfig {
    pub api_url: String,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for DepositsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://consult.cbso.nbb.be/api/rs-consult/published-deposits".to_string(),
            page_size: 50,
            max_pages: 20,
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: shown.clone(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: shown.clone(),
            source,
        })?;
        info!(path = %shown, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// First gazette listing URL for an enterprise.
    pub fn search_url_for(&self, enterprise_number: &str) -> String {
        format!(
            "{}?language={}&btw_search={}",
            self.search_url,
            urlencoding::encode(&self.language),
            urlencoding::encode(&gazette_search_number(enterprise_number)),
        )
    }

    /// Deposits API URL for one page of an enterprise's deposits.
    pub fn deposits_url_for(&self, enterprise_number: &str, page: u32) -> String {
        format!(
            "{}?page={}&size={}&enterpriseNumber={}&sort=periodEndDate,desc&sort=depositDate,desc",
            self.deposits.api_url,
            page,
            self.deposits.page_size,
            urlencoding::encode(&compact_enterprise_number(enterprise_number)),
        )
    }
}
