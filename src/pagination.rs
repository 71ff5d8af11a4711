//! Pagination walker for one enterprise's gazette listing.
//!
//! The walk is strictly sequential: the next page is only known once the
//! current one has been parsed. Each [`Walker::step`] runs one
//! `Fetching → Extracting → DecidingNext` cycle and either continues or lands
//! in `Done`. The walk ends when
//!
//! - a page yields no records,
//! - a page advertises no next link,
//! - the next link's page index was already visited (the site loops back),
//! - a fetch fails or returns a non-success status,
//! - the page cap is reached.
//!
//! None of these are errors. Whatever was accumulated is the result, and a
//! caller may stop between steps and [`Walker::finish`] with the same effect.

use crate::config::PipelineConfig;
use crate::fetch::Fetch;
use crate::models::PublicationRecord;
use crate::scrapers::ejustice::{page_index, parse_listing};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Where a [`Walker`] is within its current page cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Fetching,
    Extracting,
    DecidingNext,
    Done,
}

/// Why a walk reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    EmptyPage { page: u32 },
    NoNextLink,
    LoopDetected { page: u32 },
    FetchFailed { url: String, reason: String },
    PageCap { pages: u32 },
    InvalidUrl { url: String },
    /// The caller stopped stepping before the walk ended by itself.
    Stopped,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::EmptyPage { page } => write!(f, "empty page {page}"),
            Termination::NoNextLink => f.write_str("no next link"),
            Termination::LoopDetected { page } => write!(f, "loop back to page {page}"),
            Termination::FetchFailed { url, reason } => write!(f, "fetch of {url} failed: {reason}"),
            Termination::PageCap { pages } => write!(f, "page cap of {pages} reached"),
            Termination::InvalidUrl { url } => write!(f, "invalid url {url}"),
            Termination::Stopped => f.write_str("stopped by caller"),
        }
    }
}

/// Per-walk state. Lives only as long as the walk.
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    pub entity_id: String,
    /// Index of the page about to be (or last) fetched; `None` when unknown.
    pub current_page_index: Option<u32>,
    /// Every known page index fetched or queued so far.
    pub visited_page_indices: HashSet<u32>,
    /// Records of all fetched pages, in visit order.
    pub accumulated_records: Vec<PublicationRecord>,
}

/// Outcome of a finished walk.
#[derive(Debug, Clone)]
pub struct WalkReport {
    pub entity_id: String,
    /// Records in site-visit order.
    pub records: Vec<PublicationRecord>,
    /// Pages fetched with a success status.
    pub pages_fetched: u32,
    pub termination: Termination,
}

/// Result of one [`Walker::step`].
#[derive(Debug)]
pub enum Step {
    /// A next page is queued.
    Continue,
    /// The walk is over; further steps return the same termination.
    Done(Termination),
}

/// Sequential walker over one enterprise's listing pages.
///
/// Borrows the fetcher for the length of the walk. Drive it with
/// [`Walker::step`] and hand over the result with [`Walker::finish`].
pub struct Walker<'a, F> {
    fetcher: &'a F,
    page_param: String,
    max_pages: u32,
    cursor: PaginationCursor,
    next_url: Option<Url>,
    pages_fetched: u32,
    state: WalkState,
    termination: Option<Termination>,
}

impl<'a, F: Fetch> Walker<'a, F> {
    pub fn new(fetcher: &'a F, entity_id: &str, first_url: &str, config: &PipelineConfig) -> Self {
        let mut walker = Self {
            fetcher,
            page_param: config.page_param.clone(),
            max_pages: config.max_pages.max(1),
            cursor: PaginationCursor {
                entity_id: entity_id.to_string(),
                current_page_index: None,
                visited_page_indices: HashSet::new(),
                accumulated_records: Vec::new(),
            },
            next_url: None,
            pages_fetched: 0,
            state: WalkState::Fetching,
            termination: None,
        };

        match Url::parse(first_url) {
            Ok(url) => {
                let first = page_index(&url, &walker.page_param).unwrap_or(config.first_page);
                walker.cursor.current_page_index = Some(first);
                walker.cursor.visited_page_indices.insert(first);
                walker.next_url = Some(url);
            }
            Err(_) => {
                walker.conclude(Termination::InvalidUrl {
                    url: first_url.to_string(),
                });
            }
        }
        walker
    }

    /// Current position in the page cycle.
    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Visited indices and records accumulated so far.
    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    fn conclude(&mut self, termination: Termination) -> Step {
        self.state = WalkState::Done;
        self.termination = Some(termination.clone());
        Step::Done(termination)
    }

    /// Fetch, extract and decide on one page.
    pub async fn step(&mut self) -> Step {
        if let Some(termination) = &self.termination {
            return Step::Done(termination.clone());
        }
        let Some(url) = self.next_url.take() else {
            return self.conclude(Termination::NoNextLink);
        };
        if self.pages_fetched >= self.max_pages {
            return self.conclude(Termination::PageCap {
                pages: self.pages_fetched,
            });
        }

        self.state = WalkState::Fetching;
        let page = match self.fetcher.fetch(url.as_str()).await {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                return self.conclude(Termination::FetchFailed {
                    url: url.to_string(),
                    reason: format!("HTTP {}", page.status),
                });
            }
            Err(e) => {
                return self.conclude(Termination::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        self.pages_fetched += 1;
        let page_url = Url::parse(&page.url).unwrap_or(url);

        self.state = WalkState::Extracting;
        let source_page = self.cursor.current_page_index.unwrap_or(self.pages_fetched);
        let listing = parse_listing(&page.body, &self.cursor.entity_id, source_page, &page_url);
        if listing.records.is_empty() {
            return self.conclude(Termination::EmptyPage { page: source_page });
        }
        self.cursor.accumulated_records.extend(listing.records);

        self.state = WalkState::DecidingNext;
        let Some(next) = listing.next_url else {
            return self.conclude(Termination::NoNextLink);
        };
        let next_index = page_index(&next, &self.page_param);
        if let Some(index) = next_index {
            if !self.cursor.visited_page_indices.insert(index) {
                warn!(
                    entity_id = %self.cursor.entity_id,
                    page = index,
                    url = %next,
                    "Next link points to an already visited page"
                );
                return self.conclude(Termination::LoopDetected { page: index });
            }
        }
        debug!(entity_id = %self.cursor.entity_id, next = %next, ?next_index, "Following next link");
        self.cursor.current_page_index = next_index;
        self.next_url = Some(next);
        Step::Continue
    }

    /// End the walk here and hand over what was accumulated.
    pub fn finish(self) -> WalkReport {
        let termination = self.termination.unwrap_or(Termination::Stopped);
        info!(
            entity_id = %self.cursor.entity_id,
            pages = self.pages_fetched,
            records = self.cursor.accumulated_records.len(),
            reason = %termination,
            "Walk finished"
        );
        WalkReport {
            entity_id: self.cursor.entity_id,
            records: self.cursor.accumulated_records,
            pages_fetched: self.pages_fetched,
            termination,
        }
    }
}

/// Walk every listing page reachable from `first_url`.
///
/// # Arguments
///
/// * `fetcher` - Fetch collaborator; retries are its business
/// * `entity_id` - Enterprise number stamped on every record
/// * `first_url` - Search URL of the first listing page
/// * `config` - Page parameter name, first page index and page cap
///
/// # Returns
///
/// A [`WalkReport`] with every record in site-visit order and the reason
/// the walk ended. Never fails.
#[instrument(level = "info", skip(fetcher, config))]
pub async fn walk<F: Fetch>(
    fetcher: &F,
    entity_id: &str,
    first_url: &str,
    config: &PipelineConfig,
) -> WalkReport {
    let mut walker = Walker::new(fetcher, entity_id, first_url, config);
    loop {
        match walker.step().await {
            Step::Continue => debug!(
                state = ?walker.state(),
                next_page = ?walker.cursor().current_page_index,
                records = walker.cursor().accumulated_records.len(),
                "Walk continues"
            ),
            Step::Done(termination) => {
                debug!(%termination, "Walk done");
                break;
            }
        }
    }
    walker.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedFetcher;

    const ENTITY: &str = "0123.456.789";
    const BASE: &str = "https://gazette.test/list";

    fn url(page: u32) -> String {
        format!("{BASE}?page={page}")
    }

    /// A structured listing page with `n` items and an optional next link.
    fn listing(tag: &str, n: usize, next: Option<&str>) -> String {
        let items: String = (0..n)
            .map(|i| {
                format!(
                    r#"<div class="list-item"><p class="list-item--subtitle">{tag}-{i}<br>SA</p>
                       <a class="list-item--title" href="/detail/{tag}/{i}">Addr<br>X<br>Type<br>2024-01-0{} / {i}</a></div>"#,
                    i + 1
                )
            })
            .collect();
        let next = next
            .map(|href| format!(r#"<a href="{href}">Suivant</a>"#))
            .unwrap_or_default();
        format!("<html><body><main>{items}</main>{next}</body></html>")
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn titles(report: &WalkReport) -> Vec<String> {
        report.records.iter().filter_map(|r| r.title.clone()).collect()
    }

    #[tokio::test]
    async fn test_loop_back_to_first_page_terminates() {
        let fetcher = ScriptedFetcher::new()
            .with_page(&url(1), &listing("p1", 1, Some("?page=2")))
            .with_page(&url(2), &listing("p2", 1, Some("?page=3")))
            .with_page(&url(3), &listing("p3", 1, Some("?page=1")));

        let report = walk(&fetcher, ENTITY, &url(1), &config()).await;

        assert_eq!(fetcher.calls(), vec![url(1), url(2), url(3)]);
        assert_eq!(report.termination, Termination::LoopDetected { page: 1 });
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(titles(&report), vec!["p1-0", "p2-0", "p3-0"]);
    }

    #[tokio::test]
    async fn test_first_url_without_page_param_counts_as_first_page() {
        let first = format!("{BASE}?btw_search=123456789");
        let fetcher = ScriptedFetcher::new()
            .with_page(&first, &listing("p1", 1, Some("?btw_search=123456789&page=2")))
            .with_page(
                &format!("{BASE}?btw_search=123456789&page=2"),
                &listing("p2", 1, Some("?btw_search=123456789&page=1")),
            );

        let report = walk(&fetcher, ENTITY, &first, &config()).await;
        assert_eq!(report.termination, Termination::LoopDetected { page: 1 });
        assert_eq!(fetcher.calls().len(), 2);
        assert_eq!(report.records[0].source_page, 1);
        assert_eq!(report.records[1].source_page, 2);
    }

    #[tokio::test]
    async fn test_empty_first_page_stops_immediately() {
        let fetcher = ScriptedFetcher::new()
            .with_page(&url(1), "<html><body></body></html>")
            .with_page(&url(2), &listing("p2", 2, None));

        let report = walk(&fetcher, ENTITY, &url(1), &config()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.termination, Termination::EmptyPage { page: 1 });
        assert_eq!(fetcher.calls(), vec![url(1)]);
    }

    #[tokio::test]
    async fn test_records_keep_site_visit_order() {
        let fetcher = ScriptedFetcher::new()
            .with_page(&url(1), &listing("a", 3, Some("?page=2")))
            .with_page(&url(2), &listing("b", 2, None));

        let report = walk(&fetcher, ENTITY, &url(1), &config()).await;
        assert_eq!(report.termination, Termination::NoNextLink);
        assert_eq!(titles(&report), vec!["a-0", "a-1", "a-2", "b-0", "b-1"]);
        assert!(report.records[..3].iter().all(|r| r.source_page == 1));
        assert!(report.records[3..].iter().all(|r| r.source_page == 2));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_accumulated_records() {
        let fetcher = ScriptedFetcher::new()
            .with_page(&url(1), &listing("a", 2, Some("?page=2")))
            .with_status(&url(2), 500);

        let report = walk(&fetcher, ENTITY, &url(1), &config()).await;
        assert_eq!(report.records.len(), 2);
        assert!(matches!(report.termination, Termination::FetchFailed { .. }));
        assert_eq!(report.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_unknown_indexes_are_bounded_by_page_cap() {
        // Every page links to another URL without a page parameter.
        let mut fetcher = ScriptedFetcher::new();
        for i in 0..10 {
            fetcher = fetcher.with_page(
                &format!("{BASE}?cursor={i}"),
                &listing(&format!("c{i}"), 1, Some(&format!("?cursor={}", i + 1))),
            );
        }
        let mut config = config();
        config.max_pages = 4;

        let report = walk(&fetcher, ENTITY, &format!("{BASE}?cursor=0"), &config).await;
        assert_eq!(report.termination, Termination::PageCap { pages: 4 });
        assert_eq!(fetcher.calls().len(), 4);
        let pages: Vec<u32> = report.records.iter().map(|r| r.source_page).collect();
        assert_eq!(pages, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_stopping_between_steps_returns_partial_result() {
        let fetcher = ScriptedFetcher::new()
            .with_page(&url(1), &listing("a", 2, Some("?page=2")))
            .with_page(&url(2), &listing("b", 2, None));
        let config = config();

        let mut walker = Walker::new(&fetcher, ENTITY, &url(1), &config);
        assert!(matches!(walker.step().await, Step::Continue));
        assert_eq!(walker.state(), WalkState::DecidingNext);
        assert_eq!(walker.cursor().visited_page_indices, HashSet::from([1, 2]));

        let report = walker.finish();
        assert_eq!(report.termination, Termination::Stopped);
        assert_eq!(titles(&report), vec!["a-0", "a-1"]);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_first_url_is_done_without_fetching() {
        let fetcher = ScriptedFetcher::new();
        let report = walk(&fetcher, ENTITY, "not a url", &config()).await;
        assert!(matches!(report.termination, Termination::InvalidUrl { .. }));
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_page_without_main_region_ends_walk_empty() {
        let fetcher = ScriptedFetcher::new().with_page(
            &url(1),
            "<html><body><h1>Service temporairement indisponible</h1>\
             <p>Veuillez reessayer plus tard</p></body></html>",
        );
        let report = walk(&fetcher, ENTITY, &url(1), &config()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.termination, Termination::EmptyPage { page: 1 });
    }

    #[tokio::test]
    async fn test_item_link_with_next_like_text_is_not_followed() {
        let first = listing("a", 1, Some("?page=2"))
            .replace(">Addr<br>", ">Nextstraat 1, 2000 Antwerpen<br>");
        let fetcher = ScriptedFetcher::new()
            .with_page(&url(1), &first)
            .with_page(&url(2), &listing("b", 1, None));

        let report = walk(&fetcher, ENTITY, &url(1), &config()).await;
        assert_eq!(fetcher.calls(), vec![url(1), url(2)]);
        assert_eq!(report.termination, Termination::NoNextLink);
        assert_eq!(titles(&report), vec!["a-0", "b-0"]);
        assert_eq!(report.records[0].address.as_deref(), Some("Nextstraat 1, 2000 Antwerpen"));
    }

    #[tokio::test]
    async fn test_step_after_done_is_stable() {
        let fetcher = ScriptedFetcher::new().with_page(&url(1), &listing("a", 1, None));
        let config = config();
        let mut walker = Walker::new(&fetcher, ENTITY, &url(1), &config);
        assert!(matches!(walker.step().await, Step::Done(Termination::NoNextLink)));
        assert!(matches!(walker.step().await, Step::Done(Termination::NoNextLink)));
        assert_eq!(walker.state(), WalkState::Done);
        assert_eq!(fetcher.calls().len(), 1);
    }
}
