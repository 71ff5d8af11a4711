//! Source-specific parsers.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Belgian Official Gazette | [`ejustice`] | HTML scraping | Paginated publication listings per enterprise |
//! | National Bank CBSO | [`cbso`] | JSON API | Paged financial-statement deposits |
//!
//! Parsers are pure: they turn a fetched body into records and never fetch
//! on their own, except for [`cbso::fetch_deposits`] which drives the API's
//! own paging through the [`crate::fetch::Fetch`] contract.

pub mod cbso;
pub mod ejustice;
