//! Typed errors for the publication pipeline.
//!
//! Site-shape problems never surface here: an unrecognised page yields zero
//! records and a looping paginator ends the walk. Only the collaborators
//! (fetching, storage, configuration, input files) produce errors.

use thiserror::Error;

/// Errors returned by a [`crate::fetch::Fetch`] implementation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status the walk cannot use.
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body could not be read as text.
    #[error("could not read body of {url}: {reason}")]
    Body { url: String, reason: String },

    /// The URL could not be parsed or joined.
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

/// Errors raised by a [`crate::store::PublicationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store document {key} is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The store refused the write (used by test doubles and read-only stores).
    #[error("store rejected write to {key}: {reason}")]
    Rejected { key: String, reason: String },
}

/// Which external collection a failed write was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Aggregate,
    FlatRecord,
    Deposits,
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collection::Aggregate => f.write_str("enterprise aggregate"),
            Collection::FlatRecord => f.write_str("publication record"),
            Collection::Deposits => f.write_str("deposits"),
        }
    }
}

/// A persistence failure, scoped to one entity.
#[derive(Debug, Error)]
#[error("persisting {collection} for {entity_id} failed: {source}")]
pub struct PersistError {
    pub entity_id: String,
    pub collection: Collection,
    #[source]
    pub source: StoreError,
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors while loading the list of enterprise numbers.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read input file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input file {path} has no `{column}` column")]
    MissingColumn { path: String, column: String },

    /// Falling back to the store's enterprises failed.
    #[error("cannot list stored enterprises: {0}")]
    Store(#[from] StoreError),
}
