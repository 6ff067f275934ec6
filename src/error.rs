//! Error types for the crawl pipeline.

use thiserror::Error;

/// Failure retrieving a listing page through the browser session.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Browser not available: {0}")]
    Unavailable(String),
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("Timed out after {secs}s loading {url}")]
    Timeout { url: String, secs: u64 },
    #[error("Could not read page content: {0}")]
    Content(String),
}

/// Failure reading or writing the CSV sink. Always fatal for a run.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("Could not replace {path}: {reason}")]
    Persist { path: String, reason: String },
    #[error("{path} is not a readable catalog file: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Invalid or missing configuration, raised before any fetch begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("No categories configured")]
    NoCategories,
    #[error("Category #{index} has an empty name")]
    BlankCategoryName { index: usize },
    #[error("Category '{0}' is defined more than once")]
    DuplicateCategory(String),
    #[error("Category '{name}' has an invalid {field}: {reason}")]
    InvalidUrl {
        name: String,
        field: &'static str,
        reason: String,
    },
    #[error("Category '{0}' page template has no {{page}} placeholder")]
    MissingPagePlaceholder(String),
    #[error("Unknown category '{0}'")]
    UnknownCategory(String),
    #[error("Invalid setting {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Run-level failure that stops the whole crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Browser session failed to start: {0}")]
    Browser(#[source] FetchError),
}
