// Error taxonomy for the reconciliation core.
//
// Network failures (FetchError) and payload failures (FeedError, ExtractError)
// are kept apart so callers can tell "could not reach the source" from
// "reached it but could not read it".

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("Request to {url} failed with status: {status}")]
    Status { url: String, status: u16 },
    #[error("Cache error: {0}")]
    Cache(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to decode {kind} feed: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: prost::DecodeError,
    },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to open GTFS zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Failed to read {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("Archive is missing required tables: {}", .0.join(", "))]
    MissingTables(Vec<&'static str>),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {name} URL '{url}': {reason}")]
    InvalidUrl {
        name: &'static str,
        url: String,
        reason: String,
    },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
