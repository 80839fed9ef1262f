//! Error types for the storage and group layers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("download failed: {0}")]
    Download(#[from] TransportError),

    #[error("content I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("content path {0} must be a directory or absent")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("an active record named '{0}' already exists")]
    NameTaken(String),

    #[error("no record with id {0}")]
    UnknownRecord(uuid::Uuid),
}

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("no active record named '{0}'")]
    NotFound(String),

    #[error("an active record named '{0}' already exists")]
    NameTaken(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("intent journal: {0}")]
    Journal(#[from] JournalError),
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encoding: {0}")]
    Serde(#[from] serde_json::Error),
}
