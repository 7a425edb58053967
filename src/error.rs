//! Error handling and custom error types
//!
//! Provides unified error handling across the uploader using thiserror.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("S3/CDN error: {0}")]
    S3(String),

    #[error("CDN error: {0}")]
    Cdn(String),

    #[error("read media {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload {name}: {source}")]
    Upload {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{}", describe_batch(.total, .failures))]
    Batch { total: usize, failures: Vec<Error> },

    #[error("upload cancelled after dispatching {dispatched} of {total} files")]
    Cancelled { dispatched: usize, total: usize },

    #[error("Cache decode error: {0}")]
    CacheDecode(String),

    #[error("cache file {}: {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Names of the items that failed inside a batch, in the order their
    /// failures were collected.
    pub fn failed_names(&self) -> Vec<&str> {
        match self {
            Error::Upload { name, .. } => vec![name.as_str()],
            Error::Batch { failures, .. } => failures.iter().flat_map(Error::failed_names).collect(),
            _ => Vec::new(),
        }
    }
}

fn describe_batch(total: &usize, failures: &[Error]) -> String {
    let mut message = format!(
        "upload images: {} of {} files failed:",
        failures.len(),
        total
    );
    for failure in failures {
        message.push_str("\n\t* ");
        message.push_str(&failure.to_string());
    }
    message
}
