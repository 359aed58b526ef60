// src/error.rs

use thiserror::Error;

/// A single GET against the timing host failed: network, timeout, TLS or a
/// non-success status. No partial body is ever returned alongside it.
#[derive(Debug, Error)]
#[error("fetching {url} failed: {source}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub source: reqwest::Error,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }

    /// HTTP status, when the server answered with a non-success code.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        self.source.status()
    }
}

/// Page-level failures. Either of these aborts the whole poll.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no table found on the page")]
    NoTableFound,
}

/// A "Last" cell that does not reduce to a number of seconds.
#[derive(Debug, Error, PartialEq)]
#[error("malformed lap time {text:?}")]
pub struct TimeFormatError {
    pub text: String,
}

/// Per-row failures. The row is dropped, the poll carries on.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("row has no {column} cell (index {index})")]
    MissingColumn { column: &'static str, index: usize },

    #[error("position {0:?} is not a positive integer")]
    BadPosition(String),

    #[error("lap count {0:?} is not a non-negative integer")]
    BadLapCount(String),

    #[error(transparent)]
    TimeFormat(#[from] TimeFormatError),
}
