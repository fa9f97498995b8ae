//! Transport errors and the per-artifact degradation taxonomy.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while retrieving an artifact from a source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status other than 404.
    #[error("unexpected status {0}")]
    Status(u16),

    /// Local file access failed for a reason other than absence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why one artifact did not contribute to a result.
///
/// Recorded, never raised: the affected fragment falls back to its empty
/// default and the rest of the load continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SourceFailure {
    /// The artifact does not exist.
    NotFound,
    /// The artifact exists but could not be parsed or had an unexpected shape.
    Malformed(String),
    /// The artifact did not arrive before the optional-fetch deadline.
    Timeout,
    /// The request itself failed.
    Transport(String),
}

impl From<&FetchError> for SourceFailure {
    fn from(e: &FetchError) -> Self {
        SourceFailure::Transport(e.to_string())
    }
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFailure::NotFound => f.write_str("not found"),
            SourceFailure::Malformed(detail) => write!(f, "malformed: {detail}"),
            SourceFailure::Timeout => f.write_str("timed out"),
            SourceFailure::Transport(detail) => write!(f, "transport: {detail}"),
        }
    }
}
