//! Error taxonomy surfaced to callers of the orchestrator.
//!
//! Store, schema and CLI plumbing use `anyhow::Result`; at the orchestrator
//! boundary those failures are wrapped into [`SearchError`] so callers can
//! tell a bad request apart from an unavailable corpus. Free text that
//! tokenizes to nothing is not an error, and cache faults never reach here.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The request carried a value that cannot be served as given.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The corpus or its index could not be reached for this request.
    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(#[source] anyhow::Error),

    /// The computation exceeded the configured time budget and was abandoned.
    #[error("search exceeded time budget of {0:?}")]
    Timeout(Duration),

    #[error("case {0} not found")]
    CaseNotFound(i64),
}

impl SearchError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SearchError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending request field, for input errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            SearchError::InvalidInput { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;
