//! Error taxonomy for a run.
//!
//! `FatalError` aborts the run before any output is written. `QuoteUnavailable`
//! only degrades the row that needed the quote.

use thiserror::Error;

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The source workbook is unreadable or malformed.
    #[error("Invalid input: {0}")]
    InputFormat(String),

    /// A required setting or API key is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Why a quote could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteUnavailable {
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Unknown symbol, currency or date.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection, timeout or upstream server failure.
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The run-level deadline expired before the lookup finished.
    #[error("lookup timed out: {0}")]
    TimedOut(String),
}

impl QuoteUnavailable {
    /// Stable machine-readable reason used in reports.
    pub fn reason(&self) -> &'static str {
        match self {
            QuoteUnavailable::Unauthorized(_) => "unauthorized",
            QuoteUnavailable::RateLimited(_) => "rate_limited",
            QuoteUnavailable::NotFound(_) => "not_found",
            QuoteUnavailable::Network(_) => "network_error",
            QuoteUnavailable::InvalidResponse(_) => "invalid_response",
            QuoteUnavailable::TimedOut(_) => "timed_out",
        }
    }

    /// Only transient failures can succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, QuoteUnavailable::Network(_))
    }
}

impl From<reqwest::Error> for QuoteUnavailable {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            QuoteUnavailable::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            QuoteUnavailable::from_status(status, &err.to_string())
        } else {
            QuoteUnavailable::Network(err.to_string())
        }
    }
}

impl QuoteUnavailable {
    /// Maps a non-success HTTP status onto the taxonomy.
    pub fn from_status(status: reqwest::StatusCode, detail: &str) -> Self {
        let message = format!("HTTP {status}: {detail}");
        match status.as_u16() {
            401 | 403 => QuoteUnavailable::Unauthorized(message),
            429 => QuoteUnavailable::RateLimited(message),
            400 | 404 | 422 => QuoteUnavailable::NotFound(message),
            408 | 500..=599 => QuoteUnavailable::Network(message),
            _ => QuoteUnavailable::InvalidResponse(message),
        }
    }
}
