//! Error types for the GitHub billing exporter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting GitHub billing metrics
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// Network failure reaching the GitHub API
    #[error("GitHub request failed, organization: {org} collector: {subsystem}: {source}")]
    Transport {
        org: String,
        subsystem: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// GitHub answered with a non-success status code
    #[error("status {status}, organization: {org} collector: {subsystem}")]
    Status {
        status: reqwest::StatusCode,
        org: String,
        subsystem: &'static str,
    },

    /// Response body could not be decoded
    #[error("Failed to decode GitHub response, organization: {org} collector: {subsystem}: {reason}")]
    Decode {
        org: String,
        subsystem: &'static str,
        reason: String,
    },

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Collector exceeded its per-cycle deadline
    #[error("Collector {collector} timed out after {seconds}s")]
    Timeout { collector: String, seconds: u64 },

    // =========================================================================
    // Setup Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collector name is not registered
    #[error("Unknown collector: {0}")]
    UnknownCollector(String),

    // =========================================================================
    // Exposition Errors
    // =========================================================================
    /// Measurement label values do not match the descriptor's label names
    #[error("Metric {metric} expects {expected} label values, got {actual}")]
    LabelCardinality {
        metric: String,
        expected: usize,
        actual: usize,
    },

    /// Prometheus client error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Organization the error relates to, if any
    pub fn org(&self) -> Option<&str> {
        match self {
            Error::Transport { org, .. } | Error::Status { org, .. } | Error::Decode { org, .. } => {
                Some(org)
            }
            _ => None,
        }
    }
}
