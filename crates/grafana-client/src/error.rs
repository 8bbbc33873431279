//! Grafana client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Grafana API
#[derive(Debug, Error)]
pub enum GrafanaError {
    /// HTTP request/response error (connection refused, timeout, bad body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Grafana answered with an unexpected status
    #[error("Grafana API error: unexpected HTTP status {status}: {body}")]
    Api {
        /// HTTP status code returned by Grafana
        status: u16,
        /// Response body, kept verbatim for the logs
        body: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configured base URL or a record is unusable for the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Grafana never answered the readiness probe
    #[error("unable to contact grafana after {attempts} attempts")]
    Unreachable {
        /// Number of probes that were made
        attempts: u32,
    },
}

impl GrafanaError {
    /// HTTP status carried by an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GrafanaError::Api { status, .. } => Some(*status),
            GrafanaError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
