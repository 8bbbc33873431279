//! Controller-specific error types.
//!
//! Startup errors (`Kube`, `KubeConfig`, `InvalidConfig`, `Grafana` from the
//! startup gate) end the process. Everything a single reconciled item can
//! produce is logged and skipped.

use grafana_client::GrafanaError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Grafana Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Kubeconfig could not be loaded or inferred
    #[error("failed to build kubernetes config: {0}")]
    KubeConfig(String),

    /// Grafana API error
    #[error("Grafana error: {0}")]
    Grafana(#[from] GrafanaError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A payload entry could not be turned into a Grafana record
    #[error("invalid payload for {name}: {reason}")]
    InvalidPayload {
        /// Logical name of the item
        name: String,
        reason: String,
    },

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Signal handlers could not be installed
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}
