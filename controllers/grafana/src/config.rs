//! Controller configuration.
//!
//! Built once from the command line and handed to each component by
//! reference.

use crate::error::ControllerError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Port used for a Service that declares none
pub const DEFAULT_FALLBACK_PORT: i32 = 9200;

/// Everything one synchronisation run needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub grafana: GrafanaConfig,
    pub cluster: ClusterConfig,
    pub watch: WatchConfig,
}

/// How to reach Grafana and how long to wait for it at startup.
#[derive(Clone)]
pub struct GrafanaConfig {
    pub url: String,
    pub token: Option<String>,
    pub startup_attempts: u32,
    pub startup_interval: Duration,
}

impl fmt::Debug for GrafanaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafanaConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("startup_attempts", &self.startup_attempts)
            .field("startup_interval", &self.startup_interval)
            .finish()
    }
}

/// How to reach the Kubernetes API server.
///
/// With neither field set the kubeconfig is inferred: `$KUBECONFIG`, then
/// `~/.kube/config`, then the in-cluster service account.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub apiserver: Option<String>,
    pub kubeconfig: Option<PathBuf>,
}

/// Which objects to watch and how often to replay them.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// `None` watches all namespaces
    pub namespace: Option<String>,
    pub selector: String,
    pub resync_period: Duration,
}

/// Joins service name and namespace into a datasource name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameSeparator {
    /// `svc.ns`, which also resolves as a cluster DNS name
    #[default]
    Dot,
    /// `svc_ns`
    Underscore,
}

impl NameSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            NameSeparator::Dot => ".",
            NameSeparator::Underscore => "_",
        }
    }
}

impl std::str::FromStr for NameSeparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "." | "dot" => Ok(NameSeparator::Dot),
            "_" | "underscore" => Ok(NameSeparator::Underscore),
            other => Err(format!("unsupported name separator {:?}, use '.' or '_'", other)),
        }
    }
}

/// Shape of the datasources created for Services.
#[derive(Debug, Clone)]
pub struct DatasourceConfig {
    pub separator: NameSeparator,
    pub datasource_type: String,
    pub access: String,
    pub fallback_port: i32,
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            separator: NameSeparator::Dot,
            datasource_type: "prometheus".to_string(),
            access: "proxy".to_string(),
            fallback_port: DEFAULT_FALLBACK_PORT,
        }
    }
}

impl Config {
    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.grafana.url.trim().is_empty() {
            return Err(ControllerError::InvalidConfig("grafana url must not be empty".to_string()));
        }
        if self.grafana.startup_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "startup attempts must be at least 1".to_string(),
            ));
        }
        if self.watch.resync_period.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "resync period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl DatasourceConfig {
    pub fn validate(&self) -> Result<(), ControllerError> {
        if !(1..=65535).contains(&self.fallback_port) {
            return Err(ControllerError::InvalidConfig(format!(
                "fallback port {} is not a valid port",
                self.fallback_port
            )));
        }
        if self.datasource_type.is_empty() {
            return Err(ControllerError::InvalidConfig("datasource type must not be empty".to_string()));
        }
        Ok(())
    }
}
