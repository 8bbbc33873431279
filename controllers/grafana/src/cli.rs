//! Command line interface.

use crate::config::{
    ClusterConfig, Config, DEFAULT_FALLBACK_PORT, DatasourceConfig, GrafanaConfig, NameSeparator,
    WatchConfig,
};
use crate::error::ControllerError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Update Grafana datasources and dashboards from Kubernetes
#[derive(Debug, Parser)]
#[command(name = "grafana-controller")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level or tracing filter directive (e.g. "debug", "info,kube=warn")
    #[arg(short = 'l', long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Synchronize dashboards from labelled ConfigMaps
    Dashboards(DashboardsArgs),
    /// Synchronize datasources from labelled Services
    Datasources(DatasourcesArgs),
}

#[derive(Debug, Clone, Args)]
pub struct GrafanaArgs {
    /// Grafana base URL
    #[arg(long, default_value = "http://localhost:3000")]
    pub grafana_url: String,

    /// Grafana API token, sent as a bearer token
    #[arg(long, env = "GRAFANA_TOKEN", hide_env_values = true)]
    pub grafana_token: Option<String>,

    /// How many times to probe Grafana before giving up
    #[arg(long, default_value_t = 100)]
    pub startup_attempts: u32,

    /// Seconds between startup probes
    #[arg(long, default_value_t = 1)]
    pub startup_interval: u64,
}

#[derive(Debug, Clone, Args)]
pub struct KubernetesArgs {
    /// Override the Kubernetes API server URL from the kubeconfig
    #[arg(long)]
    pub apiserver: Option<String>,

    /// Path to kubeconfig [default: $KUBECONFIG, ~/.kube/config, then in-cluster]
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace to watch [default: all namespaces]
    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DashboardsArgs {
    #[command(flatten)]
    pub grafana: GrafanaArgs,

    #[command(flatten)]
    pub kubernetes: KubernetesArgs,

    /// Label selector for dashboard ConfigMaps
    #[arg(long, default_value = "type=grafana-dashboard")]
    pub selector: String,

    /// Seconds between full resyncs
    #[arg(long, default_value_t = 300)]
    pub resync_period: u64,
}

#[derive(Debug, Clone, Args)]
pub struct DatasourcesArgs {
    #[command(flatten)]
    pub grafana: GrafanaArgs,

    #[command(flatten)]
    pub kubernetes: KubernetesArgs,

    /// Label selector for datasource Services
    #[arg(long, default_value = "app=prometheus")]
    pub selector: String,

    /// Seconds between full resyncs
    #[arg(long, default_value_t = 60)]
    pub resync_period: u64,

    /// Separator between service name and namespace in datasource names ('.' or '_')
    #[arg(long, default_value = ".")]
    pub name_separator: NameSeparator,

    /// Grafana datasource type
    #[arg(long, default_value = "prometheus")]
    pub datasource_type: String,

    /// Grafana datasource access mode
    #[arg(long, default_value = "proxy")]
    pub datasource_access: String,

    /// Port used when a Service declares none
    #[arg(long, default_value_t = DEFAULT_FALLBACK_PORT)]
    pub fallback_port: i32,
}

fn build_config(
    grafana: &GrafanaArgs,
    kubernetes: &KubernetesArgs,
    selector: &str,
    resync_period: u64,
) -> Result<Config, ControllerError> {
    let config = Config {
        grafana: GrafanaConfig {
            url: grafana.grafana_url.clone(),
            token: grafana.grafana_token.clone().filter(|t| !t.is_empty()),
            startup_attempts: grafana.startup_attempts,
            startup_interval: Duration::from_secs(grafana.startup_interval),
        },
        cluster: ClusterConfig {
            apiserver: kubernetes.apiserver.clone().filter(|s| !s.is_empty()),
            kubeconfig: kubernetes.kubeconfig.clone(),
        },
        watch: WatchConfig {
            namespace: kubernetes.namespace.clone().filter(|ns| !ns.is_empty()),
            selector: selector.to_string(),
            resync_period: Duration::from_secs(resync_period),
        },
    };
    config.validate()?;
    Ok(config)
}

impl DashboardsArgs {
    pub fn config(&self) -> Result<Config, ControllerError> {
        build_config(&self.grafana, &self.kubernetes, &self.selector, self.resync_period)
    }
}

impl DatasourcesArgs {
    pub fn config(&self) -> Result<Config, ControllerError> {
        build_config(&self.grafana, &self.kubernetes, &self.selector, self.resync_period)
    }

    pub fn datasource_config(&self) -> Result<DatasourceConfig, ControllerError> {
        let config = DatasourceConfig {
            separator: self.name_separator,
            datasource_type: self.datasource_type.clone(),
            access: self.datasource_access.clone(),
            fallback_port: self.fallback_port,
        };
        config.validate()?;
        Ok(config)
    }
}
