//! Grafana Controller
//!
//! Keeps Grafana in step with labelled Kubernetes objects:
//! - `dashboards`: every entry of a selected ConfigMap becomes a dashboard
//! - `datasources`: every selected Service becomes a datasource
//!
//! Records are created or overwritten, never deleted.

mod cli;
mod config;
mod controller;
mod error;
mod reconciler;
mod signal;
mod watcher;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use reconciler::{DashboardMapper, DatasourceMapper};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn log_config(config: &Config) {
    info!("Configuration:");
    info!("  Grafana URL: {}", config.grafana.url);
    info!("  Grafana token: {}", if config.grafana.token.is_some() { "set" } else { "not set" });
    info!("  Namespace: {}", config.watch.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Selector: {}", config.watch.selector);
    info!("  Resync period: {:?}", config.watch.resync_period);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    // kube and reqwest both build rustls configs
    rustls::crypto::ring::default_provider().install_default().ok();

    match cli.command {
        Command::Dashboards(args) => {
            info!("Starting Grafana dashboard controller");
            let config = args.config().context("invalid dashboard configuration")?;
            log_config(&config);

            controller::run(config, DashboardMapper::new())
                .await
                .context("dashboard controller failed")?;
        }
        Command::Datasources(args) => {
            info!("Starting Grafana datasource controller");
            let config = args.config().context("invalid datasource configuration")?;
            let datasource = args
                .datasource_config()
                .context("invalid datasource configuration")?;
            log_config(&config);
            info!("  Datasource: type {}, access {}", datasource.datasource_type, datasource.access);

            controller::run(config, DatasourceMapper::new(datasource))
                .await
                .context("datasource controller failed")?;
        }
    }

    Ok(())
}
