//! Process lifecycle.
//!
//! Connects to the cluster and to Grafana, waits for Grafana to answer, then
//! runs a single watcher task until a shutdown signal arrives or the watcher
//! dies. A signal lets the notification being handled finish before exiting.

use crate::config::{ClusterConfig, Config, GrafanaConfig};
use crate::error::ControllerError;
use crate::reconciler::{Mapper, Reconciler};
use crate::signal::shutdown_signal;
use crate::watcher::ResourceWatcher;
use grafana_client::{GrafanaClient, GrafanaClientTrait, RecordClient, wait_until_ready};
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Builds a Kubernetes client.
///
/// An explicit kubeconfig path wins; otherwise the config is inferred. The
/// API server URL, when given, replaces whatever the kubeconfig says.
pub async fn kube_client(cluster: &ClusterConfig) -> Result<Client, ControllerError> {
    let mut config = match &cluster.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                ControllerError::KubeConfig(format!("failed to read {}: {}", path.display(), e))
            })?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ControllerError::KubeConfig(e.to_string()))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| ControllerError::KubeConfig(e.to_string()))?,
    };

    if let Some(apiserver) = &cluster.apiserver {
        match apiserver.parse() {
            Ok(url) => config.cluster_url = url,
            Err(e) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "invalid apiserver url {:?}: {}",
                    apiserver, e
                )));
            }
        }
    }

    info!("Using Kubernetes API server {}", config.cluster_url);
    Ok(Client::try_from(config)?)
}

/// Blocks until Grafana answers. Failing here ends the process.
pub async fn startup_gate(
    client: &dyn GrafanaClientTrait,
    config: &GrafanaConfig,
) -> Result<(), ControllerError> {
    wait_until_ready(client, config.startup_attempts, config.startup_interval)
        .await
        .map_err(|e| {
            error!("Grafana at {} never became reachable: {}", client.base_url(), e);
            ControllerError::Grafana(e)
        })
}

/// A running watcher task and the token that stops it.
pub struct Controller {
    watcher: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Spawns the watcher. `watch` receives the token it must stop on.
    pub fn spawn<F, Fut>(watch: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), ControllerError>> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch(shutdown.clone()));
        Self { watcher, shutdown }
    }

    /// Runs until `signal` resolves (clean exit) or the watcher exits on its own (error).
    pub async fn run_until<S>(mut self, signal: S) -> Result<(), ControllerError>
    where
        S: Future<Output = io::Result<&'static str>>,
    {
        tokio::select! {
            result = &mut self.watcher => {
                self.shutdown.cancel();
                match result {
                    Ok(Ok(())) => Err(ControllerError::Watch("watcher exited unexpectedly".to_string())),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(ControllerError::Watch(format!("watcher task panicked: {}", e))),
                }
            }
            received = signal => {
                self.shutdown.cancel();
                let name = match received {
                    Ok(name) => name,
                    Err(e) => {
                        self.watcher.abort();
                        return Err(ControllerError::Signal(e));
                    }
                };

                info!("Received {}, waiting for in-flight work", name);
                match self.watcher.await {
                    Ok(result) => result,
                    Err(e) => Err(ControllerError::Watch(format!("watcher task panicked: {}", e))),
                }
            }
        }
    }
}

/// Runs one synchronisation: `mapper` decides what the watched objects become.
pub async fn run<M>(config: Config, mapper: M) -> Result<(), ControllerError>
where
    M: Mapper,
    GrafanaClient: RecordClient<M::Record>,
{
    let kube = kube_client(&config.cluster).await?;

    let grafana = Arc::new(GrafanaClient::new(
        config.grafana.url.clone(),
        config.grafana.token.clone(),
    )?);
    startup_gate(grafana.as_ref(), &config.grafana).await?;

    let client: Arc<dyn RecordClient<M::Record>> = grafana;
    let reconciler = Reconciler::new(mapper, client);
    let watcher = ResourceWatcher::<M::Resource>::new(kube, &config.watch);

    let controller = Controller::spawn(move |shutdown| async move {
        watcher.run(&reconciler, shutdown).await
    });
    info!("Grafana controller running");

    controller.run_until(shutdown_signal()).await?;
    info!("Grafana controller stopped");
    Ok(())
}
