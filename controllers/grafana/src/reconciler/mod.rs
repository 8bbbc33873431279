//! Reconciliation of watched Kubernetes objects into Grafana records.
//!
//! One generic `Reconciler` drives both synchronisations; what differs per
//! resource kind lives in a `Mapper`:
//! - `dashboard`: ConfigMap data entries to dashboards
//! - `datasource`: Services to datasources
//!
//! For every item a mapper derives, the reconciler looks the record up by the
//! key Grafana stores it under and creates it when absent or overwrites it
//! when present.
//! Items are independent: a failure is logged and the next item proceeds.
//! Nothing is retried, the next resync is the retry.

pub mod dashboard;
pub mod datasource;

pub use dashboard::DashboardMapper;
pub use datasource::DatasourceMapper;

use crate::error::ControllerError;
use crate::watcher::{Notification, NotificationHandler, object_key};
use grafana_client::{Record, RecordClient};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One record derived from a Kubernetes object.
#[derive(Debug)]
pub struct MappedItem<R> {
    /// Logical identity used in logs and reports
    pub name: String,
    /// The desired record, or why it could not be built
    pub record: Result<R, ControllerError>,
}

/// Derives Grafana records from a Kubernetes object. Pure, no I/O.
pub trait Mapper: Send + Sync + 'static {
    type Resource: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static;
    type Record: Record;

    fn map(&self, resource: &Self::Resource) -> Vec<MappedItem<Self::Record>>;
}

/// What happened to a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

/// Per-notification result, one entry per derived item.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub failed: Vec<(String, ControllerError)>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.failed.is_empty()
    }

    fn record(&mut self, name: String, result: Result<Outcome, ControllerError>) {
        match result {
            Ok(Outcome::Created) => self.created.push(name),
            Ok(Outcome::Updated) => self.updated.push(name),
            Err(e) => self.failed.push((name, e)),
        }
    }
}

/// Reconciles one resource kind into Grafana.
pub struct Reconciler<M: Mapper> {
    mapper: M,
    client: Arc<dyn RecordClient<M::Record>>,
}

impl<M: Mapper> Reconciler<M> {
    pub fn new(mapper: M, client: Arc<dyn RecordClient<M::Record>>) -> Self {
        Self { mapper, client }
    }

    /// Apply one notification. Deletions never reach Grafana.
    pub async fn reconcile(&self, notification: &Notification<M::Resource>) -> ReconcileReport {
        match notification {
            Notification::Added(resource) | Notification::Updated { new: resource, .. } => {
                self.apply(resource).await
            }
            Notification::Deleted(resource) => {
                debug!(
                    "Ignoring deletion of {} {}, {}s are not removed from Grafana",
                    M::Resource::kind(&()),
                    object_key(resource.as_ref()),
                    M::Record::KIND
                );
                ReconcileReport::default()
            }
        }
    }

    async fn apply(&self, resource: &M::Resource) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for item in self.mapper.map(resource) {
            let result = match item.record {
                Ok(desired) => self.reconcile_item(&item.name, desired).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                error!("Failed to reconcile {} {}: {}", M::Record::KIND, item.name, e);
            }
            report.record(item.name, result);
        }

        report
    }

    /// Ensure exactly one record exists for `name` and that it matches `desired`.
    ///
    /// The lookup uses the record's own key, which is what Grafana stores it under.
    async fn reconcile_item(&self, name: &str, mut desired: M::Record) -> Result<Outcome, ControllerError> {
        let key = desired.name().to_string();
        debug!("Getting {} {} ({})", M::Record::KIND, name, key);

        match self.client.get(&key).await? {
            None => {
                self.client.create(&desired).await?;
                info!("Created {} {} in Grafana", M::Record::KIND, name);
                Ok(Outcome::Created)
            }
            Some(existing) => {
                desired.adopt_identity(&existing);
                self.client.update(&desired).await?;
                debug!("Updated {} {} in Grafana", M::Record::KIND, name);
                Ok(Outcome::Updated)
            }
        }
    }
}

#[async_trait::async_trait]
impl<M: Mapper> NotificationHandler<M::Resource> for Reconciler<M> {
    async fn handle(&self, notification: Notification<M::Resource>) {
        let report = self.reconcile(&notification).await;
        if report.is_empty() {
            return;
        }

        let key = object_key(notification.object());
        if report.failed.is_empty() {
            debug!(
                "Reconciled {} {}: {} created, {} updated",
                M::Resource::kind(&()),
                key,
                report.created.len(),
                report.updated.len()
            );
        } else {
            warn!(
                "Reconciled {} {} with errors: {} created, {} updated, {} failed",
                M::Resource::kind(&()),
                key,
                report.created.len(),
                report.updated.len(),
                report.failed.len()
            );
        }
    }
}
