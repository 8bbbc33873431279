//! Mock GrafanaClient for unit testing
//!
//! This module provides an in-memory implementation of the client traits that
//! can be used in unit tests without requiring a running Grafana instance.
//! Every call is journaled so tests can assert on the exact sequence of
//! requests the reconciler made.

use crate::error::GrafanaError;
use crate::grafana_trait::{GrafanaClientTrait, RecordClient};
use crate::models::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Kind of request made against the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
}

/// One journaled request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    /// `Record::KIND` of the record involved
    pub kind: &'static str,
    pub name: String,
    /// Datasource id sent with the request
    pub id: Option<u64>,
    /// Dashboard `overwrite` flag sent with the request
    pub overwrite: Option<bool>,
}

#[derive(Debug, Default)]
struct Inner {
    dashboards: HashMap<String, Dashboard>,
    datasources: HashMap<String, Datasource>,
    calls: Vec<Call>,
    failures: HashSet<(Operation, String)>,
    unreachable: bool,
    pings: u32,
    next_id: u64,
}

/// Mock GrafanaClient for testing
#[derive(Debug, Clone)]
pub struct MockGrafanaClient {
    base_url: String,
    inner: Arc<Mutex<Inner>>,
}

impl MockGrafanaClient {
    /// Create a new, reachable and empty mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                ..Default::default()
            })),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a dashboard (for test setup); stored under its title's slug
    pub fn add_dashboard(&self, mut dashboard: Dashboard) {
        let slug = dashboard_slug(&dashboard);
        dashboard.meta.slug = slug.clone();
        self.inner().dashboards.insert(slug, dashboard);
    }

    /// Seed a datasource (for test setup); returns the id it is stored with
    pub fn add_datasource(&self, mut datasource: Datasource) -> u64 {
        let mut inner = self.inner();
        let id = match datasource.id {
            Some(id) => {
                inner.next_id = inner.next_id.max(id + 1);
                id
            }
            None => inner.allocate_id(),
        };
        datasource.id = Some(id);
        inner.datasources.insert(datasource.name.clone(), datasource);
        id
    }

    /// Make every `operation` on `name` fail with a 500
    pub fn fail_on(&self, operation: Operation, name: impl Into<String>) {
        self.inner().failures.insert((operation, name.into()));
    }

    /// Toggle whether `ping` succeeds
    pub fn set_reachable(&self, reachable: bool) {
        self.inner().unreachable = !reachable;
    }

    /// Number of readiness probes received
    pub fn pings(&self) -> u32 {
        self.inner().pings
    }

    /// Stored dashboard by slug
    pub fn dashboard(&self, slug: &str) -> Option<Dashboard> {
        self.inner().dashboards.get(slug).cloned()
    }

    /// Number of stored dashboards
    pub fn dashboard_count(&self) -> usize {
        self.inner().dashboards.len()
    }

    /// Stored datasource by name
    pub fn datasource(&self, name: &str) -> Option<Datasource> {
        self.inner().datasources.get(name).cloned()
    }

    /// Number of stored datasources
    pub fn datasource_count(&self) -> usize {
        self.inner().datasources.len()
    }

    /// Every request made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.inner().calls.clone()
    }

    /// Requests of one kind, in order
    pub fn calls_for(&self, operation: Operation) -> Vec<Call> {
        self.inner()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Forget the journal, keep the stored records
    pub fn clear_calls(&self) {
        self.inner().calls.clear();
    }
}

impl Inner {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(
        &mut self,
        operation: Operation,
        kind: &'static str,
        name: &str,
        id: Option<u64>,
        overwrite: Option<bool>,
    ) -> Result<(), GrafanaError> {
        self.calls.push(Call {
            operation,
            kind,
            name: name.to_string(),
            id,
            overwrite,
        });

        if self.failures.contains(&(operation, name.to_string())) {
            return Err(GrafanaError::Api {
                status: 500,
                body: format!("injected failure for {:?} {}", operation, name),
            });
        }
        Ok(())
    }
}

fn dashboard_slug(dashboard: &Dashboard) -> String {
    match dashboard.title() {
        Some(title) => slugify(title),
        None => dashboard.meta.slug.clone(),
    }
}

#[async_trait::async_trait]
impl GrafanaClientTrait for MockGrafanaClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.pings += 1;
        if inner.unreachable {
            return Err(GrafanaError::InvalidRequest("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordClient<Datasource> for MockGrafanaClient {
    async fn get(&self, name: &str) -> Result<Option<Datasource>, GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Get, Datasource::KIND, name, None, None)?;
        Ok(inner.datasources.get(name).cloned())
    }

    async fn create(&self, record: &Datasource) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Create, Datasource::KIND, &record.name, record.id, None)?;

        if inner.datasources.contains_key(&record.name) {
            return Err(GrafanaError::Api {
                status: 409,
                body: "data source with the same name already exists".to_string(),
            });
        }

        let mut stored = record.clone();
        stored.id = Some(inner.allocate_id());
        inner.datasources.insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn update(&self, record: &Datasource) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Update, Datasource::KIND, &record.name, record.id, None)?;

        let previous = inner
            .datasources
            .iter()
            .find(|(_, ds)| ds.id.is_some() && ds.id == record.id)
            .map(|(name, _)| name.clone());

        match previous {
            Some(previous) => {
                inner.datasources.remove(&previous);
                inner.datasources.insert(record.name.clone(), record.clone());
                Ok(())
            }
            None => Err(GrafanaError::Api {
                status: 404,
                body: "data source not found".to_string(),
            }),
        }
    }

    async fn delete(&self, existing: &Datasource) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Delete, Datasource::KIND, &existing.name, existing.id, None)?;
        inner.datasources.retain(|_, ds| ds.id != existing.id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordClient<Dashboard> for MockGrafanaClient {
    async fn get(&self, name: &str) -> Result<Option<Dashboard>, GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Get, Dashboard::KIND, name, None, None)?;
        Ok(inner.dashboards.get(name).cloned())
    }

    async fn create(&self, record: &Dashboard) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Create, Dashboard::KIND, record.name(), None, Some(false))?;

        let slug = dashboard_slug(record);
        if inner.dashboards.contains_key(&slug) {
            return Err(GrafanaError::Api {
                status: 412,
                body: "a dashboard with the same name already exists".to_string(),
            });
        }

        let mut stored = record.clone();
        stored.meta.slug = slug.clone();
        inner.dashboards.insert(slug, stored);
        Ok(())
    }

    async fn update(&self, record: &Dashboard) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Update, Dashboard::KIND, record.name(), None, Some(true))?;

        let slug = dashboard_slug(record);
        let mut stored = record.clone();
        stored.meta.slug = slug.clone();
        inner.dashboards.insert(slug, stored);
        Ok(())
    }

    async fn delete(&self, existing: &Dashboard) -> Result<(), GrafanaError> {
        let mut inner = self.inner();
        inner.record(Operation::Delete, Dashboard::KIND, existing.name(), None, None)?;
        inner.dashboards.remove(&existing.meta.slug);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn datasource(name: &str) -> Datasource {
        Datasource {
            id: None,
            name: name.to_string(),
            datasource_type: "prometheus".to_string(),
            access: "proxy".to_string(),
            url: format!("http://{}:9090", name),
        }
    }

    fn dashboard(title: &str) -> Dashboard {
        let mut model = DashboardModel::new();
        model.insert("title".to_string(), json!(title));
        Dashboard::new(slugify(title), model)
    }

    #[tokio::test]
    async fn test_datasource_create_assigns_id() {
        let mock = MockGrafanaClient::new("http://grafana");
        mock.add_datasource(datasource("seed.default"));

        RecordClient::<Datasource>::create(&mock, &datasource("prom.default"))
            .await
            .unwrap();

        let stored = mock.datasource("prom.default").unwrap();
        assert_eq!(stored.id, Some(2));
        assert_eq!(mock.datasource_count(), 2);
    }

    #[tokio::test]
    async fn test_datasource_duplicate_create_conflicts() {
        let mock = MockGrafanaClient::new("http://grafana");
        mock.add_datasource(datasource("prom.default"));

        let err = RecordClient::<Datasource>::create(&mock, &datasource("prom.default"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_dashboard_create_without_overwrite_conflicts() {
        let mock = MockGrafanaClient::new("http://grafana");
        mock.add_dashboard(dashboard("latency team-x monitoring"));

        let err = RecordClient::<Dashboard>::create(&mock, &dashboard("latency team-x monitoring"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(412));

        RecordClient::<Dashboard>::update(&mock, &dashboard("latency team-x monitoring"))
            .await
            .unwrap();
        assert_eq!(mock.dashboard_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_journaled() {
        let mock = MockGrafanaClient::new("http://grafana");
        mock.fail_on(Operation::Get, "broken.default");

        let err = RecordClient::<Datasource>::get(&mock, "broken.default")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(mock.calls_for(Operation::Get).len(), 1);
    }

    #[tokio::test]
    async fn test_ping_counts_attempts() {
        let mock = MockGrafanaClient::new("http://grafana");
        mock.set_reachable(false);
        assert!(mock.ping().await.is_err());
        mock.set_reachable(true);
        assert!(mock.ping().await.is_ok());
        assert_eq!(mock.pings(), 2);
    }
}
