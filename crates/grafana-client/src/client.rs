//! Grafana API client
//!
//! Implements the subset of the Grafana HTTP API needed to keep datasources
//! and dashboards in sync: `/api/datasources` and `/api/dashboards/db`.

use crate::common::HttpClient;
use crate::error::GrafanaError;
use crate::grafana_trait::{GrafanaClientTrait, RecordClient};
use crate::models::*;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Endpoint used by the startup gate
const HEALTH_PATH: &str = "/api/health";

/// Grafana API client
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: HttpClient,
}

impl GrafanaClient {
    /// Create a new Grafana client
    ///
    /// # Arguments
    /// * `base_url` - Grafana base URL (e.g., "http://localhost:3000")
    /// * `token` - Optional API token sent as a bearer credential
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, GrafanaError> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GrafanaError::InvalidRequest(format!(
                "grafana url must be http(s): {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(GrafanaError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Check that Grafana answers HTTP at all
    pub async fn ping(&self) -> Result<(), GrafanaError> {
        self.http.probe(HEALTH_PATH).await
    }

    /// Look up a datasource by name
    ///
    /// # Returns
    /// * `Ok(Some(Datasource))` - The datasource exists
    /// * `Ok(None)` - Grafana answered 404
    /// * `Err(GrafanaError)` - Any other status or a transport failure
    pub async fn get_datasource(&self, name: &str) -> Result<Option<Datasource>, GrafanaError> {
        debug!("Fetching datasource {} from Grafana", name);
        let path = format!("/api/datasources/name/{}", HttpClient::segment(name));
        self.http.get_optional(&path).await
    }

    /// Create a datasource; Grafana assigns the id
    pub async fn create_datasource(&self, datasource: &Datasource) -> Result<(), GrafanaError> {
        debug!("Creating datasource {} in Grafana", datasource.name);
        self.http.post("/api/datasources", datasource).await
    }

    /// Replace a datasource; `datasource.id` must come from a prior lookup
    pub async fn update_datasource(&self, datasource: &Datasource) -> Result<(), GrafanaError> {
        let id = datasource.id.ok_or_else(|| {
            GrafanaError::InvalidRequest(format!(
                "datasource {} has no id, look it up before updating",
                datasource.name
            ))
        })?;

        debug!("Updating datasource {} (ID: {}) in Grafana", datasource.name, id);
        self.http.put(&format!("/api/datasources/{}", id), datasource).await
    }

    /// Delete a datasource by id
    pub async fn delete_datasource(&self, id: u64) -> Result<(), GrafanaError> {
        debug!("Deleting datasource {} from Grafana", id);
        self.http.delete(&format!("/api/datasources/{}", id)).await
    }

    /// Look up a dashboard by slug
    pub async fn get_dashboard(&self, slug: &str) -> Result<Option<Dashboard>, GrafanaError> {
        debug!("Fetching dashboard {} from Grafana", slug);
        let path = format!("/api/dashboards/db/{}", HttpClient::segment(slug));
        self.http.get_optional(&path).await
    }

    /// Create a dashboard, refusing to replace one with the same slug
    pub async fn create_dashboard(&self, dashboard: &Dashboard) -> Result<(), GrafanaError> {
        debug!("Creating dashboard {} in Grafana", dashboard.meta.slug);
        self.post_dashboard(dashboard, false).await
    }

    /// Replace the dashboard stored under the same slug
    pub async fn update_dashboard(&self, dashboard: &Dashboard) -> Result<(), GrafanaError> {
        debug!("Updating dashboard {} in Grafana", dashboard.meta.slug);
        self.post_dashboard(dashboard, true).await
    }

    /// Delete a dashboard by slug
    pub async fn delete_dashboard(&self, slug: &str) -> Result<(), GrafanaError> {
        debug!("Deleting dashboard {} from Grafana", slug);
        let path = format!("/api/dashboards/db/{}", HttpClient::segment(slug));
        self.http.delete(&path).await
    }

    async fn post_dashboard(&self, dashboard: &Dashboard, overwrite: bool) -> Result<(), GrafanaError> {
        let request = DashboardRequest {
            dashboard: &dashboard.model,
            overwrite,
        };
        self.http.post("/api/dashboards/db", &request).await
    }
}

#[async_trait::async_trait]
impl GrafanaClientTrait for GrafanaClient {
    fn base_url(&self) -> &str {
        GrafanaClient::base_url(self)
    }

    async fn ping(&self) -> Result<(), GrafanaError> {
        GrafanaClient::ping(self).await
    }
}

#[async_trait::async_trait]
impl RecordClient<Datasource> for GrafanaClient {
    async fn get(&self, name: &str) -> Result<Option<Datasource>, GrafanaError> {
        self.get_datasource(name).await
    }

    async fn create(&self, record: &Datasource) -> Result<(), GrafanaError> {
        self.create_datasource(record).await
    }

    async fn update(&self, record: &Datasource) -> Result<(), GrafanaError> {
        self.update_datasource(record).await
    }

    async fn delete(&self, existing: &Datasource) -> Result<(), GrafanaError> {
        let id = existing.id.ok_or_else(|| {
            GrafanaError::InvalidRequest(format!("datasource {} has no id", existing.name))
        })?;
        self.delete_datasource(id).await
    }
}

#[async_trait::async_trait]
impl RecordClient<Dashboard> for GrafanaClient {
    async fn get(&self, name: &str) -> Result<Option<Dashboard>, GrafanaError> {
        self.get_dashboard(name).await
    }

    async fn create(&self, record: &Dashboard) -> Result<(), GrafanaError> {
        self.create_dashboard(record).await
    }

    async fn update(&self, record: &Dashboard) -> Result<(), GrafanaError> {
        self.update_dashboard(record).await
    }

    async fn delete(&self, existing: &Dashboard) -> Result<(), GrafanaError> {
        self.delete_dashboard(&existing.meta.slug).await
    }
}
