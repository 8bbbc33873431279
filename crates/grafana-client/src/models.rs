//! Grafana API models
//!
//! These models match the JSON documents exchanged with the Grafana HTTP API:
//! `/api/datasources` and `/api/dashboards/db`.

use serde::{Deserialize, Serialize};

/// Dashboard body as stored in Grafana.
///
/// Kept as an untyped, insertion-ordered JSON object so unknown panels,
/// templating and annotations survive the round trip untouched.
pub type DashboardModel = serde_json::Map<String, serde_json::Value>;

/// A record the reconciler can create or update in Grafana.
pub trait Record: Clone + Send + Sync + 'static {
    /// Human readable kind, used in logs
    const KIND: &'static str;

    /// Key Grafana stores the record under: datasource name or dashboard slug
    fn name(&self) -> &str;

    /// Copy whatever server-assigned identity `existing` carries into `self`
    /// so an update targets the record that is already there.
    fn adopt_identity(&mut self, existing: &Self);
}

/// Datasource model matching the Grafana datasource API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasource {
    /// Numeric id assigned by Grafana on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(rename = "type")]
    pub datasource_type: String,
    pub access: String,
    pub url: String,
}

impl Record for Datasource {
    const KIND: &'static str = "datasource";

    fn name(&self) -> &str {
        &self.name
    }

    fn adopt_identity(&mut self, existing: &Self) {
        self.id = existing.id;
    }
}

/// Dashboard metadata returned by `GET /api/dashboards/db/{slug}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMeta {
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub slug: String,
}

/// Dashboard as returned by Grafana, or as about to be submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub meta: DashboardMeta,
    #[serde(rename = "dashboard")]
    pub model: DashboardModel,
}

impl Dashboard {
    /// Build a dashboard that will be stored under `slug`.
    pub fn new(slug: impl Into<String>, model: DashboardModel) -> Self {
        Self {
            meta: DashboardMeta {
                is_starred: false,
                slug: slug.into(),
            },
            model,
        }
    }

    /// Title field of the model, if it is a string
    pub fn title(&self) -> Option<&str> {
        self.model.get("title").and_then(|t| t.as_str())
    }
}

impl Record for Dashboard {
    const KIND: &'static str = "dashboard";

    fn name(&self) -> &str {
        &self.meta.slug
    }

    // Dashboards are addressed by slug and replaced with `overwrite`, there is
    // no numeric id to carry over.
    fn adopt_identity(&mut self, _existing: &Self) {}
}

/// Body of `POST /api/dashboards/db`
#[derive(Debug, Clone, Serialize)]
pub struct DashboardRequest<'a> {
    pub dashboard: &'a DashboardModel,
    pub overwrite: bool,
}

/// Derive the URL slug Grafana assigns to a dashboard title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datasource_create_omits_id() {
        let ds = Datasource {
            id: None,
            name: "prometheus.monitoring".to_string(),
            datasource_type: "prometheus".to_string(),
            access: "proxy".to_string(),
            url: "http://prometheus.monitoring:9090".to_string(),
        };

        let body = serde_json::to_value(&ds).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "prometheus.monitoring",
                "type": "prometheus",
                "access": "proxy",
                "url": "http://prometheus.monitoring:9090",
            })
        );
    }

    #[test]
    fn test_datasource_adopts_existing_id() {
        let existing: Datasource = serde_json::from_value(json!({
            "id": 7,
            "orgId": 1,
            "name": "prom.default",
            "type": "prometheus",
            "access": "direct",
            "url": "http://old:9090",
            "basicAuth": false,
        }))
        .unwrap();

        let mut desired = Datasource {
            id: None,
            name: "prom.default".to_string(),
            datasource_type: "prometheus".to_string(),
            access: "proxy".to_string(),
            url: "http://prom.default:9090".to_string(),
        };
        desired.adopt_identity(&existing);

        assert_eq!(desired.id, Some(7));
        assert_eq!(desired.url, "http://prom.default:9090");
    }

    #[test]
    fn test_dashboard_response_decodes() {
        let dashboard: Dashboard = serde_json::from_value(json!({
            "meta": { "slug": "latency-team-x-monitoring", "isStarred": true, "canEdit": true },
            "dashboard": { "title": "latency team-x monitoring", "rows": [] },
        }))
        .unwrap();

        assert_eq!(dashboard.meta.slug, "latency-team-x-monitoring");
        assert!(dashboard.meta.is_starred);
        assert_eq!(dashboard.title(), Some("latency team-x monitoring"));
    }

    #[test]
    fn test_dashboard_request_preserves_field_order() {
        let model: DashboardModel =
            serde_json::from_str(r#"{"zeta":1,"alpha":{"b":2,"a":1},"title":"x"}"#).unwrap();
        let request = DashboardRequest {
            dashboard: &model,
            overwrite: true,
        };

        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"dashboard":{"zeta":1,"alpha":{"b":2,"a":1},"title":"x"},"overwrite":true}"#
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("latency team-x monitoring"), "latency-team-x-monitoring");
        assert_eq!(slugify("  Node  Exporter / Full "), "node-exporter-full");
        assert_eq!(slugify("API_latency v2"), "api_latency-v2");
        assert_eq!(slugify("---"), "");
    }
}
