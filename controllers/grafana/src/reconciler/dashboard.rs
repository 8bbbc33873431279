//! Dashboards from ConfigMaps.
//!
//! Every `data` entry of a selected ConfigMap is one dashboard. The entry key
//! is a file name (`latency.json`), the value the dashboard JSON.

use super::{MappedItem, Mapper};
use crate::error::ControllerError;
use grafana_client::{Dashboard, DashboardModel, slugify};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

/// File name without directory and without its last extension
pub fn file_stem(filename: &str) -> &str {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) => &base[..idx],
        None => base,
    }
}

/// Logical name of a dashboard: `lowercase(<stem>-<configmap>-<namespace>)`.
///
/// Used in logs and reports. Grafana itself keys the dashboard by
/// `dashboard_slug`, which differs once a name or stem contains a `.`.
pub fn dashboard_name(configmap: &ConfigMap, filename: &str) -> String {
    format!(
        "{}-{}-{}",
        file_stem(filename),
        configmap.name_any(),
        configmap.namespace().unwrap_or_default()
    )
    .to_lowercase()
}

/// Display title of a dashboard: `<stem> <configmap> <namespace>`, case kept.
pub fn dashboard_title(configmap: &ConfigMap, filename: &str) -> String {
    format!(
        "{} {} {}",
        file_stem(filename),
        configmap.name_any(),
        configmap.namespace().unwrap_or_default()
    )
}

/// Slug Grafana assigns to the dashboard, derived from its title.
pub fn dashboard_slug(configmap: &ConfigMap, filename: &str) -> String {
    slugify(&dashboard_title(configmap, filename))
}

/// Parse dashboard JSON; the document must be an object.
pub fn parse_model(name: &str, content: &str) -> Result<DashboardModel, ControllerError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| ControllerError::InvalidPayload {
            name: name.to_string(),
            reason: format!("failed to unmarshal dashboard: {}", e),
        })?;

    match value {
        serde_json::Value::Object(model) => Ok(model),
        other => Err(ControllerError::InvalidPayload {
            name: name.to_string(),
            reason: format!("dashboard must be a JSON object, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Maps dashboard ConfigMaps to Grafana dashboards.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardMapper;

impl DashboardMapper {
    pub fn new() -> Self {
        Self
    }
}

impl Mapper for DashboardMapper {
    type Resource = ConfigMap;
    type Record = Dashboard;

    fn map(&self, configmap: &ConfigMap) -> Vec<MappedItem<Dashboard>> {
        let Some(data) = configmap.data.as_ref() else {
            return Vec::new();
        };

        data.iter()
            .map(|(filename, content)| {
                let name = dashboard_name(configmap, filename);
                let record = parse_model(&name, content).map(|mut model| {
                    model.insert(
                        "title".to_string(),
                        serde_json::Value::String(dashboard_title(configmap, filename)),
                    );
                    Dashboard::new(dashboard_slug(configmap, filename), model)
                });
                MappedItem { name, record }
            })
            .collect()
    }
}
