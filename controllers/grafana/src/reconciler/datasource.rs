//! Datasources from Services.
//!
//! One datasource per selected Service, named `<service><sep><namespace>` and
//! pointing at the first declared port of the Service.

use super::{MappedItem, Mapper};
use crate::config::{DatasourceConfig, NameSeparator};
use grafana_client::Datasource;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

/// `<service><sep><namespace>`
pub fn datasource_name(service: &Service, separator: NameSeparator) -> String {
    format!(
        "{}{}{}",
        service.name_any(),
        separator.as_str(),
        service.namespace().unwrap_or_default()
    )
}

/// First declared port of the Service, `fallback` when there is none
pub fn service_port(service: &Service, fallback: i32) -> i32 {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|port| port.port)
        .unwrap_or(fallback)
}

/// Maps Services to Grafana datasources.
#[derive(Debug, Clone)]
pub struct DatasourceMapper {
    config: DatasourceConfig,
}

impl DatasourceMapper {
    pub fn new(config: DatasourceConfig) -> Self {
        Self { config }
    }

    /// Desired datasource for `service`. The id stays unset, it is Grafana's.
    pub fn datasource(&self, service: &Service) -> Datasource {
        let name = datasource_name(service, self.config.separator);
        let port = service_port(service, self.config.fallback_port);

        Datasource {
            id: None,
            url: format!("http://{}:{}", name, port),
            name,
            datasource_type: self.config.datasource_type.clone(),
            access: self.config.access.clone(),
        }
    }
}

impl Mapper for DatasourceMapper {
    type Resource = Service;
    type Record = Datasource;

    fn map(&self, service: &Service) -> Vec<MappedItem<Datasource>> {
        let datasource = self.datasource(service);
        vec![MappedItem {
            name: datasource.name.clone(),
            record: Ok(datasource),
        }]
    }
}
