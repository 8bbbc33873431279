//! Kubernetes object builders for unit tests.

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub fn configmap(name: &str, namespace: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: meta(name, namespace),
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}

pub fn service(name: &str, namespace: &str, ports: &[i32]) -> Service {
    Service {
        metadata: meta(name, namespace),
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|port| ServicePort {
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}
