//! Grafana REST API Client
//!
//! A Rust client library for the parts of the Grafana HTTP API used to keep
//! dashboards and datasources in sync with a Kubernetes cluster.
//!
//! # Example
//!
//! ```no_run
//! use grafana_client::{Datasource, GrafanaClient, RecordClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GrafanaClient::new("http://localhost:3000".to_string(), None)?;
//!
//! let desired = Datasource {
//!     id: None,
//!     name: "prometheus.monitoring".to_string(),
//!     datasource_type: "prometheus".to_string(),
//!     access: "proxy".to_string(),
//!     url: "http://prometheus.monitoring:9090".to_string(),
//! };
//!
//! match RecordClient::<Datasource>::get(&client, &desired.name).await? {
//!     Some(existing) => {
//!         let mut update = desired.clone();
//!         update.id = existing.id;
//!         client.update_datasource(&update).await?;
//!     }
//!     None => client.create_datasource(&desired).await?,
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod grafana_trait;
#[cfg(feature = "test-util")]
pub mod mock;
#[cfg(test)]
mod test_server;

pub use client::GrafanaClient;
pub use common::HttpClient;
pub use error::GrafanaError;
pub use models::*;
pub use grafana_trait::{GrafanaClientTrait, RecordClient, wait_until_ready};
#[cfg(feature = "test-util")]
pub use mock::{Call, MockGrafanaClient, Operation};
