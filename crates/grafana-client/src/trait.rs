//! Client traits for mocking
//!
//! These traits abstract `GrafanaClient` so the reconciler can be driven by
//! an in-memory implementation in unit tests.

use crate::error::GrafanaError;
use crate::models::Record;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection-level operations on a Grafana instance
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait GrafanaClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Succeeds when Grafana answers HTTP requests
    async fn ping(&self) -> Result<(), GrafanaError>;
}

/// The record-level capability set the reconciler relies on.
///
/// `get` distinguishes "not there" (`Ok(None)`) from a failed lookup
/// (`Err`). Every call is a single round trip without retries.
#[async_trait::async_trait]
pub trait RecordClient<R: Record>: Send + Sync {
    /// Look up the record stored under `name`
    async fn get(&self, name: &str) -> Result<Option<R>, GrafanaError>;

    /// Create a record that does not exist yet
    async fn create(&self, record: &R) -> Result<(), GrafanaError>;

    /// Replace an existing record; identity must have been adopted from `get`
    async fn update(&self, record: &R) -> Result<(), GrafanaError>;

    /// Remove a record previously returned by `get`
    async fn delete(&self, existing: &R) -> Result<(), GrafanaError>;
}

/// Block until Grafana answers, probing at most `attempts` times.
///
/// Returns `GrafanaError::Unreachable` once the attempts are exhausted; the
/// caller treats that as fatal.
pub async fn wait_until_ready(
    client: &dyn GrafanaClientTrait,
    attempts: u32,
    interval: Duration,
) -> Result<(), GrafanaError> {
    info!("Waiting for Grafana at {}", client.base_url());

    for attempt in 1..=attempts {
        match client.ping().await {
            Ok(()) => {
                info!("Grafana is reachable (attempt {}/{})", attempt, attempts);
                return Ok(());
            }
            Err(e) => {
                debug!("Grafana not reachable yet (attempt {}/{}): {}", attempt, attempts, e);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    warn!("Gave up on Grafana at {} after {} attempts", client.base_url(), attempts);
    Err(GrafanaError::Unreachable { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers only from the `ready_after`-th probe on
    struct Flaky {
        ready_after: u32,
        probes: AtomicU32,
    }

    #[async_trait::async_trait]
    impl GrafanaClientTrait for Flaky {
        fn base_url(&self) -> &str {
            "http://flaky"
        }

        async fn ping(&self) -> Result<(), GrafanaError> {
            let probe = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if probe >= self.ready_after {
                Ok(())
            } else {
                Err(GrafanaError::InvalidRequest("connection refused".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_wait_until_ready_succeeds_once_reachable() {
        let client = Flaky { ready_after: 3, probes: AtomicU32::new(0) };

        wait_until_ready(&client, 10, Duration::from_millis(1)).await.unwrap();
        assert_eq!(client.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        let client = Flaky { ready_after: u32::MAX, probes: AtomicU32::new(0) };

        let err = wait_until_ready(&client, 4, Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, GrafanaError::Unreachable { attempts: 4 }));
        assert_eq!(client.probes.load(Ordering::SeqCst), 4);
    }
}
