//! Health Monitor (C3, spec.md §4.3). No persistence: state resets on
//! orchestrator restart.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct HealthEntry {
    healthy: bool,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct HealthMonitor {
    state: RwLock<HashMap<String, HealthEntry>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_healthy(&self, name: &str) {
        self.state.write().await.insert(
            name.to_string(),
            HealthEntry {
                healthy: true,
                last_error: None,
            },
        );
    }

    pub async fn mark_unhealthy(&self, name: &str, error: impl Into<String>) {
        self.state.write().await.insert(
            name.to_string(),
            HealthEntry {
                healthy: false,
                last_error: Some(error.into()),
            },
        );
    }

    /// MCPs with no recorded entry are treated as healthy (not yet probed is
    /// not the same as probed-and-failed).
    pub async fn is_healthy(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .get(name)
            .map(|entry| entry.healthy)
            .unwrap_or(true)
    }

    pub async fn last_error(&self, name: &str) -> Option<String> {
        self.state
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.last_error.clone())
    }

    pub async fn filter_healthy(&self, names: &[String]) -> Vec<String> {
        let state = self.state.read().await;
        names
            .iter()
            .filter(|name| state.get(*name).map(|entry| entry.healthy).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[tokio::test]
    async fn unprobed_mcps_are_healthy_by_default() {
        let monitor = HealthMonitor::new();
        assert!(monitor.is_healthy("fs").await);
    }

    #[tokio::test]
    async fn unhealthy_mcps_are_filtered_out() {
        let monitor = HealthMonitor::new();
        monitor.mark_unhealthy("web", "timed out").await;
        monitor.mark_healthy("fs").await;
        let names = vec!["fs".to_string(), "web".to_string()];
        assert_eq!(monitor.filter_healthy(&names).await, vec!["fs".to_string()]);
    }

    #[tokio::test]
    async fn remarking_healthy_clears_last_error() {
        let monitor = HealthMonitor::new();
        monitor.mark_unhealthy("web", "boom").await;
        monitor.mark_healthy("web").await;
        assert!(monitor.last_error("web").await.is_none());
    }
}
