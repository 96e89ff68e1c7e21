use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Settings for the apartment thread and process-wide logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    pub thread_name: String,
    /// Longest time the apartment thread waits for window messages before
    /// checking its command queue again.
    pub poll_interval_ms: u64,
    pub log_filter: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            thread_name: "axhost-sta".to_string(),
            poll_interval_ms: 50,
            log_filter: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = ManagerConfig::from_json(r#"{ "pollIntervalMs": 10 }"#).unwrap();
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.thread_name, "axhost-sta");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn zero_poll_interval_still_waits() {
        let config = ManagerConfig {
            poll_interval_ms: 0,
            ..ManagerConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(ManagerConfig::from_json("{ threadName: ").is_err());
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let err = ManagerConfig::load("/nonexistent/axhost.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
