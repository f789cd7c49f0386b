use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempo_core::store::StoreConfig;

/// Settings for the authority and its subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub store: StoreConfig,
    /// How long a view waits for its snapshot before falling back.
    pub snapshot_timeout_ms: u64,
    /// Interval between flush retries while the store is dirty.
    pub retry_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            snapshot_timeout_ms: 2_000,
            retry_interval_ms: 5_000,
        }
    }
}

impl SyncConfig {
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"snapshotTimeoutMs": 50, "store": {"persistAttempts": 5}}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.snapshot_timeout(), Duration::from_millis(50));
        assert_eq!(config.retry_interval_ms, 5_000);
        assert_eq!(config.store.persist_attempts, 5);
        assert_eq!(config.store.storage_key, "tempo.document");
    }
}
