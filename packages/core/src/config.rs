/// Configuration for the location tree engine
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest `IN (...)` list SQLite accepts by default is 32766 host parameters
const MAX_ID_BATCH_SIZE: usize = 32_000;

/// Configuration for the tree database and service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Database file location
    pub database_path: PathBuf,

    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,

    /// Capacity of the domain event broadcast channel
    pub event_channel_capacity: usize,

    /// Number of ids bound per `IN (...)` statement in bulk updates
    pub id_batch_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/arbor.db"),
            busy_timeout_ms: 5000,
            event_channel_capacity: 256,
            id_batch_size: 500,
        }
    }
}

impl TreeConfig {
    /// Default configuration pointed at `database_path`
    pub fn with_database_path(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path cannot be empty".to_string());
        }

        if self.busy_timeout_ms == 0 {
            return Err("busy_timeout_ms must be greater than 0".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        if self.id_batch_size == 0 {
            return Err("id_batch_size must be greater than 0".to_string());
        }

        if self.id_batch_size > MAX_ID_BATCH_SIZE {
            return Err(format!(
                "id_batch_size cannot exceed {} (SQLite host parameter limit)",
                MAX_ID_BATCH_SIZE
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TreeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = TreeConfig {
            busy_timeout_ms: 0,
            ..TreeConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("busy_timeout_ms"));

        let config = TreeConfig {
            id_batch_size: 0,
            ..TreeConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("id_batch_size"));
    }

    #[test]
    fn test_validate_rejects_oversized_batches() {
        let config = TreeConfig {
            id_batch_size: MAX_ID_BATCH_SIZE + 1,
            ..TreeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: TreeConfig =
            serde_json::from_str(r#"{"database_path": "/tmp/tree.db"}"#).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/tree.db"));
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.id_batch_size, 500);
    }
}
