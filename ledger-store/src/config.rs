//! Configuration for the ledger store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Single-writer configuration
    pub writer: WriterConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/market"),
            rocksdb: RocksDBConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,

    /// fsync the WAL on every commit
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            enable_statistics: false,
            sync_writes: true,
        }
    }
}

/// Single-writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Bounded mailbox capacity (units of work waiting for the writer)
    pub mailbox_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
        }
    }
}

impl StoreConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values RocksDB or the writer cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.writer.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "writer.mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.rocksdb.write_buffer_size_mb == 0 {
            return Err(crate::Error::Config(
                "rocksdb.write_buffer_size_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data/market"));
        assert!(config.rocksdb.sync_writes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: StoreConfig = toml::from_str(
            r#"
            data_dir = "/tmp/market"

            [writer]
            mailbox_capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/market"));
        assert_eq!(config.writer.mailbox_capacity, 8);
        assert_eq!(config.rocksdb.max_background_jobs, 2);
    }

    #[test]
    fn test_zero_mailbox_rejected() {
        let mut config = StoreConfig::default();
        config.writer.mailbox_capacity = 0;
        assert!(config.validate().is_err());
    }
}
