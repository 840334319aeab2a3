use crate::core::{DbError, Result};
use crate::middleware::{FieldEncryption, MiddlewareChain, default_encrypted_fields};
use crate::storage::DurabilityMode;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_STORE_NAME: &str = "walletdb";
pub const DEFAULT_DATA_DIR: &str = "walletdb_data";
pub const DEFAULT_CHECKPOINT_THRESHOLD: usize = 1000;

/// Store configuration
#[derive(Clone)]
pub struct StoreConfig {
    /// Database name, also the directory under `data_dir`
    pub name: String,

    /// Root directory of the on-disk layout
    pub data_dir: PathBuf,

    /// WAL durability
    pub durability: DurabilityMode,

    /// Logged writes before the image is compacted into a snapshot
    pub checkpoint_threshold: usize,

    /// Passphrase for field encryption; `None` stores secrets as given
    pub encryption_key: Option<String>,
}

impl StoreConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            durability: DurabilityMode::default(),
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
            encryption_key: None,
        }
    }

    /// Set the data directory
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Set the checkpoint threshold
    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Set the encryption passphrase
    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Reads `WALLETDB_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let name = std::env::var("WALLETDB_NAME").unwrap_or_else(|_| DEFAULT_STORE_NAME.to_string());
        let mut config = Self::new(&name);

        if let Ok(dir) = std::env::var("WALLETDB_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var("WALLETDB_DURABILITY") {
            config.durability = mode.parse()?;
        }
        if let Ok(threshold) = std::env::var("WALLETDB_CHECKPOINT_THRESHOLD") {
            config.checkpoint_threshold = threshold.parse().map_err(|_| {
                DbError::ExecutionError(format!(
                    "WALLETDB_CHECKPOINT_THRESHOLD must be a number, got '{}'",
                    threshold
                ))
            })?;
        }
        if let Ok(key) = std::env::var("WALLETDB_ENCRYPTION_KEY")
            && !key.is_empty()
        {
            config.encryption_key = Some(key);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DbError::ExecutionError("Store name cannot be empty".to_string()));
        }
        if self.checkpoint_threshold == 0 {
            return Err(DbError::ExecutionError("checkpoint_threshold must be > 0".to_string()));
        }
        if matches!(&self.encryption_key, Some(key) if key.is_empty()) {
            return Err(DbError::ExecutionError("Encryption key cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Middleware implied by this configuration.
    pub fn middleware(&self) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        if let Some(key) = &self.encryption_key {
            chain.push(Arc::new(FieldEncryption::new(key, default_encrypted_fields())));
        }
        chain
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_NAME)
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("data_dir", &self.data_dir)
            .field("durability", &self.durability)
            .field("checkpoint_threshold", &self.checkpoint_threshold)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "walletdb");
        assert_eq!(config.checkpoint_threshold, 1000);
        assert_eq!(config.durability, DurabilityMode::Async);
        assert!(config.encryption_key.is_none());
        assert!(config.middleware().is_empty());
    }

    #[test]
    fn test_builder_pattern() {
        let config = StoreConfig::new("other")
            .data_dir("/tmp/x")
            .durability(DurabilityMode::Sync)
            .checkpoint_threshold(5)
            .encryption_key("secret");

        assert_eq!(config.name, "other");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.durability, DurabilityMode::Sync);
        assert_eq!(config.checkpoint_threshold, 5);
        assert_eq!(config.middleware().names(), vec!["field-encryption"]);
    }

    #[test]
    fn test_validate() {
        assert!(StoreConfig::default().validate().is_ok());
        assert!(StoreConfig::new("").validate().is_err());
        assert!(StoreConfig::default().checkpoint_threshold(0).validate().is_err());
        assert!(StoreConfig::default().encryption_key("").validate().is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", StoreConfig::default().encryption_key("secret123"));
        assert!(!rendered.contains("secret123"));
        assert!(rendered.contains("***"));
    }
}
