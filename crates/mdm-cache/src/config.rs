//! Cache configuration and builder

use std::time::Duration;
use serde::{Deserialize, Serialize};
use service_builder::builder;

use crate::{CacheError, CacheResult};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder]
pub struct CacheConfig {
    /// Time-to-live applied to every entry; `None` keeps entries until evicted
    #[builder(getter, default = "Some(Duration::from_secs(300))")]
    pub default_ttl: Option<Duration>,

    /// Maximum number of entries before LRU eviction; `None` is unbounded
    #[builder(getter, default = "Some(10_000)")]
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(300)), // 5 minutes
            max_entries: Some(10_000),
        }
    }
}

impl CacheConfig {
    /// Reject configurations the memory backend cannot honour
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_entries == Some(0) {
            return Err(CacheError::Configuration(
                "max_entries must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl == Some(Duration::ZERO) {
            return Err(CacheError::Configuration(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// Add convenience methods to the generated builder
impl CacheConfigBuilder {
    pub fn ttl(self, ttl: Duration) -> Self {
        self.default_ttl(Some(ttl))
    }

    pub fn no_ttl(self) -> Self {
        self.default_ttl(None)
    }

    pub fn max_entries_limit(self, max: usize) -> Self {
        self.max_entries(Some(max))
    }

    pub fn unlimited_entries(self) -> Self {
        self.max_entries(None)
    }

    pub fn build_config(self) -> CacheResult<CacheConfig> {
        let config = self
            .build_with_defaults()
            .map_err(|e| CacheError::Configuration(format!("{:?}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.max_entries, Some(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .ttl(Duration::from_secs(60))
            .max_entries_limit(128)
            .build_config()
            .unwrap();

        assert_eq!(config.get_default_ttl(), &Some(Duration::from_secs(60)));
        assert_eq!(config.get_max_entries(), &Some(128));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = CacheConfig::builder().max_entries_limit(0).build_config();
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }
}
