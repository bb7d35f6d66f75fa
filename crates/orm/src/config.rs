//! Mapping layer configuration

use std::env;

use mdm_cache::CacheError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Cache configuration error: {0}")]
    Cache(#[from] CacheError),
}

/// Settings shared by every DAO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Deepest chain of nested key references followed during resolution
    pub max_key_depth: usize,
    /// Ask the store to delete records referencing a deleted record
    pub cascade_delete: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            max_key_depth: 32,
            cascade_delete: false,
        }
    }
}

impl MappingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_key_depth(mut self, depth: usize) -> Self {
        self.max_key_depth = depth;
        self
    }

    pub fn with_cascade_delete(mut self, cascade: bool) -> Self {
        self.cascade_delete = cascade;
        self
    }

    /// Load configuration from `MDM_MAX_KEY_DEPTH` and `MDM_CASCADE_DELETE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(depth) = env::var("MDM_MAX_KEY_DEPTH") {
            config.max_key_depth = depth.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "max_key_depth".to_string(),
                value: depth.clone(),
                expected: "a positive integer".to_string(),
            })?;
        }

        if let Ok(cascade) = env::var("MDM_CASCADE_DELETE") {
            config.cascade_delete = match cascade.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "cascade_delete".to_string(),
                        value: cascade,
                        expected: "true or false".to_string(),
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_key_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_key_depth".to_string(),
                value: self.max_key_depth.to_string(),
                expected: "at least 1".to_string(),
            });
        }
        Ok(())
    }
}
