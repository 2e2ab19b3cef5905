//! Session configuration.

use crate::error::ConfigError;
use lasstream_data::CoordinateFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the scheduler does when a batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop dispatching, let in-flight batches drain, return the first error.
    #[default]
    Abort,
    /// Record the failure and keep going; the failed range stays unloaded.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Points per batch.
    pub batch_size: u32,
    /// Transfer slots, and therefore batches in flight.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub coordinates: CoordinateFrame,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 500_000,
            concurrency: 5,
            failure_policy: FailurePolicy::Abort,
            coordinates: CoordinateFrame::Local,
        }
    }
}

impl IngestConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Bytes one transfer slot needs for records of `record_length` bytes,
    /// given that no batch holds more than `num_points` points.
    pub fn slot_capacity(&self, record_length: u32, num_points: u64) -> Result<usize, ConfigError> {
        let points = (self.batch_size as u64).min(num_points.max(1));
        let bytes = points * record_length as u64;
        if bytes > u32::MAX as u64 {
            return Err(ConfigError::BatchTooLarge {
                batch_size: self.batch_size,
                record_length,
            });
        }
        Ok(bytes as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, 500_000);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            IngestConfig::from_json_str(r#"{ "concurrency": 2, "failure_policy": "best-effort" }"#)
                .unwrap();
        assert_eq!(config.batch_size, 500_000);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(config.coordinates, CoordinateFrame::Local);
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(matches!(
            IngestConfig::from_json_str(r#"{ "batch_size": 0 }"#),
            Err(ConfigError::ZeroBatchSize)
        ));
        assert!(matches!(
            IngestConfig::from_json_str(r#"{ "concurrency": 0 }"#),
            Err(ConfigError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            IngestConfig::from_json_str("{ batch_size"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_slot_capacity() {
        let config = IngestConfig::default();
        assert_eq!(config.slot_capacity(26, 1_200_000).unwrap(), 13_000_000);
        // Small files never allocate more than one batch of their own size.
        assert_eq!(config.slot_capacity(26, 10).unwrap(), 260);

        let huge = IngestConfig {
            batch_size: u32::MAX,
            ..IngestConfig::default()
        };
        assert!(matches!(
            huge.slot_capacity(26, u64::MAX),
            Err(ConfigError::BatchTooLarge { .. })
        ));
    }
}
