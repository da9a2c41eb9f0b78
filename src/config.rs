//! Detector configuration

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// Subsample size used to grow each isolation tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsampleSize {
    /// min(256, row count), the conventional isolation-forest default
    Auto,
    /// Fixed size (capped at the row count when sampling)
    Fixed(usize),
}

impl SubsampleSize {
    /// Resolve to a concrete size for a training set of `rows` rows
    pub fn resolve(&self, rows: usize) -> usize {
        match self {
            SubsampleSize::Auto => rows.min(256),
            SubsampleSize::Fixed(n) => rows.min(*n),
        }
    }
}

impl Default for SubsampleSize {
    fn default() -> Self {
        SubsampleSize::Auto
    }
}

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Expected proportion of anomalies per batch, in (0.0, 0.5]
    pub contamination: f32,
    /// Number of isolation trees in the ensemble
    pub num_trees: usize,
    /// Subsample size per tree
    #[serde(default)]
    pub subsample: SubsampleSize,
    /// Random seed for reproducible training
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            num_trees: 100,
            subsample: SubsampleSize::Auto,
            seed: None,
        }
    }
}

impl DetectorConfig {
    /// Check parameter domains before training
    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(DetectError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.num_trees == 0 {
            return Err(DetectError::InvalidConfig(
                "num_trees must be at least 1".to_string(),
            ));
        }
        if let SubsampleSize::Fixed(0) = self.subsample {
            return Err(DetectError::InvalidConfig(
                "subsample size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.contamination, 0.1);
        assert_eq!(config.num_trees, 100);
        assert_eq!(config.subsample, SubsampleSize::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_subsample_resolve() {
        assert_eq!(SubsampleSize::Auto.resolve(1000), 256);
        assert_eq!(SubsampleSize::Auto.resolve(100), 100);
        assert_eq!(SubsampleSize::Fixed(64).resolve(1000), 64);
        assert_eq!(SubsampleSize::Fixed(64).resolve(10), 10);
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = DetectorConfig::default();

        config.contamination = 0.0;
        assert!(config.validate().is_err());

        config.contamination = 0.6;
        assert!(config.validate().is_err());

        config.contamination = 0.5;
        assert!(config.validate().is_ok());

        config.num_trees = 0;
        assert!(config.validate().is_err());

        config.num_trees = 10;
        config.subsample = SubsampleSize::Fixed(0);
        assert!(config.validate().is_err());
    }
}
