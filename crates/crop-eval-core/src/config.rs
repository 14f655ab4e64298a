use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::taxonomy::{ClassId, LabelTaxonomy};

/// Run configuration. Defaults match the crop-type product the tool was
/// written for: class id in band 3, confidence in band 4 (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Fill value for masked-out pixels. Must lie outside [0, 1] and the
    /// class id range.
    pub nodata_sentinel: f64,
    /// 0-based index of the class-id band.
    pub class_band: usize,
    /// 0-based index of the confidence band.
    pub confidence_band: usize,
    /// Per-class confidence percentile used as the review cutoff.
    pub target_percentile: f64,
    /// Worker threads; 0 = all available cores, 1 = sequential.
    pub threads: usize,
    /// Ground-truth property holding the raw crop label.
    pub label_field: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            nodata_sentinel: -99.0,
            class_band: 2,
            confidence_band: 3,
            target_percentile: 0.5,
            threads: 0,
            label_field: "normalized_label".into(),
        }
    }
}

impl EvalConfig {
    /// Read a JSON config; missing keys take their defaults. The result is
    /// not validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Checks run before any raster work. The sentinel must not collide with
    /// a confidence value or with any class id of `taxonomy`.
    pub fn validate(&self, taxonomy: &LabelTaxonomy) -> Result<(), ConfigError> {
        let s = self.nodata_sentinel;
        if !s.is_finite() {
            return Err(ConfigError::NonFiniteSentinel(s));
        }
        if (0.0..=1.0).contains(&s) {
            return Err(ConfigError::SentinelInConfidenceRange(s));
        }
        if s.fract() == 0.0 {
            if let Some(class) = taxonomy.normalize_prediction(s as ClassId) {
                return Err(ConfigError::SentinelIsClassId { sentinel: s, class: class.to_owned() });
            }
        }
        if self.class_band == self.confidence_band {
            return Err(ConfigError::SameBand(self.class_band));
        }
        if !(0.0..=1.0).contains(&self.target_percentile) {
            return Err(ConfigError::Percentile(self.target_percentile));
        }
        Ok(())
    }
}
