//! Field-level reduction of a prediction raster.
//!
//! For one field: mask the class and confidence bands to the polygon, drop
//! every pixel carrying the nodata sentinel in either band, then reduce to
//! (majority class, mean confidence). Empty fields and masking failures
//! produce a result without a prediction instead of an error, so one bad
//! polygon never aborts a batch.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EvalConfig;
use crate::field::{FieldId, FieldRecord};
use crate::raster::Raster;
use crate::taxonomy::ClassId;

/// What aggregation produced for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldOutcome {
    Predicted { class_id: ClassId, mean_confidence: f64 },
    /// No valid pixel inside the polygon (sliver, outside coverage, all nodata).
    Empty,
    /// Masking raised; the reason is kept for the report.
    Failed { reason: String },
}

/// Exactly one per input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub field_id: FieldId,
    #[serde(flatten)]
    pub outcome: FieldOutcome,
}

impl AggregationResult {
    pub fn predicted_class(&self) -> Option<ClassId> {
        match self.outcome {
            FieldOutcome::Predicted { class_id, .. } => Some(class_id),
            _ => None,
        }
    }

    pub fn mean_confidence(&self) -> Option<f64> {
        match self.outcome {
            FieldOutcome::Predicted { mean_confidence, .. } => Some(mean_confidence),
            _ => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        !matches!(self.outcome, FieldOutcome::Predicted { .. })
    }
}

/// Most frequent class; ties go to the lowest id (argmax of a bincount).
pub fn majority_vote(classes: &[ClassId]) -> Option<ClassId> {
    let mut counts: BTreeMap<ClassId, usize> = BTreeMap::new();
    for &c in classes {
        *counts.entry(c).or_default() += 1;
    }
    let mut best: Option<(ClassId, usize)> = None;
    for (class, n) in counts {
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((class, n));
        }
    }
    best.map(|(class, _)| class)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Reduces one field at a time against a shared raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldAggregator {
    pub class_band: usize,
    pub confidence_band: usize,
    /// Fill value for pixels outside the polygon; outside the valid class
    /// and confidence range.
    pub nodata: f64,
}

impl Default for FieldAggregator {
    fn default() -> Self {
        Self::from_config(&EvalConfig::default())
    }
}

impl FieldAggregator {
    pub fn from_config(cfg: &EvalConfig) -> Self {
        Self {
            class_band: cfg.class_band,
            confidence_band: cfg.confidence_band,
            nodata: cfg.nodata_sentinel,
        }
    }

    pub fn aggregate(&self, field: &FieldRecord, raster: &Raster) -> AggregationResult {
        let outcome = self.reduce(field, raster);
        match &outcome {
            FieldOutcome::Empty => info!(
                event = "aggregate.empty_field",
                field_id = %field.field_id,
            ),
            FieldOutcome::Failed { reason } => warn!(
                event = "aggregate.masking_failure",
                field_id = %field.field_id,
                reason = %reason,
            ),
            FieldOutcome::Predicted { .. } => {}
        }
        AggregationResult { field_id: field.field_id.clone(), outcome }
    }

    fn reduce(&self, field: &FieldRecord, raster: &Raster) -> FieldOutcome {
        let bands = [self.class_band, self.confidence_band];
        let masked = match raster.mask(&field.geometry, self.nodata, &bands) {
            Ok(m) => m,
            Err(e) => return FieldOutcome::Failed { reason: e.to_string() },
        };

        let (class_px, conf_px) = (&masked.bands[0], &masked.bands[1]);
        let mut classes = Vec::with_capacity(class_px.len());
        let mut confidences = Vec::with_capacity(conf_px.len());
        for (&c, &p) in class_px.iter().zip(conf_px) {
            if c == self.nodata || p == self.nodata {
                continue;
            }
            classes.push(c.round() as ClassId);
            confidences.push(p);
        }

        match (majority_vote(&classes), mean(&confidences)) {
            (Some(class_id), Some(mean_confidence)) => {
                FieldOutcome::Predicted { class_id, mean_confidence }
            }
            _ => FieldOutcome::Empty,
        }
    }
}
