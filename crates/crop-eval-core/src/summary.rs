//! Final per-class table: F1, average confidence, ground-truth count and
//! agreement side by side.

use serde::Serialize;

use crate::scoring::{
    agreement, average_confidence, record_count, ClassF1, LabelColumn, LabeledRecord,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub crop: String,
    pub f1: f64,
    /// Mean confidence of records predicted as this class; absent when the
    /// model never predicted it.
    pub average_confidence: Option<f64>,
    pub count: usize,
    pub percent_agreement: f64,
}

/// One row per F1 entry with at least one ground-truth record, in F1 table
/// order.
pub fn summarize(records: &[LabeledRecord], f1: &[ClassF1]) -> Vec<ClassSummary> {
    let counts = record_count(records, LabelColumn::GroundTruth);
    let agreement = agreement(records);
    let avg_conf = average_confidence(records);

    f1.iter()
        .filter_map(|c| {
            let count = counts.iter().find(|(name, _)| *name == c.class).map(|(_, n)| *n)?;
            Some(ClassSummary {
                crop: c.class.clone(),
                f1: c.f1,
                average_confidence: avg_conf.get(&c.class).copied(),
                count,
                percent_agreement: agreement.get(&c.class).copied().unwrap_or(0.0),
            })
        })
        .collect()
}

/// Round to two decimals for reports.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
