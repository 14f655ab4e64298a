//! Review-candidate selection.
//!
//! Every disagreement is kept. Agreements are kept only when their
//! confidence falls strictly below the cutoff of their predicted class,
//! where the cutoff is a percentile of that class's confidences.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::error::ConfigError;
use crate::reconcile::ScoredRecord;

/// Percentile of `values` at `p` in [0, 1], linearly interpolating between
/// closest ranks. `None` for an empty slice or an out-of-range `p`.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Confidence cutoff per predicted class. Records without a predicted label
/// do not contribute.
pub fn confidence_cutoffs(
    records: &[ScoredRecord],
    target_percentile: f64,
) -> Result<BTreeMap<String, f64>, ConfigError> {
    if !(0.0..=1.0).contains(&target_percentile) {
        return Err(ConfigError::Percentile(target_percentile));
    }
    let mut by_class: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in records {
        if let Some(pred) = &r.pred_label {
            by_class.entry(pred.as_str()).or_default().push(r.confidence);
        }
    }

    let mut cutoffs = BTreeMap::new();
    for (class, confs) in by_class {
        if let Some(cutoff) = percentile(&confs, target_percentile) {
            info!(
                event = "selection.cutoff",
                class,
                percentile = target_percentile,
                cutoff,
                records = confs.len(),
            );
            cutoffs.insert(class.to_owned(), cutoff);
        }
    }
    Ok(cutoffs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Labels differ, or one of them did not reconcile.
    Disagreement,
    /// Correct, but below the class cutoff.
    LowConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedRecord {
    #[serde(flatten)]
    pub record: ScoredRecord,
    pub reason: SelectionReason,
    /// Cutoff of the predicted class; absent when the prediction did not
    /// reconcile.
    pub cutoff: Option<f64>,
}

/// Records worth a manual review, in input order.
pub fn select(
    records: &[ScoredRecord],
    target_percentile: f64,
) -> Result<Vec<SelectedRecord>, ConfigError> {
    let cutoffs = confidence_cutoffs(records, target_percentile)?;

    let selected = records
        .iter()
        .filter_map(|r| {
            let cutoff = r.pred_label.as_ref().and_then(|p| cutoffs.get(p)).copied();
            let agrees = matches!((&r.gt_label, &r.pred_label), (Some(g), Some(p)) if g == p);
            let reason = if !agrees {
                SelectionReason::Disagreement
            } else if cutoff.is_some_and(|c| r.confidence < c) {
                SelectionReason::LowConfidence
            } else {
                return None;
            };
            Some(SelectedRecord { record: r.clone(), reason, cutoff })
        })
        .collect();
    Ok(selected)
}
