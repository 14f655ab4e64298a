//! Label reconciliation: ground-truth filtering, the field/prediction join,
//! and standardisation of both label columns onto the canonical taxonomy.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use crate::aggregate::FieldOutcome;
use crate::driver::AggregationTable;
use crate::field::{FieldId, FieldRecord};
use crate::taxonomy::{ClassId, LabelTaxonomy};

/// A ground-truth record whose raw label has no canonical match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonConforming {
    pub field_id: FieldId,
    pub raw_label: String,
}

/// Split `fields` by whether their raw label reconciles. Non-conforming
/// records are reported through the log and returned to the caller.
pub fn filter_conforming(
    fields: Vec<FieldRecord>,
    taxonomy: &LabelTaxonomy,
) -> (Vec<FieldRecord>, Vec<NonConforming>) {
    let (conforming, rejected): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .partition(|f| taxonomy.normalize_ground_truth(&f.raw_label).is_some());

    let non_conforming: Vec<NonConforming> = rejected
        .into_iter()
        .map(|f| NonConforming { field_id: f.field_id, raw_label: f.raw_label })
        .collect();

    if !non_conforming.is_empty() {
        let ids: Vec<String> = non_conforming.iter().map(|n| n.field_id.to_string()).collect();
        let mut labels: Vec<&str> = non_conforming.iter().map(|n| n.raw_label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        info!(
            event = "reconcile.non_conforming",
            count = non_conforming.len(),
            field_ids = %ids.join(","),
            raw_labels = ?labels,
        );
    }
    (conforming, non_conforming)
}

/// A field joined with its aggregated prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub field_id: FieldId,
    pub raw_label: String,
    pub predicted_class: ClassId,
    pub confidence: f64,
}

/// Fields dropped by the join, by reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    /// Field has no aggregation row at all.
    pub missing_result: usize,
    /// Aggregation found no valid pixel.
    pub empty: usize,
    /// Aggregation failed while masking.
    pub failed: usize,
    /// Aggregation rows whose id is not among the fields.
    pub orphan_results: usize,
}

impl JoinReport {
    pub fn dropped(&self) -> usize {
        self.missing_result + self.empty + self.failed
    }
}

/// Left-join fields with aggregation results on field id, keeping only rows
/// that carry a prediction.
pub fn join_predictions(
    fields: &[FieldRecord],
    results: &AggregationTable,
) -> (Vec<JoinedRow>, JoinReport) {
    let mut report = JoinReport::default();
    let mut rows = Vec::with_capacity(fields.len());

    for f in fields {
        let Some(res) = results.get(&f.field_id) else {
            report.missing_result += 1;
            continue;
        };
        match res.outcome {
            FieldOutcome::Predicted { class_id, mean_confidence } => rows.push(JoinedRow {
                field_id: f.field_id.clone(),
                raw_label: f.raw_label.clone(),
                predicted_class: class_id,
                confidence: mean_confidence,
            }),
            FieldOutcome::Empty => report.empty += 1,
            FieldOutcome::Failed { .. } => report.failed += 1,
        }
    }

    let known: HashSet<&FieldId> = fields.iter().map(|f| &f.field_id).collect();
    report.orphan_results = results.rows().iter().filter(|r| !known.contains(&r.field_id)).count();

    if report.dropped() > 0 || report.orphan_results > 0 {
        info!(
            event = "join.dropped",
            missing_result = report.missing_result,
            empty = report.empty,
            failed = report.failed,
            orphan_results = report.orphan_results,
        );
    }
    (rows, report)
}

/// A joined row with both labels mapped onto the taxonomy. `None` marks a
/// label that did not reconcile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub field_id: FieldId,
    pub raw_label: String,
    pub predicted_class: ClassId,
    pub gt_label: Option<String>,
    pub pred_label: Option<String>,
    pub confidence: f64,
}

/// Map the raw ground-truth label and the predicted class id of every row
/// onto canonical names. Rows are never dropped here.
pub fn standardize(rows: &[JoinedRow], taxonomy: &LabelTaxonomy) -> Vec<ScoredRecord> {
    rows.iter()
        .map(|r| ScoredRecord {
            field_id: r.field_id.clone(),
            raw_label: r.raw_label.clone(),
            predicted_class: r.predicted_class,
            gt_label: taxonomy.normalize_ground_truth(&r.raw_label).map(str::to_owned),
            pred_label: taxonomy.normalize_prediction(r.predicted_class).map(str::to_owned),
            confidence: r.confidence,
        })
        .collect()
}
