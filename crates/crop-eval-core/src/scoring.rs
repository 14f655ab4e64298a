//! Per-class metrics over reconciled records.
//!
//! Every function here operates on [`LabeledRecord`]s, i.e. records in which
//! both the ground-truth and the predicted label resolved to a canonical
//! class. [`complete_records`] produces them and accounts for the rest.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::info;

use crate::field::FieldId;
use crate::reconcile::ScoredRecord;
use crate::taxonomy::LabelTaxonomy;

/// A scored record with both labels resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRecord {
    pub field_id: FieldId,
    pub gt_label: String,
    pub pred_label: String,
    pub confidence: f64,
}

impl LabeledRecord {
    pub fn new(field_id: impl Into<FieldId>, gt: &str, pred: &str, confidence: f64) -> Self {
        Self {
            field_id: field_id.into(),
            gt_label: gt.to_owned(),
            pred_label: pred.to_owned(),
            confidence,
        }
    }

    pub fn is_agreement(&self) -> bool {
        self.gt_label == self.pred_label
    }
}

/// Records excluded before scoring, by reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionReport {
    pub missing_gt_label: usize,
    pub missing_pred_label: usize,
    pub non_finite_confidence: usize,
}

impl ExclusionReport {
    pub fn total(&self) -> usize {
        self.missing_gt_label + self.missing_pred_label + self.non_finite_confidence
    }
}

/// Keep the records that can be scored. A record missing both labels counts
/// once, under `missing_gt_label`.
pub fn complete_records(records: &[ScoredRecord]) -> (Vec<LabeledRecord>, ExclusionReport) {
    let mut report = ExclusionReport::default();
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        match (&r.gt_label, &r.pred_label) {
            (None, _) => report.missing_gt_label += 1,
            (_, None) => report.missing_pred_label += 1,
            _ if !r.confidence.is_finite() => report.non_finite_confidence += 1,
            (Some(gt), Some(pred)) => out.push(LabeledRecord {
                field_id: r.field_id.clone(),
                gt_label: gt.clone(),
                pred_label: pred.clone(),
                confidence: r.confidence,
            }),
        }
    }
    if report.total() > 0 {
        info!(
            event = "scoring.excluded",
            missing_gt_label = report.missing_gt_label,
            missing_pred_label = report.missing_pred_label,
            non_finite_confidence = report.non_finite_confidence,
            kept = out.len(),
        );
    }
    (out, report)
}

/// Which label column to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelColumn {
    GroundTruth,
    Predicted,
}

impl LabelColumn {
    fn of(self, r: &LabeledRecord) -> &str {
        match self {
            Self::GroundTruth => &r.gt_label,
            Self::Predicted => &r.pred_label,
        }
    }
}

/// Per-value counts of `column`, most frequent first, ties by name.
pub fn record_count(records: &[LabeledRecord], column: LabelColumn) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records {
        *counts.entry(column.of(r)).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> =
        counts.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Percentage (0..=100) of records per ground-truth class whose prediction
/// matches. Only classes with at least one ground-truth record appear; use
/// [`agreement_for`] to query a class with none.
pub fn agreement(records: &[LabeledRecord]) -> BTreeMap<String, f64> {
    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for r in records {
        let e = tally.entry(r.gt_label.as_str()).or_default();
        e.0 += 1;
        if r.is_agreement() {
            e.1 += 1;
        }
    }
    tally
        .into_iter()
        .map(|(class, (total, hits))| (class.to_owned(), percent(hits, total)))
        .collect()
}

/// Agreement for one class; 0 when the class has no ground-truth record.
pub fn agreement_for(agreement: &BTreeMap<String, f64>, class: &str) -> f64 {
    agreement.get(class).copied().unwrap_or(0.0)
}

fn percent(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

/// Mean confidence per predicted class.
pub fn average_confidence(records: &[LabeledRecord]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for r in records {
        let e = sums.entry(r.pred_label.as_str()).or_default();
        e.0 += r.confidence;
        e.1 += 1;
    }
    sums.into_iter()
        .map(|(class, (sum, n))| (class.to_owned(), sum / n as f64))
        .collect()
}

/// Square ground-truth × predicted count matrix over the full taxonomy, in
/// declared order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    /// Row-major, rows = ground truth, columns = prediction.
    counts: Vec<usize>,
}

impl ConfusionMatrix {
    fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self { labels, counts: vec![0; n * n] }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual * self.size() + predicted]
    }

    pub fn row(&self, actual: usize) -> &[usize] {
        let n = self.size();
        &self.counts[actual * n..(actual + 1) * n]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.get(class, class)
    }

    /// Column sum minus the diagonal.
    pub fn false_positives(&self, class: usize) -> usize {
        (0..self.size()).map(|r| self.get(r, class)).sum::<usize>() - self.get(class, class)
    }

    /// Row sum minus the diagonal.
    pub fn false_negatives(&self, class: usize) -> usize {
        self.row(class).iter().sum::<usize>() - self.get(class, class)
    }

    /// Ground-truth instances of `class`.
    pub fn support(&self, class: usize) -> usize {
        self.row(class).iter().sum()
    }

    /// Predicted instances of `class`.
    pub fn predicted(&self, class: usize) -> usize {
        (0..self.size()).map(|r| self.get(r, class)).sum()
    }

    /// F1 of `class`; 0 when it has no true positive, false positive or
    /// false negative.
    pub fn f1(&self, class: usize) -> f64 {
        let tp = self.true_positives(class);
        let denom = 2 * tp + self.false_positives(class) + self.false_negatives(class);
        if denom == 0 {
            0.0
        } else {
            2.0 * tp as f64 / denom as f64
        }
    }
}

/// F1 score of one class plus its instance counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassF1 {
    pub class: String,
    pub f1: f64,
    pub support: usize,
    pub predicted: usize,
}

/// Build the confusion matrix over every class in `taxonomy` and the per
/// class F1 table. Classes with no ground-truth and no predicted instance
/// are left out of the F1 table; the matrix always keeps them.
///
/// Records whose labels are not taxonomy names are skipped.
pub fn confusion_and_f1(
    records: &[LabeledRecord],
    taxonomy: &LabelTaxonomy,
) -> (ConfusionMatrix, Vec<ClassF1>) {
    let mut matrix = ConfusionMatrix::new(taxonomy.names().map(str::to_owned).collect());
    let n = matrix.size();
    for r in records {
        let cell = (taxonomy.position(&r.gt_label), taxonomy.position(&r.pred_label));
        if let (Some(a), Some(p)) = cell {
            matrix.counts[a * n + p] += 1;
        }
    }

    let f1 = (0..n)
        .filter_map(|i| {
            let support = matrix.support(i);
            let predicted = matrix.predicted(i);
            (support + predicted > 0).then(|| ClassF1 {
                class: matrix.labels[i].clone(),
                f1: matrix.f1(i),
                support,
                predicted,
            })
        })
        .collect();
    (matrix, f1)
}
