//! CSV and JSON artifacts written by the `evaluate` tool.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crop_eval_core::field::FieldId;
use crop_eval_core::reconcile::{JoinReport, NonConforming};
use crop_eval_core::scoring::ExclusionReport;
use crop_eval_core::summary::round2;
use crop_eval_core::{ClassSummary, ConfusionMatrix, ScoredRecord};
use serde::Serialize;

/// Quote a CSV cell when it contains a separator, quote or newline.
pub fn csv_cell(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).with_context(|| format!("Create failed: {}", path.display()))?;
    Ok(BufWriter::new(f))
}

fn opt(v: Option<&str>) -> Cow<'_, str> {
    v.map(csv_cell).unwrap_or(Cow::Borrowed(""))
}

/// One row per joined field, with both reconciled labels.
pub fn write_joined_records(path: &Path, records: &[ScoredRecord]) -> Result<()> {
    let mut w = create(path)?;
    writeln!(w, "field_id,raw_label,predicted_class,confidence,gt_label,pred_label")?;
    for r in records {
        writeln!(
            w,
            "{},{},{},{},{},{}",
            csv_cell(&r.field_id.to_string()),
            csv_cell(&r.raw_label),
            r.predicted_class,
            r.confidence,
            opt(r.gt_label.as_deref()),
            opt(r.pred_label.as_deref()),
        )?;
    }
    w.flush().with_context(|| format!("Write failed: {}", path.display()))
}

/// Full-taxonomy matrix; header row and first column are class names.
pub fn write_confusion_matrix(path: &Path, matrix: &ConfusionMatrix) -> Result<()> {
    let mut w = create(path)?;
    let header: Vec<Cow<str>> = matrix.labels().iter().map(|l| csv_cell(l)).collect();
    writeln!(w, ",{}", header.join(","))?;
    for (i, label) in matrix.labels().iter().enumerate() {
        let row: Vec<String> = matrix.row(i).iter().map(usize::to_string).collect();
        writeln!(w, "{},{}", csv_cell(label), row.join(","))?;
    }
    w.flush().with_context(|| format!("Write failed: {}", path.display()))
}

/// Per-class metrics rounded to two decimals.
pub fn write_final_results(path: &Path, rows: &[ClassSummary]) -> Result<()> {
    let mut w = create(path)?;
    writeln!(w, "Crop,F1,Average Confidence,Count,Percent Agreement")?;
    for r in rows {
        let conf = r.average_confidence.map(|c| round2(c).to_string()).unwrap_or_default();
        writeln!(
            w,
            "{},{},{},{},{}",
            csv_cell(&r.crop),
            round2(r.f1),
            conf,
            r.count,
            round2(r.percent_agreement),
        )?;
    }
    w.flush().with_context(|| format!("Write failed: {}", path.display()))
}

#[derive(Debug, Default, Serialize)]
pub struct AggregationCounts {
    pub predicted: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Where every input field went.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub fields_loaded: usize,
    pub non_conforming: usize,
    pub non_conforming_ids: Vec<FieldId>,
    pub aggregation: AggregationCounts,
    pub join: JoinReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_exclusions: Option<ExclusionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_scored: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_selected: Option<usize>,
}

impl RunSummary {
    pub fn record_non_conforming(&mut self, rejected: &[NonConforming]) {
        self.non_conforming = rejected.len();
        self.non_conforming_ids = rejected.iter().map(|n| n.field_id.clone()).collect();
    }
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("Write failed: {}", path.display()))
}
