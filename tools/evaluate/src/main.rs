//! Crop-type model evaluation against ground-truth field polygons.
//!
//! `analysis` mode writes per-field joined records, the confusion matrix and
//! the per-class metrics table. `select` mode writes the fields worth a
//! manual review as GeoJSON. Both write `run_summary.json`.

mod report;

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, ValueEnum};
use crop_eval_core::io::geojson;
use crop_eval_core::reconcile::{filter_conforming, join_predictions, standardize};
use crop_eval_core::scoring::{complete_records, confusion_and_f1};
use crop_eval_core::selection::select;
use crop_eval_core::summary::summarize;
use crop_eval_core::{
    driver, telemetry, EvalConfig, FieldAggregator, FieldRecord, LabelTaxonomy, Parallelism,
    ScoredRecord,
};
use tracing::{info, Level};

use report::{AggregationCounts, RunSummary};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Score the model per class.
    Analysis,
    /// Pick disagreements and low-confidence agreements for review.
    Select,
}

#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate a crop-type prediction raster against ground-truth fields"
)]
struct Args {
    /// Ground-truth fields (GeoJSON FeatureCollection in the raster CRS).
    #[arg(long)]
    gt: PathBuf,

    /// Prediction GeoTIFF with class and confidence bands.
    #[arg(long)]
    raster: PathBuf,

    /// Feature property holding the raw crop label.
    #[arg(long)]
    label_field: Option<String>,

    #[arg(long, value_enum)]
    mode: Mode,

    /// Output directory, created if missing.
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// Worker threads; 0 = all cores, 1 = sequential.
    #[arg(long)]
    threads: Option<usize>,

    /// Confidence percentile used as the per-class selection cutoff.
    #[arg(long)]
    percentile: Option<f64>,

    /// JSON run configuration; CLI flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON taxonomy replacing the built-in crop dictionary.
    #[arg(long)]
    taxonomy: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Emit JSON log lines on stderr.
    #[arg(long)]
    json_logs: bool,

    /// Log file; defaults to `.log/logfile_<YYYYmmdd_HHMMSS>.log`.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Config file (or defaults) with CLI overrides applied, validated
    /// against `taxonomy`.
    fn config(&self, taxonomy: &LabelTaxonomy) -> Result<EvalConfig> {
        let mut cfg = match &self.config {
            Some(path) => EvalConfig::load(path)
                .with_context(|| format!("Invalid config: {}", path.display()))?,
            None => EvalConfig::default(),
        };
        if let Some(label_field) = &self.label_field {
            cfg.label_field = label_field.clone();
        }
        if let Some(threads) = self.threads {
            cfg.threads = threads;
        }
        if let Some(p) = self.percentile {
            cfg.target_percentile = p;
        }
        cfg.validate(taxonomy)?;
        Ok(cfg)
    }

    fn taxonomy(&self) -> Result<LabelTaxonomy> {
        match &self.taxonomy {
            Some(path) => LabelTaxonomy::load(path)
                .with_context(|| format!("Invalid taxonomy: {}", path.display())),
            None => Ok(LabelTaxonomy::crops()),
        }
    }

    fn log_path(&self, now: NaiveDateTime) -> PathBuf {
        match &self.log_file {
            Some(p) => p.clone(),
            None => Path::new(".log").join(now.format("logfile_%Y%m%d_%H%M%S.log").to_string()),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Load, reconcile, aggregate and join. Returns the scored records and a
/// summary of what was dropped on the way.
fn prepare(
    args: &Args,
    cfg: &EvalConfig,
    taxonomy: &LabelTaxonomy,
) -> Result<(Vec<ScoredRecord>, Vec<FieldRecord>, RunSummary)> {
    let mut summary = RunSummary {
        mode: format!("{:?}", args.mode).to_lowercase(),
        ..Default::default()
    };

    let fields = geojson::load_fields(&args.gt, &cfg.label_field)
        .with_context(|| format!("Loading ground truth: {}", args.gt.display()))?;
    summary.fields_loaded = fields.len();

    let (fields, non_conforming) = filter_conforming(fields, taxonomy);
    summary.record_non_conforming(&non_conforming);

    let table = driver::aggregate_all(
        &args.raster,
        &fields,
        FieldAggregator::from_config(cfg),
        Parallelism::from_threads(cfg.threads),
    )
    .with_context(|| format!("Aggregating predictions: {}", args.raster.display()))?;
    let (predicted, empty, failed) = table.outcome_counts();
    summary.aggregation = AggregationCounts { predicted, empty, failed };

    let (joined, join_report) = join_predictions(&fields, &table);
    summary.join = join_report;

    Ok((standardize(&joined, taxonomy), fields, summary))
}

fn run_analysis(
    out_dir: &Path,
    scored: &[ScoredRecord],
    taxonomy: &LabelTaxonomy,
    summary: &mut RunSummary,
) -> Result<()> {
    report::write_joined_records(&out_dir.join("joined_records.csv"), scored)?;

    let (records, excluded) = complete_records(scored);
    summary.scoring_exclusions = Some(excluded);
    summary.records_scored = Some(records.len());

    let (matrix, f1) = confusion_and_f1(&records, taxonomy);
    report::write_confusion_matrix(&out_dir.join("confusion_matrix.csv"), &matrix)?;
    report::write_final_results(&out_dir.join("final_results.csv"), &summarize(&records, &f1))?;
    Ok(())
}

fn run_select(
    out_dir: &Path,
    scored: &[ScoredRecord],
    fields: &[FieldRecord],
    percentile: f64,
    summary: &mut RunSummary,
) -> Result<()> {
    let selected = select(scored, percentile)?;
    summary.records_selected = Some(selected.len());
    let path = out_dir.join("selected_fields.geojson");
    geojson::write_selection(&path, fields, &selected)
        .with_context(|| format!("Write failed: {}", path.display()))?;
    Ok(())
}

fn run(args: &Args) -> Result<RunSummary> {
    // Configuration and taxonomy problems abort before any raster work.
    let taxonomy = args.taxonomy()?;
    let cfg = args.config(&taxonomy)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Cannot create {}", args.out_dir.display()))?;

    let (scored, fields, mut summary) = prepare(args, &cfg, &taxonomy)?;
    match args.mode {
        Mode::Analysis => run_analysis(&args.out_dir, &scored, &taxonomy, &mut summary)?,
        Mode::Select => {
            run_select(&args.out_dir, &scored, &fields, cfg.target_percentile, &mut summary)?
        }
    }
    report::write_summary(&args.out_dir.join("run_summary.json"), &summary)?;
    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_path = args.log_path(Local::now().naive_local());
    if let Some(dir) = log_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    let log_file = File::create(&log_path)
        .with_context(|| format!("Cannot open log file {}", log_path.display()))?;
    telemetry::init_tracing(args.json_logs, args.log_level, Some(log_file));

    let summary = run(&args)?;
    info!(
        event = "run.finished",
        mode = %summary.mode,
        fields = summary.fields_loaded,
        non_conforming = summary.non_conforming,
        join_dropped = summary.join.dropped(),
        out_dir = %args.out_dir.display(),
    );
    Ok(())
}
