//! Crop-type model evaluation.
//!
//! Aggregates a per-pixel class/confidence raster to field polygons, joins
//! the result with ground-truth labels reconciled through a canonical
//! taxonomy, and scores the model per class. A selection policy picks the
//! fields worth a manual review.
//!
//! Pipeline, in the order the `evaluate` tool drives it:
//!
//! 1. [`io::geojson::load_fields`] and [`reconcile::filter_conforming`]
//! 2. [`driver::aggregate_all`] (parallel with the `threading` feature)
//! 3. [`reconcile::join_predictions`] and [`reconcile::standardize`]
//! 4. [`scoring`] and [`summary::summarize`], or [`selection::select`]

pub mod aggregate;
pub mod config;
pub mod driver;
pub mod error;
pub mod field;
pub mod geometry;
pub mod io;
pub mod raster;
pub mod reconcile;
pub mod scoring;
pub mod selection;
pub mod summary;
pub mod taxonomy;
pub mod telemetry;

pub use aggregate::{AggregationResult, FieldAggregator, FieldOutcome};
pub use config::EvalConfig;
pub use driver::{AggregationDriver, AggregationTable, Parallelism};
pub use error::{Error, Result};
pub use field::{FieldId, FieldRecord};
pub use geometry::FieldGeometry;
pub use raster::{GeoTransform, Raster};
pub use reconcile::{JoinReport, JoinedRow, ScoredRecord};
pub use scoring::{ClassF1, ConfusionMatrix, ExclusionReport, LabeledRecord};
pub use selection::SelectedRecord;
pub use summary::ClassSummary;
pub use taxonomy::{CanonicalLabel, ClassId, LabelTaxonomy};
