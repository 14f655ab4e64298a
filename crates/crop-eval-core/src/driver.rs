//! Fan-out of [`FieldAggregator`] over a batch of fields.
//!
//! Each field is an independent task against the same read-only raster. With
//! the `threading` feature the batch runs on a dedicated rayon pool; without
//! it, or with `threads == 1`, it runs sequentially. Both paths produce
//! bit-identical results.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::aggregate::{AggregationResult, FieldAggregator, FieldOutcome};
use crate::error::Error;
use crate::field::{FieldId, FieldRecord};
use crate::io::geotiff;
use crate::raster::Raster;

/// Degree of parallelism for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    /// Fixed worker count.
    Threads(usize),
    /// One worker per available core.
    Available,
}

impl Parallelism {
    /// 0 = available cores, 1 = sequential, n = n workers.
    pub fn from_threads(n: usize) -> Self {
        match n {
            0 => Self::Available,
            1 => Self::Sequential,
            n => Self::Threads(n),
        }
    }
}

/// Results keyed by field id. Row order is unspecified; look results up by
/// id, never by position.
#[derive(Debug, Clone, Default)]
pub struct AggregationTable {
    rows: Vec<AggregationResult>,
    index: HashMap<FieldId, usize>,
}

impl AggregationTable {
    pub fn from_rows(rows: Vec<AggregationResult>) -> Self {
        let index = rows.iter().enumerate().map(|(i, r)| (r.field_id.clone(), i)).collect();
        Self { rows, index }
    }

    pub fn get(&self, id: &FieldId) -> Option<&AggregationResult> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[AggregationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Counts of (predicted, empty, failed) rows.
    pub fn outcome_counts(&self) -> (usize, usize, usize) {
        self.rows.iter().fold((0, 0, 0), |(p, e, f), r| match r.outcome {
            FieldOutcome::Predicted { .. } => (p + 1, e, f),
            FieldOutcome::Empty => (p, e + 1, f),
            FieldOutcome::Failed { .. } => (p, e, f + 1),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregationDriver {
    pub aggregator: FieldAggregator,
    pub parallelism: Parallelism,
}

impl AggregationDriver {
    pub fn new(aggregator: FieldAggregator, parallelism: Parallelism) -> Self {
        Self { aggregator, parallelism }
    }

    /// Aggregate every field. The table holds exactly one row per input
    /// field.
    pub fn aggregate_all(&self, fields: &[FieldRecord], raster: &Raster) -> AggregationTable {
        let start = Instant::now();
        let rows = self.run(fields, raster);
        debug_assert_eq!(rows.len(), fields.len());

        let table = AggregationTable::from_rows(rows);
        let (predicted, empty, failed) = table.outcome_counts();
        info!(
            event = "aggregate.batch_finished",
            fields = fields.len(),
            predicted,
            empty,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
        );
        table
    }

    /// Decode the GeoTIFF at `path` once and aggregate against it.
    pub fn aggregate_path(
        &self,
        fields: &[FieldRecord],
        path: &Path,
    ) -> Result<AggregationTable, Error> {
        let raster = geotiff::read_raster(path)?;
        Ok(self.aggregate_all(fields, &raster))
    }

    fn run_sequential(&self, fields: &[FieldRecord], raster: &Raster) -> Vec<AggregationResult> {
        fields.iter().map(|f| self.aggregator.aggregate(f, raster)).collect()
    }

    #[cfg(feature = "threading")]
    fn run(&self, fields: &[FieldRecord], raster: &Raster) -> Vec<AggregationResult> {
        use rayon::prelude::*;

        let threads = match self.parallelism {
            Parallelism::Sequential => return self.run_sequential(fields, raster),
            Parallelism::Threads(n) => n,
            Parallelism::Available => 0,
        };
        let agg = self.aggregator;
        let par = || -> Vec<AggregationResult> {
            fields.par_iter().map(|f| agg.aggregate(f, raster)).collect()
        };
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(par),
            Err(e) => {
                tracing::warn!(event = "aggregate.pool_unavailable", error = %e);
                par()
            }
        }
    }

    #[cfg(not(feature = "threading"))]
    fn run(&self, fields: &[FieldRecord], raster: &Raster) -> Vec<AggregationResult> {
        self.run_sequential(fields, raster)
    }
}

/// Aggregate `fields` against the GeoTIFF at `raster_path`.
pub fn aggregate_all(
    raster_path: &Path,
    fields: &[FieldRecord],
    aggregator: FieldAggregator,
    parallelism: Parallelism,
) -> Result<AggregationTable, Error> {
    AggregationDriver::new(aggregator, parallelism).aggregate_path(fields, raster_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{rect, FieldGeometry, Polygon};
    use crate::raster::GeoTransform;

    /// 8×8 raster, class = col / 2, confidence = row / 10.
    fn raster() -> Raster {
        let classes = (0..64).map(|i| ((i % 8) / 2) as f64).collect();
        let conf = (0..64).map(|i| (i / 8) as f64 / 10.0).collect();
        let t = GeoTransform::north_up(0.0, 8.0, 1.0, 1.0);
        Raster::new(8, 8, vec![classes, conf], t, None).unwrap()
    }

    fn driver(p: Parallelism) -> AggregationDriver {
        let agg = FieldAggregator { class_band: 0, confidence_band: 1, nodata: -99.0 };
        AggregationDriver::new(agg, p)
    }

    fn fields() -> Vec<FieldRecord> {
        let mut v: Vec<FieldRecord> = (0..8)
            .map(|i| FieldRecord::new(i as i64, rect(i as f64, 0.0, i as f64 + 1.0, 8.0), "x"))
            .collect();
        v.push(FieldRecord::new("outside", rect(20.0, 20.0, 21.0, 21.0), "x"));
        v.push(FieldRecord::new(
            "broken",
            FieldGeometry::Polygon(Polygon::new(vec![[0.0, 0.0]])),
            "x",
        ));
        v
    }

    #[test]
    fn one_row_per_field_including_failures() {
        let fields = fields();
        let table = driver(Parallelism::Threads(3)).aggregate_all(&fields, &raster());
        assert_eq!(table.len(), fields.len());
        for f in &fields {
            assert!(table.get(&f.field_id).is_some(), "missing {}", f.field_id);
        }
        assert_eq!(table.outcome_counts(), (8, 1, 1));
    }

    #[test]
    fn column_fields_pick_their_class() {
        let table = driver(Parallelism::Sequential).aggregate_all(&fields(), &raster());
        for col in 0..8i64 {
            let r = table.get(&FieldId::Int(col)).unwrap();
            assert_eq!(r.predicted_class(), Some(col / 2));
            // Mean of 0.0..0.7 in steps of 0.1.
            assert!((r.mean_confidence().unwrap() - 0.35).abs() < 1e-12);
        }
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let fields = fields();
        let seq = driver(Parallelism::Sequential).aggregate_all(&fields, &raster());
        let par = driver(Parallelism::Available).aggregate_all(&fields, &raster());
        for f in &fields {
            assert_eq!(seq.get(&f.field_id), par.get(&f.field_id));
        }
    }

    #[test]
    fn empty_batch() {
        let table = driver(Parallelism::Available).aggregate_all(&[], &raster());
        assert!(table.is_empty());
    }

    #[test]
    fn parallelism_from_threads() {
        assert_eq!(Parallelism::from_threads(0), Parallelism::Available);
        assert_eq!(Parallelism::from_threads(1), Parallelism::Sequential);
        assert_eq!(Parallelism::from_threads(6), Parallelism::Threads(6));
    }
}
