//! Sequential and parallel aggregation must agree bit for bit, and every
//! field must come back exactly once.

use std::collections::HashSet;

use crop_eval_core::geometry::{rect, FieldGeometry, Polygon};
use crop_eval_core::{
    AggregationDriver, FieldAggregator, FieldId, FieldRecord, GeoTransform, Parallelism, Raster,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ND: f64 = -99.0;

/// 64×48 raster, 4 bands, class at 2 and confidence at 3. About 5% of the
/// pixels carry the source nodata value.
fn random_raster(rng: &mut StdRng) -> Raster {
    let (w, h) = (64, 48);
    let mut class = Vec::with_capacity(w * h);
    let mut conf = Vec::with_capacity(w * h);
    for _ in 0..w * h {
        if rng.gen_bool(0.05) {
            class.push(255.0);
            conf.push(255.0);
        } else {
            class.push(rng.gen_range(0..32) as f64);
            conf.push(rng.gen_range(0.0..1.0));
        }
    }
    let zeros = vec![0.0; w * h];
    Raster::new(
        w,
        h,
        vec![zeros.clone(), zeros, class, conf],
        GeoTransform::north_up(500_000.0, 4_000_480.0, 10.0, 10.0),
        Some(255.0),
    )
    .unwrap()
}

fn random_fields(rng: &mut StdRng, n: usize) -> Vec<FieldRecord> {
    (0..n)
        .map(|i| {
            let x = 500_000.0 + rng.gen_range(-50.0..640.0);
            let y = 4_000_000.0 + rng.gen_range(-50.0..480.0);
            let (dx, dy) = (rng.gen_range(1.0..120.0), rng.gen_range(1.0..120.0));
            let geometry = match i % 7 {
                // A few triangles and malformed rings among the rectangles.
                0 => {
                    let ring = vec![[x, y], [x + dx, y], [x, y + dy], [x, y]];
                    FieldGeometry::Polygon(Polygon::new(ring))
                }
                6 => FieldGeometry::Polygon(Polygon::new(vec![[x, y], [x, y]])),
                _ => rect(x, y, x + dx, y + dy),
            };
            let id = if i % 2 == 0 {
                FieldId::Int(i as i64)
            } else {
                FieldId::Text(format!("f{i}"))
            };
            FieldRecord { field_id: id, geometry, raw_label: "wheat_winter".into() }
        })
        .collect()
}

fn driver(parallelism: Parallelism) -> AggregationDriver {
    let aggregator = FieldAggregator { class_band: 2, confidence_band: 3, nodata: ND };
    AggregationDriver::new(aggregator, parallelism)
}

#[test]
fn cardinality_matches_input() {
    let mut rng = StdRng::seed_from_u64(7);
    let raster = random_raster(&mut rng);
    for n in [0, 1, 13, 250] {
        let fields = random_fields(&mut rng, n);
        let table = driver(Parallelism::Available).aggregate_all(&fields, &raster);
        assert_eq!(table.len(), n);
        let ids: HashSet<&FieldId> = table.rows().iter().map(|r| &r.field_id).collect();
        assert_eq!(ids.len(), n);
        for f in &fields {
            assert!(table.get(&f.field_id).is_some());
        }
    }
}

#[test]
fn sequential_and_parallel_are_bit_identical() {
    let mut rng = StdRng::seed_from_u64(42);
    let raster = random_raster(&mut rng);
    let fields = random_fields(&mut rng, 400);

    let seq = driver(Parallelism::Sequential).aggregate_all(&fields, &raster);
    for parallelism in [Parallelism::Threads(2), Parallelism::Threads(5), Parallelism::Available] {
        let par = driver(parallelism).aggregate_all(&fields, &raster);
        assert_eq!(par.len(), seq.len());
        for f in &fields {
            let a = seq.get(&f.field_id).unwrap();
            let b = par.get(&f.field_id).unwrap();
            assert_eq!(a.predicted_class(), b.predicted_class());
            assert_eq!(
                a.mean_confidence().map(f64::to_bits),
                b.mean_confidence().map(f64::to_bits),
                "field {}",
                f.field_id
            );
            assert_eq!(a.outcome, b.outcome);
        }
    }
}

#[test]
fn reruns_are_bit_identical() {
    let mut rng = StdRng::seed_from_u64(2024);
    let raster = random_raster(&mut rng);
    let fields = random_fields(&mut rng, 120);
    let d = driver(Parallelism::Available);

    let run1 = d.aggregate_all(&fields, &raster);
    let run2 = d.aggregate_all(&fields, &raster);
    for f in &fields {
        let (a, b) = (run1.get(&f.field_id).unwrap(), run2.get(&f.field_id).unwrap());
        assert_eq!(a.mean_confidence().map(f64::to_bits), b.mean_confidence().map(f64::to_bits));
    }
}

#[test]
fn mixed_outcomes_are_all_reported() {
    let mut rng = StdRng::seed_from_u64(11);
    let raster = random_raster(&mut rng);
    let fields = random_fields(&mut rng, 140);
    let table = driver(Parallelism::Available).aggregate_all(&fields, &raster);
    let (predicted, empty, failed) = table.outcome_counts();
    assert_eq!(predicted + empty + failed, fields.len());
    // Every seventh field has a two-point ring.
    assert_eq!(failed, 20);
    assert!(predicted > 0);
}
