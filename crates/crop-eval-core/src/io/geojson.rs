//! GeoJSON field input and selection output.
//!
//! Input is a `FeatureCollection` of `Polygon` / `MultiPolygon` features in
//! the raster's CRS, each carrying a `field_id` property and a label
//! property. A feature whose geometry is missing, of another type or
//! malformed is kept as [`FieldGeometry::Invalid`] and fails on its own
//! during aggregation.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::InputError;
use crate::field::{ensure_unique_ids, FieldId, FieldRecord};
use crate::geometry::{FieldGeometry, Polygon, Ring};
use crate::selection::SelectedRecord;

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

type Position = Vec<f64>;

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    #[serde(other)]
    Unsupported,
}

fn ring(positions: Vec<Position>) -> Option<Ring> {
    positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Some([*x, *y]),
            _ => None,
        })
        .collect()
}

fn polygon(rings: Vec<Vec<Position>>) -> Option<Polygon> {
    let mut rings = rings.into_iter().map(ring).collect::<Option<Vec<Ring>>>()?.into_iter();
    let exterior = rings.next()?;
    Some(Polygon::with_holes(exterior, rings.collect()))
}

fn field_geometry(value: Option<Value>) -> Result<FieldGeometry, String> {
    let value = value.ok_or_else(|| "feature has no geometry".to_owned())?;
    let g: Geometry = serde_json::from_value(value).map_err(|e| e.to_string())?;
    match g {
        Geometry::Polygon { coordinates } => polygon(coordinates)
            .map(FieldGeometry::Polygon)
            .ok_or_else(|| "malformed Polygon coordinates".to_owned()),
        Geometry::MultiPolygon { coordinates } => coordinates
            .into_iter()
            .map(polygon)
            .collect::<Option<Vec<_>>>()
            .map(FieldGeometry::MultiPolygon)
            .ok_or_else(|| "malformed MultiPolygon coordinates".to_owned()),
        Geometry::Unsupported => Err("geometry must be Polygon or MultiPolygon".to_owned()),
    }
}

fn field_id(v: Option<&Value>) -> Result<FieldId, String> {
    match v {
        Some(Value::String(s)) => Ok(FieldId::Text(s.clone())),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(FieldId::Int)
            .ok_or_else(|| format!("field_id {n} is not an integer")),
        Some(other) => Err(format!("field_id must be a string or integer, got {other}")),
        None => Err("missing field_id property".to_owned()),
    }
}

/// Parse a GeoJSON document into field records. Labels are read from the
/// `label_field` property; a missing or non-string label becomes an empty
/// raw label, which no taxonomy resolves.
pub fn parse_fields(
    text: &str,
    label_field: &str,
    path: &Path,
) -> Result<Vec<FieldRecord>, InputError> {
    let fc: FeatureCollection = serde_json::from_str(text)
        .map_err(|source| InputError::Json { path: path.to_path_buf(), source })?;

    let mut fields = Vec::with_capacity(fc.features.len());
    for (index, feature) in fc.features.into_iter().enumerate() {
        let reject = |reason: String| InputError::Feature { index, reason };
        let props = feature.properties.unwrap_or_default();
        let id = field_id(props.get("field_id")).map_err(reject)?;
        let geometry = field_geometry(feature.geometry).unwrap_or_else(|reason| {
            warn!(event = "input.invalid_geometry", field_id = %id, reason = %reason);
            FieldGeometry::Invalid(reason)
        });
        let raw_label = match props.get(label_field) {
            Some(Value::String(s)) => s.clone(),
            other => {
                warn!(
                    event = "input.missing_label",
                    field_id = %id,
                    label_field,
                    found = ?other,
                );
                String::new()
            }
        };
        fields.push(FieldRecord { field_id: id, geometry, raw_label });
    }
    ensure_unique_ids(&fields)?;
    Ok(fields)
}

/// Read field records from a GeoJSON file.
pub fn load_fields(path: &Path, label_field: &str) -> Result<Vec<FieldRecord>, InputError> {
    let text = fs::read_to_string(path)
        .map_err(|source| InputError::Io { path: path.to_path_buf(), source })?;
    parse_fields(&text, label_field, path)
}

fn ring_json(r: &Ring) -> Value {
    Value::Array(r.iter().map(|[x, y]| json!([x, y])).collect())
}

fn polygon_json(p: &Polygon) -> Value {
    let mut rings = vec![ring_json(&p.exterior)];
    rings.extend(p.holes.iter().map(ring_json));
    Value::Array(rings)
}

pub fn geometry_json(g: &FieldGeometry) -> Value {
    match g {
        FieldGeometry::Polygon(p) => json!({ "type": "Polygon", "coordinates": polygon_json(p) }),
        FieldGeometry::MultiPolygon(ps) => json!({
            "type": "MultiPolygon",
            "coordinates": ps.iter().map(polygon_json).collect::<Vec<_>>(),
        }),
        FieldGeometry::Invalid(_) => Value::Null,
    }
}

/// Build a FeatureCollection of the selected records. Geometry is taken from
/// `fields` by id; a record whose field is unknown is written without
/// geometry.
pub fn selection_collection(fields: &[FieldRecord], selected: &[SelectedRecord]) -> Value {
    let by_id: HashMap<&FieldId, &FieldRecord> =
        fields.iter().map(|f| (&f.field_id, f)).collect();
    let features: Vec<Value> = selected
        .iter()
        .map(|s| {
            let r = &s.record;
            let geometry = by_id.get(&r.field_id).map(|f| geometry_json(&f.geometry));
            json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": {
                    "field_id": r.field_id,
                    "raw_label": r.raw_label,
                    "predicted_class": r.predicted_class,
                    "gt_label": r.gt_label,
                    "pred_label": r.pred_label,
                    "confidence": r.confidence,
                    "conf_cutoff": s.cutoff,
                    "reason": s.reason,
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// Write the selected records as GeoJSON.
pub fn write_selection(
    path: &Path,
    fields: &[FieldRecord],
    selected: &[SelectedRecord],
) -> Result<(), InputError> {
    let file = File::create(path)
        .map_err(|source| InputError::Io { path: path.to_path_buf(), source })?;
    serde_json::to_writer_pretty(BufWriter::new(file), &selection_collection(fields, selected))
        .map_err(|source| InputError::Json { path: path.to_path_buf(), source })
}
