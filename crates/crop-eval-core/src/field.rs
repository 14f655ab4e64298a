use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::geometry::FieldGeometry;

/// Opaque field identifier, unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldId {
    Int(i64),
    Text(String),
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// One ground-truth field: identifier, polygon in the raster CRS and the
/// raw (unreconciled) crop label.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub field_id: FieldId,
    pub geometry: FieldGeometry,
    pub raw_label: String,
}

impl FieldRecord {
    pub fn new(
        field_id: impl Into<FieldId>,
        geometry: FieldGeometry,
        raw_label: impl Into<String>,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            geometry,
            raw_label: raw_label.into(),
        }
    }
}

/// Reject batches in which a field id occurs twice.
pub fn ensure_unique_ids(fields: &[FieldRecord]) -> Result<(), InputError> {
    let mut seen = HashSet::with_capacity(fields.len());
    for f in fields {
        if !seen.insert(&f.field_id) {
            return Err(InputError::DuplicateFieldId(f.field_id.clone()));
        }
    }
    Ok(())
}
