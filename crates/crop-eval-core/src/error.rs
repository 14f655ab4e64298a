//! Error types for label reconciliation, raster access and configuration.
//!
//! Per-field failures ([`MaskError`]) never escape the aggregation driver:
//! they are converted into a no-data result for that field. Everything else
//! is a startup-time error that aborts the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::field::FieldId;

/// Result type alias for crop-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Inconsistency in a canonical label table. Always fatal: the reference
/// table is corrupt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("taxonomy is empty")]
    Empty,
    #[error("canonical label '{0}' is declared more than once")]
    DuplicateName(String),
    #[error("numeric id {id} is shared by '{first}' and '{second}'")]
    DuplicateId { id: i64, first: String, second: String },
    #[error("alias '{alias}' is claimed by both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
}

/// Failure while masking one field against the raster.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MaskError {
    #[error("geometry has no polygons")]
    EmptyGeometry,
    #[error("unreadable geometry: {0}")]
    InvalidGeometry(String),
    #[error("ring has {0} distinct vertices, need at least 3")]
    DegenerateRing(usize),
    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,
    #[error("band {band} out of range, raster has {count} bands")]
    BandOutOfRange { band: usize, count: usize },
    #[error("rotated geotransforms are not supported")]
    RotatedTransform,
}

/// Failure while decoding a raster from disk.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
    #[error("{path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("raster buffer holds {len} values, expected a multiple of {width}x{height}")]
    Shape { len: usize, width: usize, height: usize },
}

/// Failure while loading field records.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("feature {index}: {reason}")]
    Feature { index: usize, reason: String },
    #[error("field id {0} appears more than once")]
    DuplicateFieldId(FieldId),
}

/// Unsupported option value. Detected before any aggregation starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("nodata sentinel must be finite, got {0}")]
    NonFiniteSentinel(f64),
    #[error("nodata sentinel {0} lies inside the valid confidence range [0, 1]")]
    SentinelInConfidenceRange(f64),
    #[error("nodata sentinel {sentinel} is the class id of '{class}'")]
    SentinelIsClassId { sentinel: f64, class: String },
    #[error("class band and confidence band are both {0}")]
    SameBand(usize),
    #[error("target percentile must be within [0, 1], got {0}")]
    Percentile(f64),
    #[error("cannot read config {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_alias_message_names_both_labels() {
        let err = TaxonomyError::DuplicateAlias {
            alias: "beets".into(),
            first: "Sugarbeets".into(),
            second: "Turnips".into(),
        };
        assert_eq!(
            err.to_string(),
            "alias 'beets' is claimed by both 'Sugarbeets' and 'Turnips'"
        );
    }

    #[test]
    fn crate_error_is_transparent() {
        let err: Error = ConfigError::Percentile(1.5).into();
        assert_eq!(err.to_string(), "target percentile must be within [0, 1], got 1.5");
    }
}
