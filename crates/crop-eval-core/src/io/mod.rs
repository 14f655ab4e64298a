//! File formats at the edge of the pipeline.

pub mod geojson;
pub mod geotiff;
