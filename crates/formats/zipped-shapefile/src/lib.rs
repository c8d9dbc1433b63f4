//! Zipped ESRI Shapefile support for `GeoLens`.
//!
//! The binary `.shp`/`.dbf` formats are read by the `shapefile` crate; this crate finds the
//! members inside the archive and maps shapes and attribute records onto features.

pub mod archive;
pub mod decoder;

pub use archive::{ShapefileParts, extract_parts};
pub use decoder::{ShapefileZipDecoder, decode_parts, decode_shapefile_zip, epsg_from_prj};
