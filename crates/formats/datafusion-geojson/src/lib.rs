//! `GeoJSON` support for `GeoLens`: decoding uploads and URLs, and exporting the
//! displayed dataset.

pub mod decoder;
pub mod parser;
pub mod writer;

pub use decoder::GeoJsonDecoder;
pub use parser::{describe_value, geometry_type_name, parse_geojson_bytes, parse_geojson_value};
pub use writer::{GeoJsonWriterOptions, write_geojson, write_geojson_to_bytes};
