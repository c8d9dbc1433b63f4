//! [`FeatureDecoder`] implementation for `GeoJSON` text.

use datafusion_shared::SpatialFormatResult;
use geojson::FeatureCollection;
use geolens_core_common::FeatureDecoder;

use crate::parser::parse_geojson_bytes;

/// Decodes `.geojson` / `.json` payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonDecoder;

impl FeatureDecoder for GeoJsonDecoder {
    fn driver_name(&self) -> &'static str {
        "GeoJSON"
    }

    fn decode(&self, bytes: &[u8], context: &str) -> SpatialFormatResult<FeatureCollection> {
        parse_geojson_bytes(bytes, context)
    }
}
