//! `GeoJSON` text decoding into a normalized feature collection.
#![allow(clippy::result_large_err)]

use datafusion_shared::{SourcePosition, SpatialFormatReadError, SpatialFormatResult};
use geojson::{FeatureCollection, GeoJson, JsonValue};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parse raw bytes into a `FeatureCollection`.
///
/// A bare `Feature` becomes a one-element collection. A bare geometry, or any other JSON
/// document, is rejected: the viewer needs properties to attach rows to.
pub fn parse_geojson_bytes(
    bytes: &[u8],
    context: impl Into<String>,
) -> SpatialFormatResult<FeatureCollection> {
    let context = context.into();
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let value: JsonValue =
        serde_json::from_slice(bytes).map_err(|err| SpatialFormatReadError::Parse {
            message: format!("Invalid JSON: {err}"),
            position: (err.line() > 0)
                .then(|| SourcePosition::at_line(err.line() as u64, err.column() as u64)),
            context: Some(context.clone()),
        })?;

    parse_geojson_value(value, &context)
}

/// Normalize an already parsed JSON document into a `FeatureCollection`.
pub fn parse_geojson_value(
    value: JsonValue,
    context: &str,
) -> SpatialFormatResult<FeatureCollection> {
    let kind = value
        .get("type")
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let geojson =
        GeoJson::from_json_value(value).map_err(|err| SpatialFormatReadError::Structure {
            message: match kind.as_deref() {
                Some(kind) => format!("'{kind}' is not valid GeoJSON: {err}"),
                None => format!("expected a FeatureCollection or Feature: {err}"),
            },
            context: Some(context.to_string()),
        })?;

    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(geometry) => Err(SpatialFormatReadError::Structure {
            message: format!(
                "expected a FeatureCollection or Feature, found a bare {} geometry",
                geometry_type_name(&geometry.value)
            ),
            context: Some(context.to_string()),
        }),
    }
}

/// `GeoJSON` type name of a geometry value.
#[must_use]
pub fn geometry_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Helper to describe JSON value kinds for log and error messages.
#[must_use]
pub fn describe_value(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
