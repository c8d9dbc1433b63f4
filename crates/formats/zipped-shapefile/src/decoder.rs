//! Decoding zipped ESRI shapefiles into features.
#![allow(clippy::result_large_err)]

use std::io::Cursor;
use std::sync::LazyLock;

use datafusion_shared::{SourcePosition, SpatialFormatReadError, SpatialFormatResult};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use geolens_core_common::FeatureDecoder;
use log::{debug, warn};
use regex::Regex;
use serde_json::json;
use shapefile::dbase::{self, FieldValue};
use shapefile::{Shape, ShapeReader};

use crate::archive::{ShapefileParts, extract_parts};

static AUTHORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)AUTHORITY\s*\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#)
        .unwrap_or_else(|err| panic!("invalid authority pattern: {err}"))
});

/// Well-known ESRI projection names that carry no `AUTHORITY` clause.
const ESRI_NAMES: &[(&str, u32)] = &[
    ("British_National_Grid", 27700),
    ("WGS_1984_Web_Mercator_Auxiliary_Sphere", 3857),
    ("WGS_84_Pseudo_Mercator", 3857),
];

/// Decodes `.zip` archives holding one shapefile.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShapefileZipDecoder;

impl FeatureDecoder for ShapefileZipDecoder {
    fn driver_name(&self) -> &'static str {
        "ESRI Shapefile"
    }

    fn decode(&self, bytes: &[u8], context: &str) -> SpatialFormatResult<FeatureCollection> {
        decode_shapefile_zip(bytes, context)
    }
}

/// Decode a zip archive into a collection.
///
/// When the `.prj` names an EPSG code the collection gets a legacy `crs` member so the
/// CRS resolver can pick it up.
pub fn decode_shapefile_zip(bytes: &[u8], context: &str) -> SpatialFormatResult<FeatureCollection> {
    let parts = extract_parts(bytes, context)?;
    decode_parts(&parts, context)
}

/// Decode already extracted shapefile members.
pub fn decode_parts(parts: &ShapefileParts, context: &str) -> SpatialFormatResult<FeatureCollection> {
    let context = format!("{context}: {}", parts.name);
    let shapes = read_shapes(&parts.shp, &context)?;
    let mut records = match &parts.dbf {
        Some(dbf) => read_records(dbf, &context)?,
        None => Vec::new(),
    };

    if !records.is_empty() && records.len() != shapes.len() {
        warn!(
            "{context}: {} shapes but {} attribute records",
            shapes.len(),
            records.len()
        );
    }
    records.resize_with(shapes.len(), JsonObject::new);

    let mut features = Vec::with_capacity(shapes.len());
    for (index, (shape, properties)) in shapes.into_iter().zip(records).enumerate() {
        let geometry = shape_to_geometry(shape).map_err(|message| {
            SpatialFormatReadError::Geometry {
                message,
                position: Some(SourcePosition::at_record(index as u64)),
            }
            .with_additional_context(context.as_str())
        })?;
        features.push(Feature {
            bbox: None,
            geometry,
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    let foreign_members = parts
        .prj
        .as_deref()
        .and_then(epsg_from_prj)
        .map(|code| {
            debug!("{context}: projection EPSG:{code}");
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                json!({"type": "name", "properties": {"name": format!("EPSG:{code}")}}),
            );
            members
        });

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    })
}

/// EPSG code named by a `.prj` WKT string.
///
/// The last `AUTHORITY["EPSG", ...]` clause belongs to the outermost definition and wins.
#[must_use]
pub fn epsg_from_prj(prj: &str) -> Option<u32> {
    if let Some(code) = AUTHORITY
        .captures_iter(prj)
        .last()
        .and_then(|captures| captures[1].parse().ok())
    {
        return Some(code);
    }

    let head = prj.trim_start();
    if let Some((_, code)) = ESRI_NAMES.iter().find(|(name, _)| head.contains(name)) {
        return Some(*code);
    }
    head.starts_with("GEOGCS[\"GCS_WGS_1984\"").then_some(4326)
}

fn read_shapes(shp: &[u8], context: &str) -> SpatialFormatResult<Vec<Shape>> {
    let parse_error = |err: shapefile::Error| SpatialFormatReadError::Parse {
        message: format!("Invalid .shp content: {err}"),
        position: None,
        context: Some(context.to_string()),
    };
    let mut reader = ShapeReader::new(Cursor::new(shp)).map_err(parse_error)?;
    reader
        .iter_shapes()
        .collect::<Result<Vec<_>, _>>()
        .map_err(parse_error)
}

fn read_records(dbf: &[u8], context: &str) -> SpatialFormatResult<Vec<JsonObject>> {
    let parse_error = |err: dbase::Error| SpatialFormatReadError::Parse {
        message: format!("Invalid .dbf content: {err}"),
        position: None,
        context: Some(context.to_string()),
    };
    let mut reader = dbase::Reader::new(Cursor::new(dbf)).map_err(parse_error)?;
    let names: Vec<String> = reader
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();
    let records = reader.read().map_err(parse_error)?;

    Ok(records
        .iter()
        .map(|record| {
            names
                .iter()
                .filter_map(|name| {
                    record
                        .get(name)
                        .map(|value| (name.clone(), field_to_json(value)))
                })
                .collect()
        })
        .collect())
}

fn field_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(text) => text.clone().map_or(JsonValue::Null, JsonValue::String),
        FieldValue::Memo(text) => JsonValue::String(text.clone()),
        FieldValue::Numeric(number) => number.map_or(JsonValue::Null, |n| json!(n)),
        FieldValue::Float(number) => number.map_or(JsonValue::Null, |n| json!(f64::from(n))),
        FieldValue::Logical(flag) => flag.map_or(JsonValue::Null, JsonValue::Bool),
        FieldValue::Integer(number) => json!(number),
        FieldValue::Double(number) | FieldValue::Currency(number) => json!(number),
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn shape_to_geometry(shape: Shape) -> Result<Option<Geometry>, String> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }
    let geometry = geo_types::Geometry::<f64>::try_from(shape).map_err(|err| err.to_string())?;
    Ok(Some(Geometry::new(geojson::Value::from(&geometry))))
}
