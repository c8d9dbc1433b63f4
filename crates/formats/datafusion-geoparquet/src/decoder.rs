//! Turns the record batches of a raw Parquet scan into a feature collection.
#![allow(clippy::result_large_err)]

use datafusion_common::arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use datafusion_common::arrow::datatypes::{DataType, Schema};
use datafusion_shared::{SourcePosition, SpatialFormatReadError, SpatialFormatResult, batches_to_rows};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonValue};
use geozero::ToJson;
use geozero::wkb::Wkb;
use geozero::wkt::Wkt;
use log::debug;

/// Column names probed, in order and case-insensitively, for the geometry column.
pub const GEOMETRY_COLUMN_CANDIDATES: &[&str] =
    &["geometry", "geom", "wkb_geometry", "the_geom", "shape"];

/// Locate the geometry column of a scanned Parquet schema.
///
/// The `primary_column` of GeoParquet `geo` metadata wins when it names an existing
/// column; otherwise the first candidate name present in the schema is used.
#[must_use]
pub fn find_geometry_column(schema: &Schema) -> Option<usize> {
    if let Some(primary) = geoparquet_primary_column(schema)
        && let Ok(index) = schema.index_of(&primary)
    {
        return Some(index);
    }

    GEOMETRY_COLUMN_CANDIDATES.iter().find_map(|candidate| {
        schema
            .fields()
            .iter()
            .position(|field| field.name().eq_ignore_ascii_case(candidate))
    })
}

fn geoparquet_primary_column(schema: &Schema) -> Option<String> {
    let geo = schema.metadata().get("geo")?;
    let metadata: JsonValue = serde_json::from_str(geo).ok()?;
    metadata
        .get("primary_column")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

/// Decode Parquet record batches into features.
///
/// Every non-geometry column becomes a property. Geometry cells may hold WKB (binary
/// columns) or WKT / `GeoJSON` text (string columns); null cells produce features
/// without geometry.
pub fn decode_parquet_batches(
    batches: &[RecordBatch],
    context: &str,
) -> SpatialFormatResult<FeatureCollection> {
    let Some(first) = batches.first() else {
        return Ok(empty_collection());
    };

    let schema = first.schema();
    let geometry_index =
        find_geometry_column(&schema).ok_or_else(|| SpatialFormatReadError::Structure {
            message: format!(
                "no geometry column found (looked for {})",
                GEOMETRY_COLUMN_CANDIDATES.join(", ")
            ),
            context: Some(context.to_string()),
        })?;
    let geometry_name = schema.field(geometry_index).name().clone();
    debug!("Using column '{geometry_name}' as geometry for {context}");

    let mut properties = batches_to_rows(batches, &[geometry_name.as_str()]).into_iter();
    let mut features = Vec::with_capacity(properties.len());
    let mut record = 0u64;

    for batch in batches {
        let column = batch.column(geometry_index);
        for row in 0..batch.num_rows() {
            let geometry = decode_geometry_cell(column, row).map_err(|message| {
                SpatialFormatReadError::Geometry {
                    message,
                    position: Some(SourcePosition::at_record(record)),
                }
                .with_additional_context(format!("{context}, column {geometry_name}"))
            })?;
            features.push(Feature {
                bbox: None,
                geometry,
                id: None,
                properties: properties.next(),
                foreign_members: None,
            });
            record += 1;
        }
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn empty_collection() -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: Vec::new(),
        foreign_members: None,
    }
}

fn decode_geometry_cell(column: &ArrayRef, row: usize) -> Result<Option<Geometry>, String> {
    if column.is_null(row) {
        return Ok(None);
    }

    let json = match column.data_type() {
        DataType::Binary => wkb_to_json(column.as_binary::<i32>().value(row))?,
        DataType::LargeBinary => wkb_to_json(column.as_binary::<i64>().value(row))?,
        DataType::BinaryView => wkb_to_json(column.as_binary_view().value(row))?,
        DataType::Utf8 => text_to_json(column.as_string::<i32>().value(row))?,
        DataType::LargeUtf8 => text_to_json(column.as_string::<i64>().value(row))?,
        DataType::Utf8View => text_to_json(column.as_string_view().value(row))?,
        other => return Err(format!("unsupported geometry column type {other}")),
    };

    let value: JsonValue = serde_json::from_str(&json).map_err(|e| e.to_string())?;
    match GeoJson::from_json_value(value).map_err(|e| e.to_string())? {
        GeoJson::Geometry(geometry) => Ok(Some(geometry)),
        _ => Err("geometry cell does not contain a geometry".to_string()),
    }
}

fn wkb_to_json(bytes: &[u8]) -> Result<String, String> {
    Wkb(bytes.to_vec())
        .to_json()
        .map_err(|e| format!("invalid WKB: {e}"))
}

fn text_to_json(text: &str) -> Result<String, String> {
    let text = text.trim();
    if text.starts_with('{') {
        Ok(text.to_string())
    } else {
        Wkt(text.to_string())
            .to_json()
            .map_err(|e| format!("invalid WKT: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion_common::arrow::array::{BinaryArray, Float64Array, StringArray};
    use datafusion_common::arrow::datatypes::Field;
    use std::collections::HashMap;
    use std::sync::Arc;

    pub(crate) fn point_wkb(x: f64, y: f64) -> Vec<u8> {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&x.to_le_bytes());
        bytes.extend_from_slice(&y.to_le_bytes());
        bytes
    }

    fn wkb_batch(geometry_name: &str) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("pop", DataType::Float64, true),
            Field::new(geometry_name, DataType::Binary, true),
        ]));
        let a = point_wkb(2.35, 48.85);
        let b = point_wkb(13.4, 52.52);
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("Paris"), Some("Berlin"), Some("Nowhere")])),
                Arc::new(Float64Array::from(vec![2.1e6, 3.6e6, 0.0])),
                Arc::new(BinaryArray::from(vec![Some(a.as_slice()), Some(b.as_slice()), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn finds_candidate_column_case_insensitively() {
        let batch = wkb_batch("GEOM");
        assert_eq!(find_geometry_column(&batch.schema()), Some(2));
    }

    #[test]
    fn geo_metadata_primary_column_wins() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "geo".to_string(),
            r#"{"version":"1.0.0","primary_column":"footprint"}"#.to_string(),
        );
        let schema = Schema::new(vec![
            Field::new("geometry", DataType::Binary, true),
            Field::new("footprint", DataType::Binary, true),
        ])
        .with_metadata(metadata);

        assert_eq!(find_geometry_column(&schema), Some(1));
    }

    #[test]
    fn decodes_wkb_points_and_properties() {
        let collection = decode_parquet_batches(&[wkb_batch("geometry")], "cities.parquet").unwrap();

        assert_eq!(collection.features.len(), 3);
        let paris = &collection.features[0];
        assert_eq!(paris.property("name").unwrap(), "Paris");
        assert!(paris.property("geometry").is_none());
        match &paris.geometry.as_ref().unwrap().value {
            geojson::Value::Point(position) => {
                assert!((position[0] - 2.35).abs() < 1e-9);
                assert!((position[1] - 48.85).abs() < 1e-9);
            },
            other => panic!("expected point, got {other:?}"),
        }
        assert!(collection.features[2].geometry.is_none());
    }

    #[test]
    fn decodes_wkt_text_column() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, true),
            Field::new("the_geom", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(StringArray::from(vec![
                    "LINESTRING (0 0, 1 1)",
                    r#"{"type":"Point","coordinates":[5,6]}"#,
                ])),
            ],
        )
        .unwrap();

        let collection = decode_parquet_batches(&[batch], "lines.parquet").unwrap();
        assert!(matches!(
            collection.features[0].geometry.as_ref().unwrap().value,
            geojson::Value::LineString(_)
        ));
        assert!(matches!(
            collection.features[1].geometry.as_ref().unwrap().value,
            geojson::Value::Point(_)
        ));
    }

    #[test]
    fn missing_geometry_column_is_an_error() {
        let schema = Arc::new(Schema::new(vec![Field::new("name", DataType::Utf8, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["x"]))]).unwrap();

        let err = decode_parquet_batches(&[batch], "plain.parquet").unwrap_err();
        assert!(err.to_string().contains("no geometry column found"));
    }

    #[test]
    fn corrupt_wkb_reports_record() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "geometry",
            DataType::Binary,
            true,
        )]));
        let bytes: &[u8] = &[1, 1, 0];
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(BinaryArray::from(vec![Some(bytes)]))])
                .unwrap();

        let err = decode_parquet_batches(&[batch], "bad.parquet").unwrap_err();
        assert!(matches!(err, SpatialFormatReadError::Geometry { .. }));
        let message = err.to_string();
        assert!(message.contains("record 0"));
        assert!(message.ends_with("(bad.parquet, column geometry)"));
    }

    #[test]
    fn no_batches_is_an_empty_collection() {
        let collection = decode_parquet_batches(&[], "empty.parquet").unwrap();
        assert!(collection.features.is_empty());
    }
}
