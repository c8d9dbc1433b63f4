//! `GeoJSON` writer used to export the displayed dataset.

use std::io::Write;

use geojson::FeatureCollection;

/// Options controlling how a collection is serialized.
#[derive(Debug, Clone)]
pub struct GeoJsonWriterOptions {
    /// Write a single `FeatureCollection` document (`true`) or one feature per line.
    pub feature_collection: bool,
    /// Indent the output. Only applies to `FeatureCollection` documents.
    pub pretty_print: bool,
}

impl Default for GeoJsonWriterOptions {
    fn default() -> Self {
        Self {
            feature_collection: true,
            pretty_print: false,
        }
    }
}

impl GeoJsonWriterOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_feature_collection(mut self, feature_collection: bool) -> Self {
        self.feature_collection = feature_collection;
        self
    }

    #[must_use]
    pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }
}

/// Serialize `collection` into `writer`.
///
/// # Errors
///
/// Returns an error if serialization or the underlying writer fails.
pub fn write_geojson<W: Write>(
    writer: &mut W,
    collection: &FeatureCollection,
    options: &GeoJsonWriterOptions,
) -> std::io::Result<()> {
    if options.feature_collection {
        if options.pretty_print {
            serde_json::to_writer_pretty(&mut *writer, collection)?;
        } else {
            serde_json::to_writer(&mut *writer, collection)?;
        }
        writer.write_all(b"\n")?;
    } else {
        for feature in &collection.features {
            serde_json::to_writer(&mut *writer, feature)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()
}

/// Serialize `collection` into an in-memory buffer.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn write_geojson_to_bytes(
    collection: &FeatureCollection,
    options: &GeoJsonWriterOptions,
) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_geojson(&mut buffer, collection, options)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_geojson_bytes;

    fn sample() -> FeatureCollection {
        parse_geojson_bytes(
            br#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{"id":1}},
                {"type":"Feature","geometry":{"type":"Point","coordinates":[3,4]},"properties":{"id":2}}
            ]}"#,
            "sample",
        )
        .unwrap()
    }

    #[test]
    fn options_builder() {
        let options = GeoJsonWriterOptions::new()
            .with_feature_collection(false)
            .with_pretty_print(true);
        assert!(!options.feature_collection);
        assert!(options.pretty_print);
    }

    #[test]
    fn pretty_collection_is_indented() {
        let options = GeoJsonWriterOptions::default().with_pretty_print(true);
        let text = String::from_utf8(write_geojson_to_bytes(&sample(), &options).unwrap()).unwrap();

        assert!(text.contains("\"type\": \"FeatureCollection\""));
        assert!(text.contains("\n  "));
    }

    #[test]
    fn newline_delimited_writes_one_feature_per_line() {
        let options = GeoJsonWriterOptions::default().with_feature_collection(false);
        let text = String::from_utf8(write_geojson_to_bytes(&sample(), &options).unwrap()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"type\":\"Feature\""));
    }
}
