//! Exporting the displayed dataset as a GeoJSON file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use datafusion_geojson::{GeoJsonWriterOptions, write_geojson};
use geojson::FeatureCollection;
use log::info;

use crate::error::{IoErrorExt, Result};

/// Media type of the exported file.
pub const EXPORT_MIME_TYPE: &str = "application/geo+json";

/// `<product>-export-<timestamp>.geojson`, with the colons of the ISO 8601 timestamp
/// replaced by dashes.
#[must_use]
pub fn export_file_name(product: &str, now: DateTime<Utc>) -> String {
    format!(
        "{product}-export-{}.geojson",
        now.format("%Y-%m-%dT%H-%M-%S%.3fZ")
    )
}

/// Write `collection` as indented GeoJSON into `dir` and return the file path.
///
/// # Errors
///
/// Returns an I/O error when the file cannot be created or written.
pub fn export_collection(
    collection: &FeatureCollection,
    dir: &Path,
    product: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let path = dir.join(export_file_name(product, now));
    let file = File::create(&path).with_write_context(&path)?;
    let mut writer = BufWriter::new(file);
    let options = GeoJsonWriterOptions::new().with_pretty_print(true);
    write_geojson(&mut writer, collection, &options).with_write_context(&path)?;

    info!(
        "Exported {} features to {}",
        collection.features.len(),
        path.display()
    );
    Ok(path)
}
