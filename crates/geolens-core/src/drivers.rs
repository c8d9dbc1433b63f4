//! Registry of the input formats the viewer recognizes.
//!
//! Formats the viewer can load are listed with their capabilities. Formats it knows but
//! cannot read are listed too, so that the user gets a format-specific hint instead of a
//! generic "unsupported" message.
//!
//! # Examples
//!
//! ```
//! use geolens_core::drivers::{find_driver, find_driver_for_path};
//!
//! let geojson = find_driver("geojson").expect("GeoJSON driver should exist");
//! assert!(geojson.capabilities.remote.is_supported());
//!
//! let driver = find_driver_for_path("parcels.GPKG").expect("GeoPackage is known");
//! assert!(driver.remediation.is_some());
//! ```

use std::path::Path;

pub use geolens_core_common::{Driver, DriverCapabilities, SupportStatus};

pub const GEOJSON: &str = "GeoJSON";
pub const SHAPEFILE: &str = "ESRI Shapefile";
pub const PARQUET: &str = "Parquet";

/// Every driver in the registry.
#[must_use]
pub fn get_drivers() -> Vec<Driver> {
    use SupportStatus::{NotSupported, Supported};

    vec![
        Driver::new(
            GEOJSON,
            "GeoJSON",
            &["geojson", "json"],
            Supported,
            Supported,
            Supported,
        ),
        Driver::new(
            SHAPEFILE,
            "ESRI Shapefile (zipped .shp/.dbf/.prj)",
            &["zip"],
            Supported,
            NotSupported,
            NotSupported,
        ),
        Driver::new(
            PARQUET,
            "Apache Parquet / GeoParquet",
            &["parquet", "geoparquet"],
            Supported,
            Supported,
            NotSupported,
        ),
        Driver::unsupported(
            "GPKG",
            "GeoPackage",
            &["gpkg"],
            "Convert the layer to GeoJSON or GeoParquet first, for example with \
             `ogr2ogr -f GeoJSON out.geojson in.gpkg`.",
        ),
        Driver::unsupported(
            "KML",
            "Keyhole Markup Language",
            &["kml", "kmz"],
            "Export the layer from Google Earth or convert it with \
             `ogr2ogr -f GeoJSON out.geojson in.kml`.",
        ),
        Driver::unsupported(
            "OpenFileGDB",
            "ESRI File Geodatabase",
            &["gdb"],
            "Export the feature class to a zipped Shapefile or GeoJSON from ArcGIS or QGIS.",
        ),
    ]
}

/// Drivers that can load data from at least one kind of location.
#[must_use]
pub fn get_available_drivers() -> Vec<Driver> {
    get_drivers()
        .into_iter()
        .filter(|d| d.capabilities.can_load())
        .collect()
}

/// Finds a driver by its short name (case-insensitive).
#[must_use]
pub fn find_driver(name: &str) -> Option<Driver> {
    get_drivers()
        .into_iter()
        .find(|d| d.short_name.eq_ignore_ascii_case(name))
}

/// Finds the driver selected by the extension of `path`.
///
/// Works for file paths and for URL paths. Returns `None` when the extension is missing or
/// unknown.
#[must_use]
pub fn find_driver_for_path(path: impl AsRef<Path>) -> Option<Driver> {
    let extension = path.as_ref().extension()?.to_str()?;
    get_drivers()
        .into_iter()
        .find(|d| d.matches_extension(extension))
}

/// All driver short names, sorted.
#[must_use]
pub fn get_driver_names() -> Vec<&'static str> {
    let mut names: Vec<_> = get_drivers().iter().map(|d| d.short_name).collect();
    names.sort_unstable();
    names
}
