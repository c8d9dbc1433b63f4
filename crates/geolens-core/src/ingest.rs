//! Turning files and URLs into feature collections.
//!
//! The input is dispatched on its extension through the driver registry. GeoJSON and
//! zipped shapefiles are decoded from raw bytes; Parquet is scanned by the SQL engine
//! and its geometry column decoded afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use datafusion_geojson::GeoJsonDecoder;
use datafusion_geoparquet::decode_parquet_batches;
use geojson::FeatureCollection;
use geolens_core_common::FeatureDecoder;
use log::{debug, info};
use object_store::http::HttpBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, RetryConfig};
use url::Url;
use zipped_shapefile::ShapefileZipDecoder;

use crate::drivers::{self, Driver, GEOJSON, PARQUET, SHAPEFILE};
use crate::error::{FormatError, IoErrorExt, NetworkError, Result};
use crate::store::TabularStore;
use crate::store::engine::http_client_options;

/// Where a dataset is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Remote(Url),
}

impl InputSource {
    /// Inputs starting with `http://` or `https://` are URLs, anything else is a path.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidUrl`] for URLs that do not parse.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Remote(parse_url(trimmed)?))
        } else {
            Ok(Self::Local(PathBuf::from(trimmed)))
        }
    }

    /// File name or URL, for messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Local(path) => path.file_name().map_or_else(
                || path.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            ),
            Self::Remote(url) => url.to_string(),
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Load from either kind of source.
///
/// # Errors
///
/// See [`load_path`] and [`load_url`].
pub async fn load(source: &InputSource, store: &TabularStore) -> Result<FeatureCollection> {
    match source {
        InputSource::Local(path) => load_path(path, store).await,
        InputSource::Remote(url) => load_url(url.as_str(), store).await,
    }
}

/// Load a local file.
///
/// Parquet files need a connected SQL engine in `store`; other formats do not.
///
/// # Errors
///
/// [`FormatError`] for unknown, unsupported or undecodable files, an I/O error when the
/// file cannot be read.
pub async fn load_path(path: &Path, store: &TabularStore) -> Result<FeatureCollection> {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let driver = resolve_driver(path, &name)?;
    info!("Loading {} as {}", path.display(), driver.short_name);

    if driver.short_name == PARQUET {
        let location = path.to_string_lossy();
        let batches = store.scan_parquet(&location).await?;
        return decode_with(PARQUET, || decode_parquet_batches(&batches, &name));
    }

    let bytes = tokio::fs::read(path).await.with_read_context(path)?;
    decode_bytes(&driver, &bytes, &name)
}

/// Load a dataset from an `http(s)` URL.
///
/// The extension of the URL path selects the driver. Zipped shapefiles are refused and
/// URLs without a known extension are fetched as GeoJSON.
///
/// # Errors
///
/// [`NetworkError`] for malformed URLs and failed downloads, [`FormatError`] for refused
/// or undecodable content.
pub async fn load_url(url: &str, store: &TabularStore) -> Result<FeatureCollection> {
    let parsed = parse_url(url)?;
    let driver = drivers::find_driver_for_path(parsed.path());

    match driver {
        Some(driver) if driver.short_name == SHAPEFILE => Err(FormatError::RemoteArchive {
            url: url.to_string(),
        }
        .into()),
        Some(driver) if driver.remediation.is_some() => Err(unsupported(&driver).into()),
        Some(driver) if driver.short_name == PARQUET => {
            info!("Scanning remote Parquet {url}");
            let batches = store.scan_parquet(parsed.as_str()).await?;
            decode_with(PARQUET, || decode_parquet_batches(&batches, url))
        },
        driver => {
            if driver.is_none() {
                debug!("No driver for {url}; trying GeoJSON");
            }
            let bytes = fetch_bytes(&parsed).await?;
            decode_with(GEOJSON, || GeoJsonDecoder.decode(&bytes, url))
        },
    }
}

/// Decode an in-memory payload with the decoder of `driver`.
///
/// # Errors
///
/// [`FormatError::Decode`] when the payload is invalid, [`FormatError::Unsupported`]
/// for drivers that cannot decode raw bytes.
pub fn decode_bytes(driver: &Driver, bytes: &[u8], context: &str) -> Result<FeatureCollection> {
    match driver.short_name {
        GEOJSON => decode_with(GEOJSON, || GeoJsonDecoder.decode(bytes, context)),
        SHAPEFILE => decode_with(SHAPEFILE, || ShapefileZipDecoder.decode(bytes, context)),
        _ => Err(unsupported(driver).into()),
    }
}

fn resolve_driver(path: &Path, name: &str) -> Result<Driver> {
    let driver = drivers::find_driver_for_path(path).ok_or_else(|| FormatError::UnknownFormat {
        name: name.to_string(),
    })?;
    if driver.remediation.is_some() {
        return Err(unsupported(&driver).into());
    }
    Ok(driver)
}

fn unsupported(driver: &Driver) -> FormatError {
    FormatError::Unsupported {
        format: driver.long_name.to_string(),
        remediation: driver.remediation.unwrap_or_default().to_string(),
    }
}

fn decode_with(
    format: &str,
    decode: impl FnOnce() -> datafusion_shared::SpatialFormatResult<FeatureCollection>,
) -> Result<FeatureCollection> {
    let collection = decode().map_err(|source| FormatError::Decode {
        format: format.to_string(),
        source,
    })?;
    debug!("Decoded {} features as {format}", collection.features.len());
    Ok(collection)
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|err| NetworkError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(NetworkError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        }
        .into());
    }
    Ok(parsed)
}

/// Transport failures retried before a download is given up.
const FETCH_RETRIES: usize = 2;

/// Download the body at `url`, query string included.
///
/// The HTTP store is rooted at the full URL and read at the empty path, so the request
/// goes to `url` exactly as given.
async fn fetch_bytes(url: &Url) -> Result<Vec<u8>> {
    let fetch_error = |message: String| NetworkError::Fetch {
        url: url.to_string(),
        message,
    };

    let store = HttpBuilder::new()
        .with_url(url.as_str())
        .with_client_options(http_client_options(url))
        .with_retry(RetryConfig {
            max_retries: FETCH_RETRIES,
            retry_timeout: Duration::from_secs(30),
            ..RetryConfig::default()
        })
        .build()
        .map_err(|err| fetch_error(err.to_string()))?;

    let bytes = store
        .get(&ObjectPath::default())
        .await
        .map_err(|err| fetch_error(err.to_string()))?
        .bytes()
        .await
        .map_err(|err| fetch_error(err.to_string()))?;
    debug!("Fetched {} bytes from {url}", bytes.len());
    Ok(bytes.to_vec())
}
