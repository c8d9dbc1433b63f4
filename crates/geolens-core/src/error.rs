//! Error types for `GeoLens` operations.
//!
//! Every stage of the viewer pipeline has its own error enum so callers can apply
//! the matching recovery policy: format and network failures abort a load, CRS
//! failures fall back to untransformed data, engine failures only disable SQL,
//! query failures leave the displayed dataset untouched and registration problems
//! are logged.

use std::path::PathBuf;

use datafusion_shared::SpatialFormatReadError;
use thiserror::Error;

/// Main error type for `GeoLens` operations.
///
/// Display formatting is delegated to the underlying variants.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Unsupported or unparseable input
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Remote fetch failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Unknown or unusable projection
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// SQL engine could not be obtained
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// SQL or ad-hoc filter failures
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Table registration failures
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// File system errors
    #[error(transparent)]
    Io(#[from] IoError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Unsupported or unparseable input.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A known format this viewer cannot read
    #[error("{format} files are not supported")]
    Unsupported {
        /// Long name of the format
        format: String,
        /// What the user can do instead
        remediation: String,
    },

    /// The extension does not map to any known format
    #[error("Unsupported file type '{name}'")]
    UnknownFormat {
        /// File name or URL that was rejected
        name: String,
    },

    /// Zipped shapefiles can only be loaded from local files
    #[error("Zipped shapefiles cannot be loaded from a URL: {url}")]
    RemoteArchive {
        /// The rejected URL
        url: String,
    },

    /// The payload could not be decoded
    #[error("Failed to decode {format}: {source}")]
    Decode {
        /// Driver that attempted the decode
        format: String,
        /// Underlying decoder error
        #[source]
        source: SpatialFormatReadError,
    },

    /// The Parquet scan through the SQL engine failed
    #[error("Failed to scan {location}: {message}")]
    Scan {
        /// File or URL being scanned
        location: String,
        /// Engine error text
        message: String,
    },
}

/// Remote fetch failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// The transport rejected the request
    #[error("Failed to fetch {url}: {message}")]
    Fetch {
        /// The URL being fetched
        url: String,
        /// Transport error text
        message: String,
    },
}

/// Unknown or unusable projection.
#[derive(Debug, Error)]
pub enum CrsError {
    /// The projection library has no definition for the CRS
    #[error("Unknown coordinate reference system {crs}")]
    Unknown {
        /// The detected CRS
        crs: String,
    },

    /// Coordinates could not be projected
    #[error("Failed to project coordinates from {crs}: {message}")]
    Projection {
        /// The source CRS
        crs: String,
        /// Projection library message
        message: String,
    },

    /// Some features of a collection could not be projected
    #[error("{failed} of {total} features could not be projected from {crs}; first failure: {first}")]
    PartialProjection {
        crs: String,
        failed: usize,
        total: usize,
        /// Message of the first failing feature
        first: String,
    },
}

/// SQL engine availability errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every engine source failed to open
    #[error("SQL engine unavailable: {attempts}")]
    Unavailable {
        /// Summary of every failed attempt
        attempts: String,
    },

    /// No table has been registered yet
    #[error("No data table is registered; load a dataset with attributes first")]
    NotInitialized,
}

/// SQL and ad-hoc filter failures.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query ran but matched nothing
    #[error("Query returned no rows")]
    EmptyResult,

    /// No result row carried a usable `_rowid`
    #[error("Query results must include the _rowid column to map rows back to geometries")]
    NoRowIdentity,

    /// Error reported by the SQL engine, verbatim
    #[error("{message}")]
    Engine {
        /// Engine error text
        message: String,
    },

    /// The ad-hoc filter did not match the grammar
    #[error("Invalid filter '{expression}': expected <column> <op> <value> with op one of == != > < >= <=")]
    FilterSyntax {
        /// The rejected expression
        expression: String,
    },

    /// There is no dataset to query
    #[error("No dataset is loaded")]
    NoData,
}

/// Table registration failures.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The collection has no usable attribute names
    #[error("Cannot register a table without attribute columns")]
    NoColumns,

    /// A DDL statement failed
    #[error("Failed to {statement} the data table: {message}")]
    Statement {
        /// `drop` or `create`
        statement: &'static str,
        /// Engine error text
        message: String,
    },
}

/// File system errors.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read a file
    #[error("Failed to read '{path}': {source}")]
    Read {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("Failed to write '{path}': {source}")]
    Write {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// File was not found
    #[error("File not found: '{path}'")]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },
}

/// Type alias for Results using `ViewerError`.
pub type Result<T> = std::result::Result<T, ViewerError>;

impl ViewerError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Format(e) => e.user_message(),
            Self::Network(e) => e.user_message(),
            Self::Crs(e) => format!("Projection problem: {e}"),
            Self::Engine(e) => format!("SQL is disabled: {e}"),
            Self::Query(e) => format!("Query error: {e}"),
            Self::Registration(e) => format!("Table registration failed: {e}"),
            Self::Io(e) => e.to_string(),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Format(e) => e.recovery_suggestion(),
            Self::Network(e) => e.recovery_suggestion(),
            Self::Engine(e) => e.recovery_suggestion(),
            Self::Query(e) => e.recovery_suggestion(),
            Self::Io(IoError::FileNotFound { .. }) => {
                Some("Check that the file path is correct and the file exists.".to_string())
            },
            _ => None,
        }
    }

    /// Whether the displayed dataset is still usable after this error.
    ///
    /// Only format, network, I/O and configuration failures interrupt the pipeline.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Crs(_) | Self::Engine(_) | Self::Query(_) | Self::Registration(_)
        )
    }
}

impl FormatError {
    fn user_message(&self) -> String {
        match self {
            Self::Unsupported {
                format,
                remediation,
            } => format!("{format} files are not supported. {remediation}"),
            Self::Decode { format, source } => format!("Could not read {format} data: {source}"),
            _ => self.to_string(),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Unsupported { remediation, .. } => Some(remediation.clone()),
            Self::UnknownFormat { .. } => Some(
                "Supported formats: GeoJSON (.geojson, .json), zipped Shapefile (.zip), \
                 Parquet/GeoParquet (.parquet, .geoparquet). Run 'geolens drivers' for details."
                    .to_string(),
            ),
            Self::RemoteArchive { .. } => {
                Some("Download the archive and open it as a local file.".to_string())
            },
            Self::Decode { .. } => Some("Check the file format and ensure it's valid.".to_string()),
            Self::Scan { .. } => None,
        }
    }
}

impl NetworkError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidUrl { url, .. } => format!("'{url}' is not a valid URL"),
            Self::Fetch { url, message } => {
                format!("Could not download {url} ({message})")
            },
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Fetch { .. } => Some(
                "Check the URL, your network connection and that the server allows \
                 cross-origin requests."
                    .to_string(),
            ),
            Self::InvalidUrl { .. } => None,
        }
    }
}

impl EngineError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Unavailable { .. } => {
                Some("Filtering with expressions and rendering still work.".to_string())
            },
            Self::NotInitialized => None,
        }
    }
}

impl QueryError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::NoRowIdentity => Some("Add _rowid to the SELECT list, e.g. SELECT _rowid, ...".to_string()),
            Self::FilterSyntax { .. } => Some("Example: pop > 1000000 or country == 'FR'".to_string()),
            _ => None,
        }
    }
}

impl From<SpatialFormatReadError> for FormatError {
    fn from(source: SpatialFormatReadError) -> Self {
        Self::Decode {
            format: "input".to_string(),
            source,
        }
    }
}

/// Extension trait for adding file context to I/O errors.
pub trait IoErrorExt<T> {
    /// Add read context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Read`], or [`IoError::FileNotFound`] for missing files.
    fn with_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add write context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Write`] if the underlying operation fails.
    fn with_write_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn with_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| {
            let path = path.into();
            if source.kind() == std::io::ErrorKind::NotFound {
                ViewerError::Io(IoError::FileNotFound { path })
            } else {
                ViewerError::Io(IoError::Read { path, source })
            }
        })
    }

    fn with_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| {
            ViewerError::Io(IoError::Write {
                path: path.into(),
                source,
            })
        })
    }
}
