//! `geolens-core` is the engine behind the `GeoLens` viewer.
//!
//! This crate includes:
//! - **Ingestion**: a driver registry and loaders for local files and URLs.
//! - **CRS handling**: detection of the input CRS and reprojection to WGS84.
//! - **Tabular store**: the dataset registered as SQL table `data`, with results joined back
//!   to their geometries.
//! - **Dataset lifecycle**: original and current datasets under a feature limit and filters.
//! - **Styling and rendering**: column classification, color scales and chunked rendering.
//!
//! [`session::ViewerSession`] ties these together.

pub mod analyzer;
pub mod config;
pub mod crs;
pub mod dataset;
pub mod drivers;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod render;
pub mod session;
pub mod store;
pub mod style;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use session::{LoadReport, ViewerSession};
