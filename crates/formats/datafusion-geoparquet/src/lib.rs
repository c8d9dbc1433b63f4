//! (Geo)Parquet support for `GeoLens`.
//!
//! Reading the Parquet container is delegated to the SQL engine's raw scan; this crate
//! only locates the geometry column in the scanned batches and turns rows into features.

pub mod decoder;

pub use decoder::{GEOMETRY_COLUMN_CANDIDATES, decode_parquet_batches, find_geometry_column};
