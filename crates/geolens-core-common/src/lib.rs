//! Common types and traits shared across `GeoLens` crates.
//!
//! This crate provides the abstractions that are shared between `geolens-core` and the
//! format crates, preventing circular dependencies.

pub mod drivers;
pub mod io;

// Re-export commonly used types
pub use drivers::{Driver, DriverCapabilities, SupportStatus};
pub use io::{EngineSource, FeatureDecoder, SqlEngine};
