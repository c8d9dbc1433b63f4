//! I/O seams between the viewer core, the SQL engine and the format decoders.

use anyhow::Result;
use async_trait::async_trait;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion_shared::SpatialFormatResult;
use geojson::FeatureCollection;
use std::sync::Arc;

/// An embedded SQL engine connection.
///
/// The viewer treats the engine as opaque: it sends SQL text and receives record
/// batches back. Errors are reported as text because they are shown to the user
/// verbatim.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Human readable name of the engine, used in logs.
    fn name(&self) -> &str;

    /// Executes one SQL statement and collects its result.
    ///
    /// DDL and `INSERT` statements return an empty vector or a single count batch.
    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>>;

    /// Scans a Parquet file (local path or `http(s)` URL) and returns every row.
    async fn scan_parquet(&self, location: &str) -> Result<Vec<RecordBatch>>;

    /// Whether string literals in this engine's dialect treat `\` as an escape character.
    fn escapes_backslashes(&self) -> bool {
        false
    }
}

/// One place an engine can be obtained from.
///
/// Sources are tried in order and the first one that opens and answers a probe query
/// is adopted.
#[async_trait]
pub trait EngineSource: Send + Sync {
    /// Name of the source, used in logs and in the "engine unavailable" message.
    fn name(&self) -> &str;

    /// Initializes and connects an engine.
    async fn open(&self) -> Result<Arc<dyn SqlEngine>>;
}

/// Decodes a raw byte payload into a feature collection.
pub trait FeatureDecoder: Send + Sync {
    /// Short name of the driver this decoder implements.
    fn driver_name(&self) -> &'static str;

    /// Decodes `bytes`; `context` names the source (file name or URL) for error messages.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload cannot be parsed or does not describe features.
    fn decode(&self, bytes: &[u8], context: &str) -> SpatialFormatResult<FeatureCollection>;
}
