//! `DataFusion` backed SQL engine and the sources it can be opened from.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::{ParquetReadOptions, SessionConfig, SessionContext};
use geolens_core_common::{EngineSource, SqlEngine};
use log::debug;
use object_store::ClientOptions;
use object_store::http::HttpBuilder;
use url::Url;

use crate::config::ViewerConfig;

const IDENT_NORMALIZATION: &str = "datafusion.sql_parser.enable_ident_normalization";

/// SQL engine over an in-memory `DataFusion` session.
pub struct DataFusionEngine {
    name: String,
    ctx: SessionContext,
}

impl std::fmt::Debug for DataFusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionEngine")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DataFusionEngine {
    /// Engine over a session built from `config`.
    ///
    /// Identifier normalization is always disabled so mixed-case attribute names can be
    /// referenced without quotes.
    #[must_use]
    pub fn new(name: impl Into<String>, config: SessionConfig) -> Self {
        let config = config.set_bool(IDENT_NORMALIZATION, false);
        Self {
            name: name.into(),
            ctx: SessionContext::new_with_config(config),
        }
    }

    /// Session tuned from the viewer configuration.
    #[must_use]
    pub fn tuned(config: &ViewerConfig) -> Self {
        let session = SessionConfig::new()
            .with_target_partitions(config.target_partitions)
            .with_batch_size(config.engine_batch_size)
            .with_information_schema(true);
        Self::new("datafusion", session)
    }

    /// Single-partition session with default settings.
    #[must_use]
    pub fn minimal() -> Self {
        Self::new(
            "datafusion-minimal",
            SessionConfig::new().with_target_partitions(1),
        )
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }
}

#[async_trait]
impl SqlEngine for DataFusionEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let df = self.ctx.sql(sql).await?;
        Ok(df.collect().await?)
    }

    async fn scan_parquet(&self, location: &str) -> Result<Vec<RecordBatch>> {
        let extension = if location.starts_with("http://") || location.starts_with("https://") {
            register_http_object_store(&self.ctx, location)?;
            let url = Url::parse(location)?;
            file_extension(url.path())
        } else {
            file_extension(location)
        };

        let options = ParquetReadOptions {
            file_extension: &extension,
            ..Default::default()
        };
        debug!("Scanning Parquet {location} with {}", self.name);
        let df = self.ctx.read_parquet(location, options).await?;
        Ok(df.collect().await?)
    }
}

fn file_extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or_else(|| ".parquet".to_string(), |ext| format!(".{ext}"))
}

/// Register an HTTP object store for the scheme and authority of `location`.
pub(crate) fn register_http_object_store(ctx: &SessionContext, location: &str) -> Result<()> {
    let base_url = http_base_url(location)?;
    let store = HttpBuilder::new()
        .with_url(base_url.as_str())
        .with_client_options(http_client_options(&base_url))
        .build()
        .with_context(|| format!("Failed to build HTTP store for {base_url}"))?;
    ctx.runtime_env()
        .register_object_store(&base_url, Arc::new(store));
    Ok(())
}

/// Client options for `url`; plain `http` is refused by the store unless allowed.
pub(crate) fn http_client_options(url: &Url) -> ClientOptions {
    ClientOptions::new().with_allow_http(url.scheme() == "http")
}

/// `scheme://host:port` of a URL.
pub(crate) fn http_base_url(location: &str) -> Result<Url> {
    let url = Url::parse(location).with_context(|| format!("Failed to parse URL {location}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("URL has no host: {location}"))?;
    let authority = match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(Url::parse(&format!("{}://{authority}", url.scheme()))?)
}

/// Opens the tuned session.
#[derive(Debug, Clone)]
pub struct TunedSessionSource {
    config: ViewerConfig,
}

impl TunedSessionSource {
    #[must_use]
    pub fn new(config: ViewerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineSource for TunedSessionSource {
    fn name(&self) -> &str {
        "tuned DataFusion session"
    }

    async fn open(&self) -> Result<Arc<dyn SqlEngine>> {
        Ok(Arc::new(DataFusionEngine::tuned(&self.config)))
    }
}

/// Opens the minimal session.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalSessionSource;

#[async_trait]
impl EngineSource for MinimalSessionSource {
    fn name(&self) -> &str {
        "minimal DataFusion session"
    }

    async fn open(&self) -> Result<Arc<dyn SqlEngine>> {
        Ok(Arc::new(DataFusionEngine::minimal()))
    }
}

/// Engine sources tried by default, in order.
#[must_use]
pub fn default_sources(config: &ViewerConfig) -> Vec<Arc<dyn EngineSource>> {
    vec![
        Arc::new(TunedSessionSource::new(config.clone())),
        Arc::new(MinimalSessionSource),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion_shared::batches_to_rows;

    #[tokio::test]
    async fn test_execute_preserves_identifier_case() {
        let engine = DataFusionEngine::minimal();
        engine
            .execute(r#"CREATE TABLE data ("_rowid" INTEGER, "Name" VARCHAR)"#)
            .await
            .unwrap();
        engine
            .execute(r#"INSERT INTO data ("_rowid", "Name") VALUES (0, 'a'), (1, 'b')"#)
            .await
            .unwrap();

        let batches = engine
            .execute("SELECT _rowid, Name FROM data WHERE Name = 'b'")
            .await
            .unwrap();
        let rows = batches_to_rows(&batches, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Name"], "b");
        assert_eq!(rows[0]["_rowid"], 1);
    }

    #[tokio::test]
    async fn test_engine_errors_are_reported() {
        let engine = DataFusionEngine::tuned(&ViewerConfig::default());
        let err = engine.execute("SELEKT nonsense").await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_default_sources_open() {
        for source in default_sources(&ViewerConfig::default()) {
            let engine = source.open().await.unwrap();
            let batches = engine.execute("SELECT 1").await.unwrap();
            assert_eq!(batches_to_rows(&batches, &[]).len(), 1);
        }
    }

    #[test]
    fn test_http_base_url() {
        let base = http_base_url("https://example.com/data/cities.parquet?x=1").unwrap();
        assert_eq!(base.as_str(), "https://example.com/");
        assert!(http_base_url("not a url").is_err());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("/tmp/a.geoparquet"), ".geoparquet");
        assert_eq!(file_extension("/tmp/a"), ".parquet");
    }
}
