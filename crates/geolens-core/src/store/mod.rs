//! Tabular store: the SQL view of the loaded dataset.
//!
//! The original collection is registered as table `data` with a synthetic `_rowid`
//! column holding each record's position. User SQL runs against that table and every
//! result row is joined back to its geometry through `_rowid`.

pub mod engine;
pub mod literal;
pub mod reconcile;
pub mod schema;

use std::sync::Arc;

use datafusion::arrow::record_batch::RecordBatch;
use datafusion_shared::batches_to_rows;
use geojson::FeatureCollection;
use geolens_core_common::{EngineSource, SqlEngine};
use log::{debug, info, warn};

pub use engine::{DataFusionEngine, MinimalSessionSource, TunedSessionSource, default_sources};
pub use literal::{LiteralEncoder, quote_identifier};
pub use reconcile::{ReconciledCollection, ResultRow, reconcile};
pub use schema::{ColumnDef, ColumnType, TableSchema, attribute_names};

use crate::config::ViewerConfig;
use crate::error::{EngineError, FormatError, QueryError, RegistrationError, Result};

/// Name of the registered table.
pub const TABLE_NAME: &str = "data";

/// Synthetic row identity column.
pub const ROW_ID_COLUMN: &str = "_rowid";

/// Outcome of [`TabularStore::register_collection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Features in the registered collection
    pub features: usize,
    /// Attribute columns created, `_rowid` excluded
    pub columns: usize,
    pub inserted: usize,
    pub skipped: usize,
    /// `INSERT` statements sent, failed ones included
    pub statements: usize,
    /// Whether the post-load row count and `_rowid` range matched
    pub verified: bool,
}

#[derive(Debug, Clone, Copy)]
struct InsertSettings {
    batch_size: usize,
    max_text_length: usize,
    max_logged_skips: usize,
    schema_sample_size: usize,
}

/// Owns the SQL engine connection and the registered table.
pub struct TabularStore {
    engine: Option<Arc<dyn SqlEngine>>,
    failed_attempts: Vec<String>,
    schema: Option<TableSchema>,
    settings: InsertSettings,
}

impl std::fmt::Debug for TabularStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabularStore")
            .field("engine", &self.engine.as_ref().map(|engine| engine.name().to_string()))
            .field("failed_attempts", &self.failed_attempts)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl TabularStore {
    /// A store without an engine; call [`TabularStore::connect`] before running SQL.
    #[must_use]
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            engine: None,
            failed_attempts: Vec::new(),
            schema: None,
            settings: InsertSettings {
                batch_size: config.insert_batch_size.max(1),
                max_text_length: config.max_text_length,
                max_logged_skips: config.max_logged_skips,
                schema_sample_size: config.schema_sample_size,
            },
        }
    }

    /// A store using an already opened engine.
    #[must_use]
    pub fn with_engine(config: &ViewerConfig, engine: Arc<dyn SqlEngine>) -> Self {
        let mut store = Self::new(config);
        store.engine = Some(engine);
        store
    }

    /// Try each source in order and adopt the first engine that answers a probe query.
    ///
    /// Does nothing when an engine is already connected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] listing every failed attempt.
    pub async fn connect(
        &mut self,
        sources: &[Arc<dyn EngineSource>],
    ) -> std::result::Result<(), EngineError> {
        if self.engine.is_some() {
            return Ok(());
        }

        self.failed_attempts.clear();
        for source in sources {
            let attempt = async {
                let engine = source.open().await?;
                engine.execute("SELECT 1").await?;
                anyhow::Ok(engine)
            };
            match attempt.await {
                Ok(engine) => {
                    info!("SQL engine ready ({}, via {})", engine.name(), source.name());
                    self.engine = Some(engine);
                    return Ok(());
                },
                Err(err) => {
                    warn!("SQL engine source '{}' failed: {err}", source.name());
                    self.failed_attempts.push(format!("{}: {err}", source.name()));
                },
            }
        }

        Err(self.unavailable())
    }

    /// Whether an engine was connected.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether a `connect` was attempted and failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.engine.is_none() && !self.failed_attempts.is_empty()
    }

    fn unavailable(&self) -> EngineError {
        let attempts = if self.failed_attempts.is_empty() {
            "no engine connected".to_string()
        } else {
            self.failed_attempts.join("; ")
        };
        EngineError::Unavailable { attempts }
    }

    /// The connected engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] when no engine is connected.
    pub fn engine(&self) -> std::result::Result<&Arc<dyn SqlEngine>, EngineError> {
        self.engine.as_ref().ok_or_else(|| self.unavailable())
    }

    /// Columns of the registered table, `None` when no table exists.
    #[must_use]
    pub fn describe(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    /// Replace table `data` with the contents of `collection`.
    ///
    /// An empty collection only drops the previous table. Rows that the engine rejects
    /// are retried in smaller batches and finally skipped one by one.
    ///
    /// # Errors
    ///
    /// Returns an engine error when no engine is connected, and
    /// [`RegistrationError`] when the table cannot be dropped or created or the
    /// collection has no usable attribute names. The table is absent afterwards.
    pub async fn register_collection(
        &mut self,
        collection: &FeatureCollection,
    ) -> Result<RegistrationReport> {
        let engine = Arc::clone(self.engine()?);
        self.schema = None;

        engine
            .execute(&format!("DROP TABLE IF EXISTS {TABLE_NAME}"))
            .await
            .map_err(|err| RegistrationError::Statement {
                statement: "drop",
                message: err.to_string(),
            })?;

        if collection.features.is_empty() {
            debug!("Empty collection; nothing to register");
            return Ok(RegistrationReport {
                verified: true,
                ..RegistrationReport::default()
            });
        }

        let schema = TableSchema::infer(collection, self.settings.schema_sample_size)?;
        engine
            .execute(&schema.create_statement())
            .await
            .map_err(|err| RegistrationError::Statement {
                statement: "create",
                message: err.to_string(),
            })?;

        let mut report = self.insert_rows(engine.as_ref(), &schema, collection).await;
        report.columns = schema.len();
        report.verified = verify_table(engine.as_ref(), collection.features.len()).await;
        info!(
            "Registered {} of {} features with {} columns in table '{TABLE_NAME}'",
            report.inserted, report.features, report.columns
        );

        self.schema = Some(schema);
        Ok(report)
    }

    async fn insert_rows(
        &self,
        engine: &dyn SqlEngine,
        schema: &TableSchema,
        collection: &FeatureCollection,
    ) -> RegistrationReport {
        let encoder =
            LiteralEncoder::new(self.settings.max_text_length, engine.escapes_backslashes());
        let prefix = format!("INSERT INTO {TABLE_NAME} ({}) VALUES ", schema.insert_columns());
        let total = collection.features.len();
        let mut report = RegistrationReport {
            features: total,
            ..RegistrationReport::default()
        };

        let mut position = 0;
        let mut batch_size = self.settings.batch_size;
        while position < total {
            let end = (position + batch_size).min(total);
            let values: Vec<String> = (position..end)
                .map(|row| row_values(&encoder, schema, collection, row))
                .collect();
            let statement = format!("{prefix}{}", values.join(", "));
            report.statements += 1;

            match engine.execute(&statement).await {
                Ok(_) => {
                    report.inserted += end - position;
                    position = end;
                },
                Err(err) if end - position > 1 => {
                    batch_size = ((end - position) / 2).max(1);
                    debug!(
                        "Insert of rows {position}..{end} failed ({err}); retrying with batches of {batch_size}"
                    );
                },
                Err(err) => {
                    report.skipped += 1;
                    if report.skipped <= self.settings.max_logged_skips {
                        warn!("Skipping row {position}: {err}");
                    }
                    position += 1;
                    batch_size = self.settings.batch_size;
                },
            }
        }

        if report.skipped > self.settings.max_logged_skips {
            warn!(
                "Skipped {} rows in total ({} not logged individually)",
                report.skipped,
                report.skipped - self.settings.max_logged_skips
            );
        }
        report
    }

    /// Run user SQL and join the result back onto `original`.
    ///
    /// Text that does not start with `SELECT` is treated as a predicate:
    /// `SELECT * FROM data WHERE <text>`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Unavailable`] without an engine, [`EngineError::NotInitialized`]
    /// without a table, [`QueryError::Engine`] carrying the engine message verbatim,
    /// [`QueryError::EmptyResult`] and [`QueryError::NoRowIdentity`].
    pub async fn run_query(
        &self,
        sql: &str,
        original: &FeatureCollection,
    ) -> Result<ReconciledCollection> {
        let engine = self.engine()?;
        if self.schema.is_none() {
            return Err(EngineError::NotInitialized.into());
        }

        let sql = normalize_query(sql);
        debug!("Running query: {sql}");
        let batches = engine
            .execute(&sql)
            .await
            .map_err(|err| QueryError::Engine {
                message: err.to_string(),
            })?;

        let rows = batches_to_rows(&batches, &[]);
        Ok(reconcile(&sql, rows, original)?)
    }

    /// Scan a Parquet file through the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] without an engine and
    /// [`FormatError::Scan`] carrying the engine message otherwise.
    pub async fn scan_parquet(&self, location: &str) -> Result<Vec<RecordBatch>> {
        let engine = self.engine()?;
        let batches = engine
            .scan_parquet(location)
            .await
            .map_err(|err| FormatError::Scan {
                location: location.to_string(),
                message: err.to_string(),
            })?;
        Ok(batches)
    }
}

/// Wrap bare predicates into a full query against `data`.
#[must_use]
pub fn normalize_query(sql: &str) -> String {
    let trimmed = sql.trim();
    let is_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));
    if is_select {
        trimmed.to_string()
    } else {
        format!("SELECT * FROM {TABLE_NAME} WHERE {trimmed}")
    }
}

fn row_values(
    encoder: &LiteralEncoder,
    schema: &TableSchema,
    collection: &FeatureCollection,
    row: usize,
) -> String {
    let feature = &collection.features[row];
    let values: Vec<String> = std::iter::once(row.to_string())
        .chain(schema.columns.iter().map(|column| {
            encoder.encode(feature.property(&column.name), column.column_type)
        }))
        .collect();
    format!("({})", values.join(", "))
}

async fn verify_table(engine: &dyn SqlEngine, expected: usize) -> bool {
    let sql = format!(
        "SELECT COUNT(*) AS row_count, MAX({}) AS max_rowid FROM {TABLE_NAME}",
        quote_identifier(ROW_ID_COLUMN)
    );
    let rows = match engine.execute(&sql).await {
        Ok(batches) => batches_to_rows(&batches, &[]),
        Err(err) => {
            warn!("Could not verify table '{TABLE_NAME}': {err}");
            return false;
        },
    };

    let count = rows.first().and_then(|row| row.get("row_count")?.as_u64());
    let max_rowid = rows.first().and_then(|row| row.get("max_rowid")?.as_u64());
    let expected_max = expected.checked_sub(1).map(|max| max as u64);
    if count == Some(expected as u64) && max_rowid == expected_max {
        true
    } else {
        warn!(
            "Table '{TABLE_NAME}' holds {count:?} rows with max _rowid {max_rowid:?}; expected {expected} rows"
        );
        false
    }
}
