//! The viewer session: one dataset, its SQL table and the map it is drawn on.
//!
//! Loading runs the full pipeline: decode, detect and correct the CRS, store the
//! original, register the SQL table and render. Every later operation derives a new
//! current view from the original, reclassifies its columns and redraws it.
//!
//! Methods that redraw spawn a render task and must be called from within a Tokio
//! runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use geojson::FeatureCollection;
use geolens_core_common::EngineSource;
use log::{debug, info, warn};

use crate::analyzer::{ColumnClasses, analyze};
use crate::config::ViewerConfig;
use crate::crs::{CrsId, CrsResolver};
use crate::dataset::{CurrentView, DatasetManager};
use crate::error::{EngineError, QueryError, Result};
use crate::export::export_collection;
use crate::ingest::{self, InputSource};
use crate::render::{Bounds, DatasetSummary, RenderController, RenderOutcome, RenderSink};
use crate::store::{RegistrationReport, TabularStore, default_sources};
use crate::style::ColorScale;

/// What a load did.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// File name or URL
    pub name: String,
    pub features: usize,
    pub shown: usize,
    /// CRS the data arrived in
    pub crs: CrsId,
    /// `None` when no engine is connected or registration failed
    pub registration: Option<RegistrationReport>,
}

/// Drives a dataset from input to map.
pub struct ViewerSession {
    config: ViewerConfig,
    datasets: DatasetManager,
    store: TabularStore,
    resolver: CrsResolver,
    columns: ColumnClasses,
    source_crs: Option<CrsId>,
    color_column: Option<String>,
    renderer: RenderController,
    sink: Arc<dyn RenderSink>,
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("config", &self.config)
            .field("datasets", &self.datasets)
            .field("source_crs", &self.source_crs)
            .finish_non_exhaustive()
    }
}

impl ViewerSession {
    /// Session drawing into `sink`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` does not validate.
    pub fn new(config: ViewerConfig, sink: Arc<dyn RenderSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            datasets: DatasetManager::new(config.feature_limit),
            store: TabularStore::new(&config),
            resolver: CrsResolver::default(),
            columns: ColumnClasses::default(),
            source_crs: None,
            color_column: None,
            renderer: RenderController::new(config.render_chunk_size),
            sink,
            config,
        })
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: CrsResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    #[must_use]
    pub fn datasets(&self) -> &DatasetManager {
        &self.datasets
    }

    #[must_use]
    pub fn store(&self) -> &TabularStore {
        &self.store
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnClasses {
        &self.columns
    }

    #[must_use]
    pub fn current(&self) -> Option<&CurrentView> {
        self.datasets.current()
    }

    /// Connect the SQL engine from the default sources.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`]; everything except SQL keeps working.
    pub async fn connect_engine(&mut self) -> std::result::Result<(), EngineError> {
        let sources = default_sources(&self.config);
        self.connect_engine_with(&sources).await
    }

    /// Connect the SQL engine from `sources`, registering an already loaded dataset.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] when every source fails.
    pub async fn connect_engine_with(
        &mut self,
        sources: &[Arc<dyn EngineSource>],
    ) -> std::result::Result<(), EngineError> {
        let was_available = self.store.is_available();
        self.store.connect(sources).await?;
        if !was_available && let Some(original) = self.datasets.original().cloned() {
            self.register(&original, "loaded dataset").await;
            self.publish_summary();
        }
        Ok(())
    }

    /// Load a local file or URL.
    ///
    /// # Errors
    ///
    /// Format, network and I/O errors abort the load and leave the session unchanged.
    pub async fn load(&mut self, source: &InputSource) -> Result<LoadReport> {
        let collection = ingest::load(source, &self.store).await?;
        Ok(self
            .load_collection(collection, &source.display_name())
            .await)
    }

    /// Load a local file.
    ///
    /// # Errors
    ///
    /// See [`ingest::load_path`].
    pub async fn load_path(&mut self, path: &Path) -> Result<LoadReport> {
        self.load(&InputSource::Local(path.to_path_buf())).await
    }

    /// Load from an `http(s)` URL.
    ///
    /// # Errors
    ///
    /// See [`ingest::load_url`].
    pub async fn load_url(&mut self, url: &str) -> Result<LoadReport> {
        let collection = ingest::load_url(url, &self.store).await?;
        Ok(self.load_collection(collection, url).await)
    }

    /// Make a decoded collection the session's dataset.
    ///
    /// CRS problems and registration failures are logged, never returned.
    pub async fn load_collection(&mut self, collection: FeatureCollection, name: &str) -> LoadReport {
        let crs = self.resolver.detect(&collection);
        let collection = self.resolver.transform(collection, crs).await;
        self.source_crs = Some(crs);

        let original = Arc::new(collection);
        let shown = self.datasets.load_shared(Arc::clone(&original)).len();

        let registration = self.register(&original, name).await;
        info!(
            "Loaded {name}: {} features ({shown} shown), CRS {crs}",
            original.features.len()
        );
        self.render_current(false);

        LoadReport {
            name: name.to_string(),
            features: original.features.len(),
            shown,
            crs,
            registration,
        }
    }

    async fn register(
        &mut self,
        original: &FeatureCollection,
        name: &str,
    ) -> Option<RegistrationReport> {
        if !self.store.is_available() {
            debug!("No SQL engine; {name} is not registered");
            return None;
        }
        match self.store.register_collection(original).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!("Could not register {name} for SQL: {}", err.user_message());
                None
            },
        }
    }

    /// Change the feature cap, clearing any filter.
    pub fn change_limit(&mut self, limit: usize) -> Option<&CurrentView> {
        self.config.feature_limit = limit;
        self.datasets.change_limit(limit)?;
        self.render_current(true);
        self.datasets.current()
    }

    /// Run SQL against table `data` and show the joined result.
    ///
    /// # Errors
    ///
    /// [`QueryError::NoData`] without a dataset, otherwise the errors of
    /// [`TabularStore::run_query`]. The current view is unchanged on error.
    pub async fn run_sql(&mut self, sql: &str) -> Result<&CurrentView> {
        let original = self.datasets.original().cloned().ok_or(QueryError::NoData)?;
        let reconciled = self.store.run_query(sql, &original).await?;
        if reconciled.discarded > 0 {
            warn!(
                "{} result rows had no valid _rowid and were dropped",
                reconciled.discarded
            );
        }
        self.datasets.apply_sql(reconciled)?;
        self.render_current(true);
        Ok(self.datasets.current().ok_or(QueryError::NoData)?)
    }

    /// Show the original records matching `expression`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FilterSyntax`] or [`QueryError::NoData`]; the view is unchanged.
    pub fn run_filter(&mut self, expression: &str) -> Result<&CurrentView> {
        self.datasets.apply_filter(expression)?;
        self.render_current(true);
        Ok(self.datasets.current().ok_or(QueryError::NoData)?)
    }

    /// Drop the active filter and show the original under the feature limit.
    pub fn reset(&mut self) -> Option<&CurrentView> {
        self.datasets.reset()?;
        self.render_current(true);
        self.datasets.current()
    }

    /// Fit the map to the current view.
    pub fn fit_view(&self) -> Option<Bounds> {
        let bounds = Bounds::of(&self.datasets.current()?.collection)?;
        self.sink.fit_bounds(bounds);
        Some(bounds)
    }

    /// Color the map by `column`, or clear the styling with `None`.
    ///
    /// Returns the resulting scale; an unusable column clears it.
    pub fn set_color_column(&mut self, column: Option<&str>) -> Option<ColorScale> {
        self.color_column = column.map(str::to_string);
        let scale = self.color_scale();
        if scale.is_none() && column.is_some() {
            debug!("Column {column:?} cannot be colored");
            self.color_column = None;
        }
        self.publish_summary();
        scale
    }

    /// Scale of the selected color column over the current view.
    #[must_use]
    pub fn color_scale(&self) -> Option<ColorScale> {
        let column = self.color_column.as_deref()?;
        let view = self.datasets.current()?;
        ColorScale::for_column(&view.collection, &self.columns, column)
    }

    #[must_use]
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            total_features: self.datasets.original().map_or(0, |o| o.features.len()),
            shown_features: self.datasets.current().map_or(0, CurrentView::len),
            feature_limit: self.datasets.feature_limit(),
            source_crs: self.source_crs,
            filter: self.datasets.active_filter().clone(),
            columns: self.columns.clone(),
            legend: self
                .color_scale()
                .map(|scale| (scale.column().to_string(), scale.legend())),
            table: self.store.describe().cloned(),
        }
    }

    /// Write the current view into `dir` as GeoJSON.
    ///
    /// # Errors
    ///
    /// [`QueryError::NoData`] without a dataset, or the write error.
    pub fn export_current(&self, dir: &Path) -> Result<PathBuf> {
        let view = self.datasets.current().ok_or(QueryError::NoData)?;
        export_collection(&view.collection, dir, &self.config.product_name, Utc::now())
    }

    /// Wait for the latest render to finish.
    pub async fn wait_for_render(&mut self) -> Option<RenderOutcome> {
        self.renderer.wait().await
    }

    fn render_current(&mut self, preserve_view: bool) {
        let Some(view) = self.datasets.current() else {
            return;
        };
        let collection = Arc::clone(&view.collection);
        self.classify_columns(&collection);
        self.renderer
            .render(Arc::clone(&self.sink), collection, preserve_view);
        self.publish_summary();
    }

    /// Reclassify the attributes of the displayed records, dropping a color column that
    /// no longer exists or can no longer be colored.
    fn classify_columns(&mut self, current: &FeatureCollection) {
        self.columns = analyze(current, self.config.analysis_sample_size);
        if let Some(column) = self.color_column.as_deref()
            && !self.columns.is_numeric(column)
            && !self.columns.is_categorical(column)
        {
            debug!("Color column {column} is gone from the current view");
            self.color_column = None;
        }
    }

    fn publish_summary(&self) {
        self.sink.show_summary(&self.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ViewerError};
    use geojson::{Feature, Geometry, JsonObject, Value};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSink {
        fits: Mutex<Vec<Bounds>>,
        summaries: Mutex<Vec<DatasetSummary>>,
    }

    impl RenderSink for CountingSink {
        fn clear(&self) {}
        fn draw_chunk(&self, _features: &[geojson::Feature]) {}
        fn show_empty(&self, _message: &str) {}
        fn fit_bounds(&self, bounds: Bounds) {
            self.fits.lock().unwrap().push(bounds);
        }
        fn bounds(&self) -> Option<Bounds> {
            None
        }
        fn show_summary(&self, summary: &DatasetSummary) {
            self.summaries.lock().unwrap().push(summary.clone());
        }
    }

    fn cities() -> FeatureCollection {
        let rows = [
            ("Paris", 2.35, 48.85, 2_100_000, "FR"),
            ("Lyon", 4.84, 45.76, 513_000, "FR"),
            ("Berlin", 13.4, 52.52, 3_600_000, "DE"),
        ];
        FeatureCollection {
            bbox: None,
            features: rows
                .iter()
                .map(|(name, x, y, pop, country)| {
                    let mut properties = JsonObject::new();
                    properties.insert("name".to_string(), json!(name));
                    properties.insert("pop".to_string(), json!(pop));
                    properties.insert("country".to_string(), json!(country));
                    Feature {
                        bbox: None,
                        geometry: Some(Geometry::new(Value::Point(vec![*x, *y]))),
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }
                })
                .collect(),
            foreign_members: None,
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ViewerConfig::default().with_render_chunk_size(0);
        let err = ViewerSession::new(config, Arc::new(CountingSink::default())).unwrap_err();
        assert!(matches!(
            err,
            ViewerError::Config(ConfigError::InvalidOption { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_without_engine_still_renders() {
        let sink = Arc::new(CountingSink::default());
        let mut session = ViewerSession::new(ViewerConfig::default(), sink.clone()).unwrap();

        let report = session.load_collection(cities(), "cities").await;
        assert_eq!(report.features, 3);
        assert_eq!(report.crs, CrsId::Wgs84);
        assert!(report.registration.is_none());
        assert!(matches!(
            session.wait_for_render().await,
            Some(RenderOutcome::Completed { features: 3, .. })
        ));
        assert_eq!(sink.fits.lock().unwrap().len(), 1);

        let err = session.run_sql("pop > 1").await.unwrap_err();
        assert!(matches!(err, ViewerError::Engine(_)));
        assert_eq!(session.current().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_late_engine_registers_loaded_dataset() {
        let sink = Arc::new(CountingSink::default());
        let mut session = ViewerSession::new(ViewerConfig::default(), sink).unwrap();
        session.load_collection(cities(), "cities").await;
        assert!(session.summary().table.is_none());

        session.connect_engine().await.unwrap();
        assert_eq!(session.summary().table.unwrap().len(), 3);

        let mut ids = session.run_sql("country = 'FR'").await.unwrap().row_ids.clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_color_column_and_summary() {
        let sink = Arc::new(CountingSink::default());
        let mut session = ViewerSession::new(ViewerConfig::default(), sink.clone()).unwrap();
        session.load_collection(cities(), "cities").await;

        let scale = session.set_color_column(Some("country")).unwrap();
        assert!(matches!(scale, ColorScale::Categorical { .. }));
        assert!(session.set_color_column(Some("missing")).is_none());
        assert!(session.color_scale().is_none());

        session.set_color_column(Some("pop"));
        let summary = sink.summaries.lock().unwrap().last().cloned().unwrap();
        assert_eq!(summary.legend.unwrap().0, "pop");
        assert_eq!(summary.total_features, 3);
    }

    #[tokio::test]
    async fn test_columns_follow_current_view() {
        let sink = Arc::new(CountingSink::default());
        let mut session = ViewerSession::new(ViewerConfig::default(), sink.clone()).unwrap();
        session.connect_engine().await.unwrap();
        session.load_collection(cities(), "cities").await;
        session.set_color_column(Some("country"));
        assert!(session.columns().is_numeric("pop"));

        session
            .run_sql("SELECT _rowid, upper(name) AS shout FROM data")
            .await
            .unwrap();
        let names: Vec<_> = session.columns().all.iter().cloned().collect();
        assert_eq!(names, vec!["shout".to_string()]);
        assert!(session.columns().is_categorical("shout"));
        assert!(session.color_scale().is_none());
        assert!(session.set_color_column(Some("shout")).is_some());
        let summary = sink.summaries.lock().unwrap().last().cloned().unwrap();
        assert!(summary.columns.all.contains("shout"));

        session.reset().unwrap();
        assert!(session.columns().is_numeric("pop"));
        assert!(!session.columns().all.contains("shout"));

        session.run_filter("pop > 99999999").unwrap();
        assert!(session.columns().all.is_empty());

        session.change_limit(1).unwrap();
        assert_eq!(session.columns().all.len(), 3);
    }

    #[tokio::test]
    async fn test_load_analyzes_only_displayed_records() {
        let mut collection = cities();
        collection.features[2]
            .properties
            .as_mut()
            .unwrap()
            .insert("capital".to_string(), json!(true));
        let config = ViewerConfig::default().with_feature_limit(2);
        let mut session = ViewerSession::new(config, Arc::new(CountingSink::default())).unwrap();

        session.load_collection(collection, "cities").await;
        assert!(!session.columns().all.contains("capital"));

        session.change_limit(0).unwrap();
        assert!(session.columns().is_categorical("capital"));
    }

    #[tokio::test]
    async fn test_fit_view_uses_current_view() {
        let sink = Arc::new(CountingSink::default());
        let mut session = ViewerSession::new(ViewerConfig::default(), sink.clone()).unwrap();
        assert!(session.fit_view().is_none());

        session.load_collection(cities(), "cities").await;
        session.run_filter("country == 'DE'").unwrap();
        let bounds = session.fit_view().unwrap();
        assert_eq!((bounds.min_x, bounds.max_y), (13.4, 52.52));
    }
}
