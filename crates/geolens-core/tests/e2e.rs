use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use datafusion::dataframe::DataFrameWriteOptions;
use datafusion_shared::batches_to_rows;
use geojson::{Feature, FeatureCollection, GeoJson, Value};
use geolens_core::crs::CrsId;
use geolens_core::dataset::ActiveFilter;
use geolens_core::error::QueryError;
use geolens_core::render::{Bounds, DatasetSummary, NO_FEATURES_MESSAGE, RenderOutcome, RenderSink};
use geolens_core::store::DataFusionEngine;
use geolens_core::{ViewerConfig, ViewerError, ViewerSession};
use tempfile::TempDir;

#[derive(Default)]
struct MapRecorder {
    drawn: Mutex<Vec<Feature>>,
    messages: Mutex<Vec<String>>,
    fitted: Mutex<Vec<Bounds>>,
    summaries: Mutex<Vec<DatasetSummary>>,
}

impl RenderSink for MapRecorder {
    fn clear(&self) {
        self.drawn.lock().unwrap().clear();
    }

    fn draw_chunk(&self, features: &[Feature]) {
        self.drawn.lock().unwrap().extend_from_slice(features);
    }

    fn show_empty(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn fit_bounds(&self, bounds: Bounds) {
        self.fitted.lock().unwrap().push(bounds);
    }

    fn bounds(&self) -> Option<Bounds> {
        self.fitted.lock().unwrap().last().copied()
    }

    fn show_summary(&self, summary: &DatasetSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

const PARIS: &str = r#"{"type":"FeatureCollection","features":[
    {"type":"Feature","properties":{"pop":1200000,"country":"FR"},
     "geometry":{"type":"Point","coordinates":[2.35,48.85]}}
]}"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn numbered_points(n: usize) -> String {
    let features: Vec<String> = (0..n)
        .map(|i| {
            format!(
                r#"{{"type":"Feature","properties":{{"idx":{i},"name":"p{i}","is_even":{}}},
                   "geometry":{{"type":"Point","coordinates":[{}.5,{}.25]}}}}"#,
                i % 2 == 0,
                i,
                -(i as i64)
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

async fn session_with_engine(config: ViewerConfig) -> (ViewerSession, Arc<MapRecorder>) {
    let sink = Arc::new(MapRecorder::default());
    let mut session = ViewerSession::new(config, sink.clone()).unwrap();
    session.connect_engine().await.unwrap();
    (session, sink)
}

/// The single-city example: canonical CRS, column classes and both filters.
#[tokio::test]
async fn test_paris_example() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "paris.geojson", PARIS);
    let (mut session, sink) = session_with_engine(ViewerConfig::default()).await;

    let report = session.load_path(&path).await.unwrap();
    assert_eq!(report.crs, CrsId::Wgs84);
    assert_eq!(report.name, "paris.geojson");

    let decoded: FeatureCollection = PARIS.parse::<GeoJson>().unwrap().try_into().unwrap();
    assert_eq!(**session.datasets().original().unwrap(), decoded);

    let columns = session.columns();
    assert_eq!(columns.numeric.iter().collect::<Vec<_>>(), vec!["pop"]);
    assert_eq!(columns.categorical.iter().collect::<Vec<_>>(), vec!["country"]);

    assert_eq!(session.run_filter("pop > 1000000").unwrap().len(), 1);
    let view = session.run_filter("country == 'DE'").unwrap();
    assert!(view.is_empty());

    session.wait_for_render().await;
    assert_eq!(sink.messages.lock().unwrap().as_slice(), [NO_FEATURES_MESSAGE]);
}

/// Loading under a limit shows exactly the first N records in order.
#[tokio::test]
async fn test_feature_limit_prefix() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "points.json", &numbered_points(25));
    let config = ViewerConfig::default()
        .with_feature_limit(10)
        .with_render_chunk_size(3);
    let (mut session, sink) = session_with_engine(config).await;

    let report = session.load_path(&path).await.unwrap();
    assert_eq!((report.features, report.shown), (25, 10));

    let original = session.datasets().original().unwrap().clone();
    let current = session.current().unwrap();
    assert_eq!(current.collection.features[..], original.features[..10]);

    assert_eq!(
        session.wait_for_render().await,
        Some(RenderOutcome::Completed {
            features: 10,
            chunks: 4
        })
    );
    assert_eq!(sink.drawn.lock().unwrap().len(), 10);

    let summary = sink.summaries.lock().unwrap().last().cloned().unwrap();
    assert_eq!(summary.total_features, 25);
    assert_eq!(summary.shown_features, 10);
    assert_eq!(summary.feature_limit, 10);
}

/// Every SQL result keeps its original geometry and takes its properties from the row.
#[tokio::test]
async fn test_sql_results_join_back_to_geometries() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "points.geojson", &numbered_points(12));
    let (mut session, _sink) = session_with_engine(ViewerConfig::default().with_feature_limit(5)).await;
    session.load_path(&path).await.unwrap();
    let original = session.datasets().original().unwrap().clone();

    let view = session
        .run_sql("SELECT * FROM data WHERE idx >= 3 AND is_even = true")
        .await
        .unwrap()
        .clone();

    let mut ids = view.row_ids.clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![4, 6, 8, 10]);
    assert_eq!(view.filter, ActiveFilter::Sql("SELECT * FROM data WHERE idx >= 3 AND is_even = true".to_string()));

    for (feature, &id) in view.collection.features.iter().zip(&view.row_ids) {
        assert_eq!(feature.geometry, original.features[id].geometry);
        let properties = feature.properties.as_ref().unwrap();
        let mut keys: Vec<_> = properties.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["idx", "is_even", "name"]);
        assert_eq!(properties["name"], format!("p{id}"));
        assert_eq!(properties["idx"].as_f64(), Some(id as f64));
    }
}

/// Projections without `_rowid` cannot be mapped and leave the view alone.
#[tokio::test]
async fn test_query_without_row_identity() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "points.geojson", &numbered_points(4));
    let (mut session, _sink) = session_with_engine(ViewerConfig::default()).await;
    session.load_path(&path).await.unwrap();

    let err = session.run_sql("SELECT name FROM data").await.unwrap_err();
    assert!(matches!(err, ViewerError::Query(QueryError::NoRowIdentity)));
    let err = session.run_sql("idx > 100").await.unwrap_err();
    assert!(matches!(err, ViewerError::Query(QueryError::EmptyResult)));
    let err = session.run_sql("SELECT nope FROM data").await.unwrap_err();
    assert!(matches!(err, ViewerError::Query(QueryError::Engine { .. })));

    assert_eq!(session.current().unwrap().len(), 4);
    assert_eq!(session.datasets().active_filter(), &ActiveFilter::None);
}

/// Reloading replaces the table instead of appending to it.
#[tokio::test]
async fn test_reload_replaces_table() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "points.geojson", &numbered_points(7));
    let (mut session, _sink) = session_with_engine(ViewerConfig::default()).await;

    session.load_path(&path).await.unwrap();
    let report = session.load_path(&path).await.unwrap();
    let registration = report.registration.unwrap();
    assert_eq!(registration.inserted, 7);
    assert!(registration.verified);

    let engine = session.store().engine().unwrap();
    let batches = engine
        .execute("SELECT COUNT(*) AS n FROM data")
        .await
        .unwrap();
    let rows = batches_to_rows(&batches, &[]);
    assert_eq!(rows[0]["n"], 7);
}

/// An empty collection registers nothing and renders the placeholder.
#[tokio::test]
async fn test_empty_dataset() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "empty.geojson",
        r#"{"type":"FeatureCollection","features":[]}"#,
    );
    let (mut session, sink) = session_with_engine(ViewerConfig::default()).await;

    let report = session.load_path(&path).await.unwrap();
    let registration = report.registration.unwrap();
    assert_eq!(registration.inserted, 0);
    assert_eq!(session.wait_for_render().await, Some(RenderOutcome::Empty));
    assert_eq!(sink.messages.lock().unwrap().as_slice(), [NO_FEATURES_MESSAGE]);
    assert!(session.store().describe().is_none());
}

/// Web Mercator input is reprojected to lon/lat and keeps its z values.
#[tokio::test]
async fn test_web_mercator_is_reprojected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "mercator.geojson",
        r#"{"type":"FeatureCollection",
            "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::3857"}},
            "features":[
              {"type":"Feature","properties":{"z":1},"geometry":{"type":"Point","coordinates":[0.0,0.0,12.5]}},
              {"type":"Feature","properties":{"z":2},"geometry":{"type":"LineString","coordinates":[[20037508.34,0.0,3.0],[0.0,0.0,4.0]]}}
            ]}"#,
    );
    let (mut session, _sink) = session_with_engine(ViewerConfig::default()).await;

    let report = session.load_path(&path).await.unwrap();
    assert_eq!(report.crs, CrsId::WebMercator);

    let original = session.datasets().original().unwrap();
    let Some(Value::Point(point)) = original.features[0].geometry.as_ref().map(|g| &g.value) else {
        panic!("expected a point");
    };
    assert!(point[0].abs() < 1e-9 && point[1].abs() < 1e-9);
    assert_eq!(point[2], 12.5);

    let Some(Value::LineString(line)) = original.features[1].geometry.as_ref().map(|g| &g.value) else {
        panic!("expected a line");
    };
    assert!((line[0][0] - 180.0).abs() < 1e-6);
    assert_eq!((line[0][2], line[1][2]), (3.0, 4.0));
    assert!(original.foreign_members.is_none());
}

/// Parquet files are scanned by the engine and decoded from their geometry column.
#[tokio::test]
async fn test_load_parquet_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cities.parquet");
    let engine = DataFusionEngine::minimal();
    engine
        .context()
        .sql(
            "SELECT column1 AS name, column2 AS pop, column3 AS geom FROM (VALUES \
             ('Paris', 2100000, 'POINT(2.35 48.85)'), ('Berlin', 3600000, 'POINT(13.4 52.52)'))",
        )
        .await
        .unwrap()
        .write_parquet(path.to_str().unwrap(), DataFrameWriteOptions::new(), None)
        .await
        .unwrap();

    let (mut session, _sink) = session_with_engine(ViewerConfig::default()).await;
    let report = session.load_path(&path).await.unwrap();
    assert_eq!(report.features, 2);

    let mut ids = session
        .run_sql("SELECT _rowid, name FROM data WHERE pop > 3000000")
        .await
        .unwrap()
        .row_ids
        .clone();
    ids.sort_unstable();
    assert_eq!(ids.len(), 1);
    let original = session.datasets().original().unwrap();
    assert_eq!(original.features[ids[0]].property("name").unwrap(), "Berlin");
}

/// Reset is idempotent and export writes the current view.
#[tokio::test]
async fn test_reset_and_export() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "points.geojson", &numbered_points(6));
    let (mut session, _sink) = session_with_engine(ViewerConfig::default().with_product_name("atlas")).await;
    session.load_path(&path).await.unwrap();

    session.run_filter("is_even == true").unwrap();
    let exported = session.export_current(dir.path()).unwrap();
    let name = exported.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("atlas-export-") && name.ends_with(".geojson"));
    let written: FeatureCollection = fs::read_to_string(&exported)
        .unwrap()
        .parse::<GeoJson>()
        .unwrap()
        .try_into()
        .unwrap();
    assert_eq!(written.features.len(), 3);

    let once = session.reset().cloned().unwrap();
    let twice = session.reset().cloned().unwrap();
    assert_eq!(once, twice);
    assert_eq!(once.len(), 6);
}

/// Unsupported input aborts the load and keeps the previous dataset.
#[tokio::test]
async fn test_failed_load_keeps_previous_dataset() {
    let dir = TempDir::new().unwrap();
    let good = write(&dir, "paris.geojson", PARIS);
    let bad = write(&dir, "broken.geojson", "{\"type\": \"FeatureCollection\", \"features\": [");
    let (mut session, _sink) = session_with_engine(ViewerConfig::default()).await;
    session.load_path(&good).await.unwrap();

    let err = session.load_path(&bad).await.unwrap_err();
    assert!(!err.is_recoverable());
    assert!(err.user_message().contains("broken.geojson"));

    let err = session.load_path(&dir.path().join("layer.gdb")).await.unwrap_err();
    assert!(err.recovery_suggestion().is_some());
    assert_eq!(session.datasets().original().unwrap().features.len(), 1);
}
