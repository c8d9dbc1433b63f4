//! Chunked, cancellable rendering into a map sink.
//!
//! Every render runs as its own task and draws the collection in chunks, yielding to
//! the runtime in between. Starting a new render bumps a shared generation counter;
//! a task whose generation is stale stops before drawing its next chunk.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use geojson::{Feature, FeatureCollection, Position, Value};
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::analyzer::ColumnClasses;
use crate::crs::CrsId;
use crate::dataset::ActiveFilter;
use crate::store::TableSchema;
use crate::style::LegendEntry;

/// Message shown when there is nothing to draw.
pub const NO_FEATURES_MESSAGE: &str = "No features to render";

/// Longitude/latitude envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Envelope of every position in the collection, `None` without coordinates.
    #[must_use]
    pub fn of(collection: &FeatureCollection) -> Option<Self> {
        let mut bounds: Option<Self> = None;
        let mut extend = |position: &Position| {
            let (x, y) = (position[0], position[1]);
            if !x.is_finite() || !y.is_finite() {
                return;
            }
            bounds = Some(match bounds {
                Some(b) => Self {
                    min_x: b.min_x.min(x),
                    min_y: b.min_y.min(y),
                    max_x: b.max_x.max(x),
                    max_y: b.max_y.max(y),
                },
                None => Self {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
            });
        };

        for geometry in collection
            .features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref())
        {
            visit_positions(&geometry.value, &mut extend);
        }
        bounds
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

fn visit_positions(value: &Value, f: &mut impl FnMut(&Position)) {
    let mut visit = |position: &Position| {
        if position.len() >= 2 {
            f(position);
        }
    };
    match value {
        Value::Point(position) => visit(position),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter().for_each(visit);
        },
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().flatten().for_each(visit);
        },
        Value::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(visit),
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                visit_positions(&geometry.value, f);
            }
        },
    }
}

/// What the status, table and legend widgets are told after a dataset change.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    /// Features in the original dataset
    pub total_features: usize,
    pub shown_features: usize,
    pub feature_limit: usize,
    /// CRS the data was loaded in
    pub source_crs: Option<CrsId>,
    pub filter: ActiveFilter,
    pub columns: ColumnClasses,
    /// Column and legend of the active color scale
    pub legend: Option<(String, Vec<LegendEntry>)>,
    /// Columns of the SQL table, `None` when nothing is registered
    pub table: Option<TableSchema>,
}

/// The map widget.
pub trait RenderSink: Send + Sync {
    /// Remove every drawn feature.
    fn clear(&self);

    /// Draw one chunk of features on top of what is already drawn.
    fn draw_chunk(&self, features: &[Feature]);

    /// Show a placeholder message instead of data.
    fn show_empty(&self, message: &str);

    /// Move the camera to the given envelope.
    fn fit_bounds(&self, bounds: Bounds);

    /// Envelope of what is currently drawn.
    fn bounds(&self) -> Option<Bounds>;

    /// Receive the summary for status, table and legend widgets.
    fn show_summary(&self, _summary: &DatasetSummary) {}
}

/// How a render task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed { features: usize, chunks: usize },
    Empty,
    /// A newer render started; `chunks` were drawn before stopping
    Superseded { chunks: usize },
}

/// Invalidates in-flight renders from outside the controller.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicU64>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawns render tasks and supersedes stale ones.
#[derive(Debug)]
pub struct RenderController {
    generation: Arc<AtomicU64>,
    chunk_size: usize,
    latest: Option<JoinHandle<RenderOutcome>>,
}

impl RenderController {
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            chunk_size: chunk_size.max(1),
            latest: None,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.generation))
    }

    /// Start rendering `collection`, superseding any render in flight.
    ///
    /// Must be called from within a Tokio runtime. Unless `preserve_view` is set, the
    /// camera is fitted to the collection after the last chunk.
    pub fn render(
        &mut self,
        sink: Arc<dyn RenderSink>,
        collection: Arc<FeatureCollection>,
        preserve_view: bool,
    ) {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let chunk_size = self.chunk_size;

        let task = async move {
            let is_current = || generation.load(Ordering::SeqCst) == token;
            if !is_current() {
                return RenderOutcome::Superseded { chunks: 0 };
            }

            sink.clear();
            if collection.features.is_empty() {
                sink.show_empty(NO_FEATURES_MESSAGE);
                return RenderOutcome::Empty;
            }

            let mut chunks = 0;
            for chunk in collection.features.chunks(chunk_size) {
                if !is_current() {
                    debug!("Render {token} superseded after {chunks} chunks");
                    return RenderOutcome::Superseded { chunks };
                }
                sink.draw_chunk(chunk);
                chunks += 1;
                tokio::task::yield_now().await;
            }

            if !is_current() {
                return RenderOutcome::Superseded { chunks };
            }
            if !preserve_view && let Some(bounds) = Bounds::of(&collection) {
                sink.fit_bounds(bounds);
            }
            RenderOutcome::Completed {
                features: collection.features.len(),
                chunks,
            }
        };

        self.latest = Some(tokio::spawn(task));
    }

    /// Wait for the most recent render to finish.
    pub async fn wait(&mut self) -> Option<RenderOutcome> {
        let handle = self.latest.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!("Render task failed: {err}");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::Geometry;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Clear,
        Draw(usize),
        Empty(String),
        Fit(Bounds),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Call>>,
        cancel_after: Mutex<Option<(usize, CancelHandle)>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RenderSink for RecordingSink {
        fn clear(&self) {
            self.calls.lock().unwrap().push(Call::Clear);
        }

        fn draw_chunk(&self, features: &[Feature]) {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Draw(features.len()));
            let drawn = calls.iter().filter(|c| matches!(c, Call::Draw(_))).count();
            if let Some((after, handle)) = self.cancel_after.lock().unwrap().as_ref()
                && drawn == *after
            {
                handle.cancel();
            }
        }

        fn show_empty(&self, message: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Empty(message.to_string()));
        }

        fn fit_bounds(&self, bounds: Bounds) {
            self.calls.lock().unwrap().push(Call::Fit(bounds));
        }

        fn bounds(&self) -> Option<Bounds> {
            None
        }
    }

    fn points(n: usize) -> Arc<FeatureCollection> {
        Arc::new(FeatureCollection {
            bbox: None,
            features: (0..n)
                .map(|i| Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![i as f64, -(i as f64)]))),
                    id: None,
                    properties: None,
                    foreign_members: None,
                })
                .collect(),
            foreign_members: None,
        })
    }

    #[test]
    fn test_bounds_of_nested_geometries() {
        let collection = FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::GeometryCollection(vec![
                    Geometry::new(Value::Point(vec![1.0, 5.0])),
                    Geometry::new(Value::Polygon(vec![vec![
                        vec![-3.0, 2.0],
                        vec![4.0, -1.0, 100.0],
                    ]])),
                ]))),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        };

        let bounds = Bounds::of(&collection).unwrap();
        assert_eq!(
            bounds,
            Bounds {
                min_x: -3.0,
                min_y: -1.0,
                max_x: 4.0,
                max_y: 5.0
            }
        );
        assert_eq!(bounds.center(), (0.5, 2.0));
        assert!(Bounds::of(&points(0)).is_none());
    }

    #[tokio::test]
    async fn test_render_in_chunks_then_fit() {
        let sink = Arc::new(RecordingSink::default());
        let mut controller = RenderController::new(2);

        controller.render(sink.clone(), points(5), false);
        let outcome = controller.wait().await.unwrap();

        assert_eq!(outcome, RenderOutcome::Completed {
            features: 5,
            chunks: 3
        });
        let calls = sink.calls();
        assert_eq!(calls[..4], [
            Call::Clear,
            Call::Draw(2),
            Call::Draw(2),
            Call::Draw(1)
        ]);
        assert!(matches!(calls[4], Call::Fit(_)));
    }

    #[tokio::test]
    async fn test_preserve_view_skips_fit() {
        let sink = Arc::new(RecordingSink::default());
        let mut controller = RenderController::new(10);

        controller.render(sink.clone(), points(3), true);
        controller.wait().await.unwrap();
        assert!(!sink.calls().iter().any(|c| matches!(c, Call::Fit(_))));
    }

    #[tokio::test]
    async fn test_empty_collection_shows_message() {
        let sink = Arc::new(RecordingSink::default());
        let mut controller = RenderController::new(10);

        controller.render(sink.clone(), points(0), false);
        assert_eq!(controller.wait().await, Some(RenderOutcome::Empty));
        assert_eq!(sink.calls(), vec![
            Call::Clear,
            Call::Empty(NO_FEATURES_MESSAGE.to_string())
        ]);
    }

    #[tokio::test]
    async fn test_new_render_supersedes_pending_one() {
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());
        let mut controller = RenderController::new(1);

        controller.render(first.clone(), points(4), false);
        controller.render(second.clone(), points(2), false);
        let outcome = controller.wait().await.unwrap();

        assert_eq!(outcome, RenderOutcome::Completed {
            features: 2,
            chunks: 2
        });
        tokio::task::yield_now().await;
        assert!(
            !first
                .calls()
                .iter()
                .any(|c| matches!(c, Call::Draw(_) | Call::Fit(_)))
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_between_chunks() {
        let sink = Arc::new(RecordingSink::default());
        let mut controller = RenderController::new(1);
        *sink.cancel_after.lock().unwrap() = Some((2, controller.cancel_handle()));

        controller.render(sink.clone(), points(5), false);
        let outcome = controller.wait().await.unwrap();

        assert_eq!(outcome, RenderOutcome::Superseded { chunks: 2 });
        let draws = sink
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Draw(_)))
            .count();
        assert_eq!(draws, 2);
    }
}
