//! Terminal stand-in for the map widget.
//!
//! Nothing is drawn; the sink counts what would be drawn, keeps the camera envelope and
//! the latest summary so the commands can report them.

use std::sync::Mutex;

use geojson::Feature;
use tracing::debug;

use geolens_core::render::{Bounds, DatasetSummary, RenderSink};

#[derive(Debug, Default)]
struct MapState {
    drawn: usize,
    chunks: usize,
    camera: Option<Bounds>,
    placeholder: Option<String>,
    summary: Option<DatasetSummary>,
}

/// Records render calls for the CLI.
#[derive(Debug, Default)]
pub struct TerminalSink {
    state: Mutex<MapState>,
}

impl TerminalSink {
    fn with_state<T>(&self, f: impl FnOnce(&mut MapState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }

    /// Features drawn since the last clear.
    pub fn drawn(&self) -> usize {
        self.with_state(|s| s.drawn)
    }

    /// Placeholder shown instead of data, if any.
    pub fn placeholder(&self) -> Option<String> {
        self.with_state(|s| s.placeholder.clone())
    }

    pub fn summary(&self) -> Option<DatasetSummary> {
        self.with_state(|s| s.summary.clone())
    }
}

impl RenderSink for TerminalSink {
    fn clear(&self) {
        self.with_state(|s| {
            s.drawn = 0;
            s.chunks = 0;
            s.placeholder = None;
        });
    }

    fn draw_chunk(&self, features: &[Feature]) {
        self.with_state(|s| {
            s.drawn += features.len();
            s.chunks += 1;
            debug!("Chunk {}: {} features", s.chunks, features.len());
        });
    }

    fn show_empty(&self, message: &str) {
        self.with_state(|s| s.placeholder = Some(message.to_string()));
    }

    fn fit_bounds(&self, bounds: Bounds) {
        debug!(
            "Camera fitted to [{}, {}, {}, {}]",
            bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
        );
        self.with_state(|s| s.camera = Some(bounds));
    }

    fn bounds(&self) -> Option<Bounds> {
        self.with_state(|s| s.camera)
    }

    fn show_summary(&self, summary: &DatasetSummary) {
        self.with_state(|s| s.summary = Some(summary.clone()));
    }
}
