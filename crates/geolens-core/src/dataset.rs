//! Original and displayed datasets.
//!
//! `original` is the full collection after CRS correction and is only replaced by
//! [`DatasetManager::load`]. Everything the map shows is derived from it: the feature
//! limit, ad-hoc filters and SQL results each produce a new current view.

use std::fmt;
use std::sync::Arc;

use geojson::FeatureCollection;
use log::debug;

use crate::error::QueryError;
use crate::filter::FilterExpr;
use crate::store::ReconciledCollection;

/// Filter responsible for the current view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveFilter {
    #[default]
    None,
    AdHoc(String),
    Sql(String),
}

impl fmt::Display for ActiveFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::AdHoc(expr) => write!(f, "filter: {expr}"),
            Self::Sql(sql) => write!(f, "sql: {sql}"),
        }
    }
}

/// The displayed dataset and where each of its records comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentView {
    pub collection: Arc<FeatureCollection>,
    /// Index into the original features of each displayed feature
    pub row_ids: Vec<usize>,
    pub filter: ActiveFilter,
}

impl CurrentView {
    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.features.is_empty()
    }
}

/// Keeps the original and current datasets consistent.
#[derive(Debug, Clone, Default)]
pub struct DatasetManager {
    original: Option<Arc<FeatureCollection>>,
    current: Option<CurrentView>,
    feature_limit: usize,
}

impl DatasetManager {
    /// Manager with a displayed feature cap (0 for unlimited).
    #[must_use]
    pub fn new(feature_limit: usize) -> Self {
        Self {
            feature_limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn original(&self) -> Option<&Arc<FeatureCollection>> {
        self.original.as_ref()
    }

    #[must_use]
    pub fn current(&self) -> Option<&CurrentView> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn feature_limit(&self) -> usize {
        self.feature_limit
    }

    #[must_use]
    pub fn active_filter(&self) -> &ActiveFilter {
        self.current
            .as_ref()
            .map_or(&ActiveFilter::None, |view| &view.filter)
    }

    /// Replace the original dataset and show its first `feature_limit` records.
    pub fn load(&mut self, collection: FeatureCollection) -> &CurrentView {
        self.load_shared(Arc::new(collection))
    }

    /// [`Self::load`] for a collection that is already shared.
    pub fn load_shared(&mut self, original: Arc<FeatureCollection>) -> &CurrentView {
        let view = limited_view(&original, self.feature_limit);
        self.original = Some(original);
        self.current.insert(view)
    }

    /// Change the feature cap and recompute the current view from the original.
    ///
    /// Any active filter is cleared. Only the limit is stored when nothing is loaded.
    pub fn change_limit(&mut self, limit: usize) -> Option<&CurrentView> {
        self.feature_limit = limit;
        self.reset()
    }

    /// Show the records of a SQL result.
    ///
    /// Results are not capped by the feature limit.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoData`] when nothing is loaded.
    pub fn apply_sql(&mut self, reconciled: ReconciledCollection) -> Result<&CurrentView, QueryError> {
        if self.original.is_none() {
            return Err(QueryError::NoData);
        }
        Ok(&*self.current.insert(CurrentView {
            collection: Arc::new(reconciled.collection),
            row_ids: reconciled.row_ids,
            filter: ActiveFilter::Sql(reconciled.sql),
        }))
    }

    /// Show the original records matching an ad-hoc filter expression.
    ///
    /// A filter matching nothing produces an empty view, not an error.
    ///
    /// # Errors
    ///
    /// [`QueryError::FilterSyntax`] for malformed expressions, [`QueryError::NoData`]
    /// when nothing is loaded. The current view is unchanged on error.
    pub fn apply_filter(&mut self, expression: &str) -> Result<&CurrentView, QueryError> {
        let filter: FilterExpr = expression.parse()?;
        let original = self.original.as_ref().ok_or(QueryError::NoData)?;

        let (row_ids, features): (Vec<usize>, Vec<_>) = original
            .features
            .iter()
            .enumerate()
            .filter(|(_, feature)| filter.matches(feature))
            .map(|(id, feature)| (id, feature.clone()))
            .unzip();
        debug!("Filter '{filter}' matched {} features", features.len());

        Ok(&*self.current.insert(CurrentView {
            collection: Arc::new(FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            }),
            row_ids,
            filter: ActiveFilter::AdHoc(expression.trim().to_string()),
        }))
    }

    /// Clear the active filter and show the original under the current feature limit.
    pub fn reset(&mut self) -> Option<&CurrentView> {
        let original = self.original.as_ref()?;
        let view = limited_view(original, self.feature_limit);
        Some(&*self.current.insert(view))
    }
}

fn limited_view(original: &Arc<FeatureCollection>, limit: usize) -> CurrentView {
    let total = original.features.len();
    if limit == 0 || total <= limit {
        return CurrentView {
            collection: Arc::clone(original),
            row_ids: (0..total).collect(),
            filter: ActiveFilter::None,
        };
    }

    debug!("Showing the first {limit} of {total} features");
    CurrentView {
        collection: Arc::new(FeatureCollection {
            bbox: None,
            features: original.features[..limit].to_vec(),
            foreign_members: None,
        }),
        row_ids: (0..limit).collect(),
        filter: ActiveFilter::None,
    }
}
