//! Attribute classification for styling and the query UI.

use std::collections::BTreeSet;

use geojson::{FeatureCollection, JsonValue};

/// Attribute names of a dataset split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnClasses {
    pub all: BTreeSet<String>,
    pub numeric: BTreeSet<String>,
    pub categorical: BTreeSet<String>,
}

impl ColumnClasses {
    #[must_use]
    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric.contains(column)
    }

    #[must_use]
    pub fn is_categorical(&self, column: &str) -> bool {
        self.categorical.contains(column)
    }
}

/// Classify the attributes of the first `sample_size` records.
///
/// A column holding a finite number in any sampled record is numeric and never
/// categorical, even when other records hold strings.
#[must_use]
pub fn analyze(collection: &FeatureCollection, sample_size: usize) -> ColumnClasses {
    let mut classes = ColumnClasses::default();

    let sampled = collection
        .features
        .iter()
        .take(sample_size)
        .filter_map(|feature| feature.properties.as_ref());
    for properties in sampled {
        for (key, value) in properties {
            classes.all.insert(key.clone());
            match value {
                JsonValue::Number(n) if n.as_f64().is_some_and(f64::is_finite) => {
                    classes.numeric.insert(key.clone());
                },
                JsonValue::String(_) | JsonValue::Bool(_) => {
                    classes.categorical.insert(key.clone());
                },
                _ => {},
            }
        }
    }

    classes.categorical.retain(|key| !classes.numeric.contains(key));
    classes
}
