//! Mapping SQL result rows back onto the geometries of the original dataset.

use datafusion_shared::JsonRow;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use log::debug;

use super::ROW_ID_COLUMN;
use crate::error::QueryError;

/// One SQL result row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow(JsonRow);

impl ResultRow {
    #[must_use]
    pub fn new(row: JsonRow) -> Self {
        Self(row)
    }

    /// The `_rowid` of the row, when it is a valid index into a dataset of `len` records.
    ///
    /// Integral floats are accepted; absent, fractional, negative, textual or
    /// out-of-range values are not.
    #[must_use]
    pub fn row_id(&self, len: usize) -> Option<usize> {
        let id = match self.0.get(ROW_ID_COLUMN)? {
            JsonValue::Number(n) => {
                if let Some(id) = n.as_u64() {
                    usize::try_from(id).ok()?
                } else {
                    let value = n.as_f64()?;
                    if value.fract() != 0.0 || value < 0.0 || value >= len as f64 {
                        return None;
                    }
                    value as usize
                }
            },
            _ => return None,
        };
        (id < len).then_some(id)
    }

    /// Every column except `_rowid`.
    #[must_use]
    pub fn into_properties(mut self) -> JsonObject {
        self.0.remove(ROW_ID_COLUMN);
        self.0
    }
}

/// A query result joined back to geometries.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledCollection {
    /// The SQL text that was executed
    pub sql: String,
    pub collection: FeatureCollection,
    /// `_rowid` of every feature, in result order
    pub row_ids: Vec<usize>,
    /// Result rows that could not be mapped
    pub discarded: usize,
}

/// Build features from result rows.
///
/// Each surviving row keeps the geometry of `original.features[_rowid]` and takes the
/// row's other columns as its properties.
///
/// # Errors
///
/// [`QueryError::EmptyResult`] when there are no rows, [`QueryError::NoRowIdentity`]
/// when none of them maps to a record.
pub fn reconcile(
    sql: &str,
    rows: Vec<JsonRow>,
    original: &FeatureCollection,
) -> Result<ReconciledCollection, QueryError> {
    if rows.is_empty() {
        return Err(QueryError::EmptyResult);
    }

    let total = rows.len();
    let mut features = Vec::with_capacity(total);
    let mut row_ids = Vec::with_capacity(total);

    for row in rows.into_iter().map(ResultRow::new) {
        let Some(id) = row.row_id(original.features.len()) else {
            continue;
        };
        let source = &original.features[id];
        features.push(Feature {
            bbox: None,
            geometry: source.geometry.clone(),
            id: source.id.clone(),
            properties: Some(row.into_properties()),
            foreign_members: None,
        });
        row_ids.push(id);
    }

    if features.is_empty() {
        return Err(QueryError::NoRowIdentity);
    }
    let discarded = total - features.len();
    if discarded > 0 {
        debug!("Discarded {discarded} of {total} result rows without a valid _rowid");
    }

    Ok(ReconciledCollection {
        sql: sql.to_string(),
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        row_ids,
        discarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Geometry, Value};
    use serde_json::json;

    fn row(value: JsonValue) -> JsonRow {
        serde_json::from_value(value).unwrap()
    }

    fn original() -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: (0..3)
                .map(|i| Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![f64::from(i), 0.0]))),
                    id: None,
                    properties: Some(row(json!({"name": format!("f{i}")}))),
                    foreign_members: None,
                })
                .collect(),
            foreign_members: None,
        }
    }

    #[test]
    fn test_row_id_extraction() {
        assert_eq!(ResultRow::new(row(json!({"_rowid": 2}))).row_id(3), Some(2));
        assert_eq!(ResultRow::new(row(json!({"_rowid": 1.0}))).row_id(3), Some(1));
        assert_eq!(ResultRow::new(row(json!({"_rowid": 3}))).row_id(3), None);
        assert_eq!(ResultRow::new(row(json!({"_rowid": -1}))).row_id(3), None);
        assert_eq!(ResultRow::new(row(json!({"_rowid": 1.5}))).row_id(3), None);
        assert_eq!(ResultRow::new(row(json!({"_rowid": "1"}))).row_id(3), None);
        assert_eq!(ResultRow::new(row(json!({"_rowid": null}))).row_id(3), None);
        assert_eq!(ResultRow::new(row(json!({"id": 1}))).row_id(3), None);
    }

    #[test]
    fn test_geometry_from_original_properties_from_row() {
        let original = original();
        let rows = vec![
            row(json!({"_rowid": 2, "label": "two", "doubled": 4})),
            row(json!({"_rowid": 0, "label": "zero", "doubled": 0})),
        ];

        let reconciled = reconcile("SELECT ...", rows, &original).unwrap();
        assert_eq!(reconciled.row_ids, vec![2, 0]);
        assert_eq!(reconciled.discarded, 0);
        let first = &reconciled.collection.features[0];
        assert_eq!(first.geometry, original.features[2].geometry);
        assert_eq!(
            first.properties,
            Some(row(json!({"label": "two", "doubled": 4})))
        );
    }

    #[test]
    fn test_invalid_rows_are_discarded() {
        let rows = vec![
            row(json!({"_rowid": 1, "x": 1})),
            row(json!({"_rowid": 99, "x": 2})),
            row(json!({"x": 3})),
        ];
        let reconciled = reconcile("q", rows, &original()).unwrap();
        assert_eq!(reconciled.row_ids, vec![1]);
        assert_eq!(reconciled.discarded, 2);
    }

    #[test]
    fn test_empty_and_unmappable_results() {
        assert!(matches!(
            reconcile("q", vec![], &original()),
            Err(QueryError::EmptyResult)
        ));
        assert!(matches!(
            reconcile("q", vec![row(json!({"name": "f1"}))], &original()),
            Err(QueryError::NoRowIdentity)
        ));
    }
}
