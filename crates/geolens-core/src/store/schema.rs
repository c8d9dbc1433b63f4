//! SQL schema inference for feature attributes.

use std::collections::HashSet;
use std::fmt;

use geojson::{FeatureCollection, JsonValue};
use log::debug;

use super::literal::quote_identifier;
use super::{ROW_ID_COLUMN, TABLE_NAME};
use crate::error::RegistrationError;

/// SQL type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Double,
    Boolean,
    Varchar,
}

impl ColumnType {
    #[must_use]
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Double => "DOUBLE",
            Self::Boolean => "BOOLEAN",
            Self::Varchar => "VARCHAR",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// Attribute columns of the registered table, `_rowid` excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Infer one column per attribute name.
    ///
    /// Types come from the first `sample_size` records: `DOUBLE` when every non-null
    /// sampled value is a finite number, `BOOLEAN` when every one is a boolean,
    /// `VARCHAR` otherwise (including columns without any sampled value).
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NoColumns`] when no usable attribute name exists.
    pub fn infer(
        collection: &FeatureCollection,
        sample_size: usize,
    ) -> Result<Self, RegistrationError> {
        let names = attribute_names(collection);
        if names.is_empty() {
            return Err(RegistrationError::NoColumns);
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let column_type = infer_type(collection, &name, sample_size);
                ColumnDef { name, column_type }
            })
            .collect();
        Ok(Self { columns })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.column_type)
    }

    /// `CREATE TABLE` statement for the table with the leading `_rowid` column.
    #[must_use]
    pub fn create_statement(&self) -> String {
        let columns: Vec<String> = std::iter::once(format!(
            "{} INTEGER",
            quote_identifier(ROW_ID_COLUMN)
        ))
        .chain(self.columns.iter().map(|column| {
            format!(
                "{} {}",
                quote_identifier(&column.name),
                column.column_type.sql_name()
            )
        }))
        .collect();
        format!("CREATE TABLE {TABLE_NAME} ({})", columns.join(", "))
    }

    /// Quoted column list used by `INSERT` statements, `_rowid` first.
    #[must_use]
    pub fn insert_columns(&self) -> String {
        std::iter::once(quote_identifier(ROW_ID_COLUMN))
            .chain(self.columns.iter().map(|column| quote_identifier(&column.name)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Distinct attribute names across all features, in first-seen order.
///
/// Blank and whitespace-only names are dropped, as is any attribute named `_rowid`.
#[must_use]
pub fn attribute_names(collection: &FeatureCollection) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for properties in collection
        .features
        .iter()
        .filter_map(|feature| feature.properties.as_ref())
    {
        for key in properties.keys() {
            if !seen.insert(key.as_str()) {
                continue;
            }
            if key.trim().is_empty() || key == ROW_ID_COLUMN {
                debug!("Ignoring attribute {key:?}: not usable as a column name");
                continue;
            }
            names.push(key.clone());
        }
    }
    names
}

fn infer_type(collection: &FeatureCollection, name: &str, sample_size: usize) -> ColumnType {
    let mut sampled = collection
        .features
        .iter()
        .take(sample_size)
        .filter_map(|feature| feature.property(name))
        .filter(|value| !value.is_null())
        .peekable();

    let Some(first) = sampled.peek() else {
        return ColumnType::Varchar;
    };
    let candidate = match first {
        JsonValue::Number(_) => ColumnType::Double,
        JsonValue::Bool(_) => ColumnType::Boolean,
        _ => return ColumnType::Varchar,
    };

    let consistent = sampled.all(|value| match candidate {
        ColumnType::Double => value.as_f64().is_some_and(f64::is_finite),
        ColumnType::Boolean => value.is_boolean(),
        ColumnType::Varchar => true,
    });
    if consistent { candidate } else { ColumnType::Varchar }
}
