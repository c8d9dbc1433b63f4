//! Display utilities for formatting CLI output.
//!
//! Fixed-shape listings use `Tabled` rows. Record tables have one column per attribute,
//! so they are assembled with the table builder.

use geojson::JsonValue;
use tabled::builder::Builder;
use tabled::{Table, Tabled};

use geolens_core::LoadReport;
use geolens_core::dataset::CurrentView;
use geolens_core::drivers::Driver;
use geolens_core::render::DatasetSummary;
use geolens_core::style::ColorScale;

/// Table row representation for displaying driver information.
#[derive(Tabled)]
pub struct DriverRow {
    /// Short identifier for the driver (e.g., `GeoJSON`, `Parquet`).
    #[tabled(rename = "Short Name")]
    pub short_name: String,
    /// Full descriptive name of the driver format.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    #[tabled(rename = "Extensions")]
    pub extensions: String,
    #[tabled(rename = "Local")]
    pub local: String,
    #[tabled(rename = "URL")]
    pub remote: String,
    #[tabled(rename = "Export")]
    pub export: String,
}

impl From<&Driver> for DriverRow {
    fn from(driver: &Driver) -> Self {
        Self {
            short_name: driver.short_name.to_string(),
            long_name: driver.long_name.to_string(),
            extensions: driver
                .extensions
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", "),
            local: driver.capabilities.local.to_string(),
            remote: driver.capabilities.remote.to_string(),
            export: driver.capabilities.export.to_string(),
        }
    }
}

/// Table row representation for displaying one attribute column.
#[derive(Tabled)]
pub struct ColumnRow {
    #[tabled(rename = "Column")]
    pub name: String,
    /// Type of the column in table `data`, or `-` when it is not registered.
    #[tabled(rename = "SQL Type")]
    pub sql_type: String,
    /// `numeric`, `categorical` or `other`.
    #[tabled(rename = "Class")]
    pub class: String,
}

#[derive(Tabled)]
struct LegendRow {
    #[tabled(rename = "Value")]
    label: String,
    #[tabled(rename = "Color")]
    color: String,
}

/// Drivers table, including the formats that cannot be loaded.
pub fn format_drivers(drivers: &[Driver]) -> String {
    let rows: Vec<DriverRow> = drivers.iter().map(DriverRow::from).collect();
    let mut out = Table::new(rows).to_string();

    let hints: Vec<String> = drivers
        .iter()
        .filter_map(|d| d.remediation.map(|hint| format!("  {}: {hint}", d.long_name)))
        .collect();
    if !hints.is_empty() {
        out.push_str("\n\nUnsupported formats:\n");
        out.push_str(&hints.join("\n"));
    }
    out
}

/// Rows describing every attribute column known to the session.
pub fn column_rows(summary: &DatasetSummary) -> Vec<ColumnRow> {
    let mut names: Vec<&String> = summary.columns.all.iter().collect();
    if let Some(table) = &summary.table {
        for column in &table.columns {
            if !names.contains(&&column.name) {
                names.push(&column.name);
            }
        }
    }

    names
        .into_iter()
        .map(|name| {
            let sql_type = summary
                .table
                .as_ref()
                .and_then(|table| table.column_type(name))
                .map_or_else(|| "-".to_string(), |t| t.sql_name().to_string());
            let class = if summary.columns.is_numeric(name) {
                "numeric"
            } else if summary.columns.is_categorical(name) {
                "categorical"
            } else {
                "other"
            };
            ColumnRow {
                name: name.clone(),
                sql_type,
                class: class.to_string(),
            }
        })
        .collect()
}

/// Dataset overview printed by `inspect` and `.schema`.
pub fn format_summary(report: Option<&LoadReport>, summary: &DatasetSummary) -> String {
    let mut lines = Vec::new();
    if let Some(report) = report {
        lines.push(format!("Dataset: {}", report.name));
    }
    if let Some(crs) = summary.source_crs {
        lines.push(format!("Source CRS: {crs}"));
    }
    lines.push(format!(
        "Features: {} ({} shown, limit {})",
        summary.total_features,
        summary.shown_features,
        if summary.feature_limit == 0 {
            "none".to_string()
        } else {
            summary.feature_limit.to_string()
        }
    ));
    lines.push(format!("Filter: {}", summary.filter));
    lines.push(format!(
        "SQL table: {}",
        match &summary.table {
            Some(table) => format!("data ({} columns + _rowid)", table.len()),
            None => "not registered".to_string(),
        }
    ));

    let rows = column_rows(summary);
    if !rows.is_empty() {
        lines.push(String::new());
        lines.push(Table::new(rows).to_string());
    }
    lines.join("\n")
}

/// Records of the current view, `_rowid` first, then attributes in first-seen order.
pub fn format_records(view: &CurrentView, max_rows: usize) -> String {
    let mut columns: Vec<String> = Vec::new();
    for feature in view.collection.features.iter().take(max_rows) {
        for key in feature.properties.iter().flat_map(|p| p.keys()) {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut builder = Builder::default();
    let mut header = vec!["_rowid".to_string()];
    header.extend(columns.iter().cloned());
    builder.push_record(header);

    for (feature, row_id) in view
        .collection
        .features
        .iter()
        .zip(&view.row_ids)
        .take(max_rows)
    {
        let mut record = vec![row_id.to_string()];
        record.extend(
            columns
                .iter()
                .map(|column| cell(feature.property(column))),
        );
        builder.push_record(record);
    }

    let count = view.len();
    let mut out = builder.build().to_string();
    if count > max_rows {
        out.push_str(&format!("\n... {} more", count - max_rows));
    }
    out.push_str(&format!(
        "\n{count} record{}",
        if count == 1 { "" } else { "s" }
    ));
    out
}

/// Legend of a color scale.
pub fn format_legend(scale: &ColorScale) -> String {
    let rows: Vec<LegendRow> = scale
        .legend()
        .into_iter()
        .map(|entry| LegendRow {
            label: entry.label,
            color: entry.color.to_string(),
        })
        .collect();
    format!("Colored by {}\n{}", scale.column(), Table::new(rows))
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, FeatureCollection, JsonObject};
    use geolens_core::analyzer::ColumnClasses;
    use geolens_core::dataset::ActiveFilter;
    use geolens_core::drivers::get_drivers;
    use geolens_core::store::{ColumnDef, ColumnType, TableSchema};
    use std::sync::Arc;

    fn view(n: usize) -> CurrentView {
        let features = (0..n)
            .map(|i| {
                let mut properties = JsonObject::new();
                properties.insert("name".to_string(), format!("n{i}").into());
                if i == 0 {
                    properties.insert("extra".to_string(), JsonValue::Null);
                }
                Feature {
                    bbox: None,
                    geometry: None,
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        CurrentView {
            collection: Arc::new(FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            }),
            row_ids: (10..10 + n).collect(),
            filter: ActiveFilter::None,
        }
    }

    #[test]
    fn test_driver_rows() {
        let drivers = get_drivers();
        let row = DriverRow::from(&drivers[0]);
        assert_eq!(row.short_name, "GeoJSON");
        assert_eq!(row.extensions, ".geojson, .json");

        let table = format_drivers(&drivers);
        assert!(table.contains("Unsupported formats:"));
        assert!(table.contains("GeoPackage"));
    }

    #[test]
    fn test_records_table() {
        let out = format_records(&view(3), 2);
        assert!(out.contains("_rowid"));
        assert!(out.contains("extra"));
        assert!(out.contains("n1"));
        assert!(!out.contains("n2"));
        assert!(out.contains("... 1 more"));
        assert!(out.ends_with("3 records"));
        assert!(format_records(&view(1), 5).ends_with("1 record"));
    }

    #[test]
    fn test_column_rows_merge_classes_and_table() {
        let mut columns = ColumnClasses::default();
        columns.all.insert("pop".to_string());
        columns.numeric.insert("pop".to_string());
        let summary = DatasetSummary {
            total_features: 1,
            shown_features: 1,
            feature_limit: 0,
            source_crs: None,
            filter: ActiveFilter::None,
            columns,
            legend: None,
            table: Some(TableSchema {
                columns: vec![
                    ColumnDef {
                        name: "pop".to_string(),
                        column_type: ColumnType::Double,
                    },
                    ColumnDef {
                        name: "tags".to_string(),
                        column_type: ColumnType::Varchar,
                    },
                ],
            }),
        };

        let rows = column_rows(&summary);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].sql_type.as_str(), rows[0].class.as_str()), ("DOUBLE", "numeric"));
        assert_eq!((rows[1].name.as_str(), rows[1].class.as_str()), ("tags", "other"));

        let text = format_summary(None, &summary);
        assert!(text.contains("limit none"));
        assert!(text.contains("data (2 columns + _rowid)"));
    }
}
