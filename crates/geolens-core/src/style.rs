//! Data-driven color scales for the map legend.

use std::fmt;

use geojson::{FeatureCollection, JsonValue};

use crate::analyzer::ColumnClasses;

/// Categories that get their own color before the rest are grouped as "other".
pub const MAX_CATEGORIES: usize = 12;

/// Number of legend entries describing a sequential ramp.
const RAMP_STOPS: usize = 5;

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Color for values without a category or outside the numeric range.
pub const NO_DATA: Rgb = Rgb(160, 160, 160);

const PALETTE: &[Rgb] = &[
    Rgb(31, 119, 180),
    Rgb(255, 127, 14),
    Rgb(44, 160, 44),
    Rgb(214, 39, 40),
    Rgb(148, 103, 189),
    Rgb(140, 86, 75),
    Rgb(227, 119, 194),
    Rgb(188, 189, 34),
    Rgb(23, 190, 207),
    Rgb(250, 200, 80),
];

/// Color of the `index`-th category.
#[must_use]
pub fn categorical_color(index: usize) -> Rgb {
    PALETTE[index % PALETTE.len()]
}

/// Simplified viridis ramp, `t` in `[0, 1]`.
#[must_use]
pub fn viridis_color(t: f64) -> Rgb {
    const STOPS: [(f64, f64, f64); 5] = [
        (68.0, 1.0, 84.0),
        (53.0, 91.0, 125.0),
        (42.0, 117.0, 142.0),
        (86.0, 163.0, 92.0),
        (253.0, 231.0, 36.0),
    ];
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (STOPS.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(STOPS.len() - 2);
    let s = scaled - lower as f64;
    let (a, b) = (STOPS[lower], STOPS[lower + 1]);
    let mix = |from: f64, to: f64| (from * (1.0 - s) + to * s).round() as u8;
    Rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// One row of a legend.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgb,
}

/// Maps attribute values of one column to colors.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorScale {
    /// Sequential ramp over the numeric range of the column
    Sequential { column: String, min: f64, max: f64 },
    /// One palette color per category, in first-seen order
    Categorical {
        column: String,
        categories: Vec<String>,
        has_other: bool,
    },
}

impl ColorScale {
    /// Build the scale for `column` of the current dataset.
    ///
    /// Returns `None` when the column is neither numeric nor categorical or holds no
    /// usable value.
    #[must_use]
    pub fn for_column(
        collection: &FeatureCollection,
        classes: &ColumnClasses,
        column: &str,
    ) -> Option<Self> {
        let values = collection
            .features
            .iter()
            .filter_map(|feature| feature.property(column));

        if classes.is_numeric(column) {
            let (min, max) = values
                .filter_map(JsonValue::as_f64)
                .filter(|v| v.is_finite())
                .fold(None, |range: Option<(f64, f64)>, v| match range {
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    None => Some((v, v)),
                })?;
            return Some(Self::Sequential {
                column: column.to_string(),
                min,
                max,
            });
        }

        if classes.is_categorical(column) {
            let mut categories: Vec<String> = Vec::new();
            let mut has_other = false;
            for label in values.filter_map(category_label) {
                if categories.contains(&label) {
                    continue;
                }
                if categories.len() < MAX_CATEGORIES {
                    categories.push(label);
                } else {
                    has_other = true;
                }
            }
            if categories.is_empty() {
                return None;
            }
            return Some(Self::Categorical {
                column: column.to_string(),
                categories,
                has_other,
            });
        }

        None
    }

    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Sequential { column, .. } | Self::Categorical { column, .. } => column,
        }
    }

    /// Color for an attribute value.
    #[must_use]
    pub fn color_for(&self, value: Option<&JsonValue>) -> Rgb {
        match self {
            Self::Sequential { min, max, .. } => {
                let Some(v) = value.and_then(JsonValue::as_f64).filter(|v| v.is_finite()) else {
                    return NO_DATA;
                };
                if max > min {
                    viridis_color((v - min) / (max - min))
                } else {
                    viridis_color(0.5)
                }
            },
            Self::Categorical { categories, .. } => value
                .and_then(category_label)
                .and_then(|label| categories.iter().position(|c| *c == label))
                .map_or(NO_DATA, categorical_color),
        }
    }

    /// Legend rows describing the scale.
    #[must_use]
    pub fn legend(&self) -> Vec<LegendEntry> {
        match self {
            Self::Sequential { min, max, .. } => {
                if max <= min {
                    return vec![LegendEntry {
                        label: format_number(*min),
                        color: viridis_color(0.5),
                    }];
                }
                (0..RAMP_STOPS)
                    .map(|i| {
                        let t = i as f64 / (RAMP_STOPS - 1) as f64;
                        LegendEntry {
                            label: format_number(min + t * (max - min)),
                            color: viridis_color(t),
                        }
                    })
                    .collect()
            },
            Self::Categorical {
                categories,
                has_other,
                ..
            } => {
                let mut entries: Vec<LegendEntry> = categories
                    .iter()
                    .enumerate()
                    .map(|(i, label)| LegendEntry {
                        label: label.clone(),
                        color: categorical_color(i),
                    })
                    .collect();
                if *has_other {
                    entries.push(LegendEntry {
                        label: "other".to_string(),
                        color: NO_DATA,
                    });
                }
                entries
            },
        }
    }
}

fn category_label(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
