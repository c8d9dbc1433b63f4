//! Error and row types shared by the GeoLens format decoders and the tabular store.

use std::fmt;

use thiserror::Error;

pub mod rows;

pub use rows::{JsonRow, array_value, batches_to_rows};

/// Where in a payload a decoder gave up.
///
/// `line` and `column` are 1-based, `record` is the zero-based feature index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub record: Option<u64>,
}

impl SourcePosition {
    #[must_use]
    pub fn at_line(line: u64, column: u64) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            record: None,
        }
    }

    #[must_use]
    pub fn at_record(record: u64) -> Self {
        Self {
            record: Some(record),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labelled = [
            ("line", self.line),
            ("column", self.column),
            ("record", self.record),
        ];
        let mut first = true;
        for (label, value) in labelled {
            let Some(value) = value else { continue };
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{label} {value}")?;
            first = false;
        }
        if first {
            f.write_str("unknown position")?;
        }
        Ok(())
    }
}

fn reading(context: &Option<String>) -> String {
    context
        .as_deref()
        .map_or_else(String::new, |c| format!(" while reading {c}"))
}

fn at(position: &Option<SourcePosition>) -> String {
    position.map_or_else(String::new, |p| format!(" at {p}"))
}

/// Failure while turning a raw payload into a feature collection.
#[derive(Debug, Error)]
pub enum SpatialFormatReadError {
    #[error("I/O error{}: {source}", reading(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<String>,
    },

    /// The bytes are not valid for the format at all.
    #[error("Parse error{}{}: {message}", reading(.context), at(.position))]
    Parse {
        message: String,
        position: Option<SourcePosition>,
        context: Option<String>,
    },

    /// Parsed, but not shaped like a feature collection.
    #[error("Unexpected structure{}: {message}", reading(.context))]
    Structure {
        message: String,
        context: Option<String>,
    },

    /// One geometry could not be decoded.
    #[error("Invalid geometry{}: {message}", at(.position))]
    Geometry {
        message: String,
        position: Option<SourcePosition>,
    },

    #[error("{message}")]
    Other { message: String },
}

impl SpatialFormatReadError {
    /// Appends `extra` to the context, or to the message for variants without one.
    #[must_use]
    pub fn with_additional_context(mut self, extra: impl Into<String>) -> Self {
        let extra = extra.into();
        match &mut self {
            Self::Io { context, .. }
            | Self::Parse { context, .. }
            | Self::Structure { context, .. } => {
                *context = Some(match context.take() {
                    Some(existing) if !existing.is_empty() => format!("{existing}; {extra}"),
                    _ => extra,
                });
            },
            Self::Geometry { message, .. } | Self::Other { message } => {
                *message = format!("{message} ({extra})");
            },
        }
        self
    }
}

pub type SpatialFormatResult<T> = Result<T, SpatialFormatReadError>;
