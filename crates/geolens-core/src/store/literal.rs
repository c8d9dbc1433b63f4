//! SQL identifier quoting and literal encoding for generated statements.

use geojson::JsonValue;

use super::schema::ColumnType;

/// Double-quote an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Encodes attribute values as SQL literals for one engine dialect.
#[derive(Debug, Clone, Copy)]
pub struct LiteralEncoder {
    max_text_length: usize,
    escape_backslashes: bool,
}

impl LiteralEncoder {
    #[must_use]
    pub fn new(max_text_length: usize, escape_backslashes: bool) -> Self {
        Self {
            max_text_length,
            escape_backslashes,
        }
    }

    /// Encode `value` for a column of type `column_type`.
    ///
    /// Values that do not fit the column type become `NULL` in `DOUBLE` and `BOOLEAN`
    /// columns and their text form in `VARCHAR` columns, so one odd value never makes
    /// the whole row fail.
    #[must_use]
    pub fn encode(&self, value: Option<&JsonValue>, column_type: ColumnType) -> String {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return "NULL".to_string();
        };

        match column_type {
            ColumnType::Double => value
                .as_f64()
                .filter(|n| n.is_finite())
                .map_or_else(|| "NULL".to_string(), float_literal),
            ColumnType::Boolean => match value {
                JsonValue::Bool(true) => "TRUE".to_string(),
                JsonValue::Bool(false) => "FALSE".to_string(),
                _ => "NULL".to_string(),
            },
            ColumnType::Varchar => match value {
                JsonValue::String(text) => self.string_literal(text),
                JsonValue::Number(n) if n.as_f64().is_some_and(|f| !f.is_finite()) => {
                    "NULL".to_string()
                },
                JsonValue::Object(_) | JsonValue::Array(_) => {
                    let json = value.to_string();
                    let truncated: String = json.chars().take(self.max_text_length).collect();
                    self.string_literal(&truncated)
                },
                other => self.string_literal(&other.to_string()),
            },
        }
    }

    /// Single-quoted string literal with NUL bytes removed.
    #[must_use]
    pub fn string_literal(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len() + 2);
        escaped.push('\'');
        for c in text.chars() {
            match c {
                '\0' => {},
                '\'' => escaped.push_str("''"),
                '\\' if self.escape_backslashes => escaped.push_str("\\\\"),
                c => escaped.push(c),
            }
        }
        escaped.push('\'');
        escaped
    }
}

/// Float literal that always parses as a floating point value.
fn float_literal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value:e}")
    }
}
