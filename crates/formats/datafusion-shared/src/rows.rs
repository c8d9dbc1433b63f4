//! Conversion of Arrow record batches into JSON rows.
//!
//! SQL results and raw Parquet scans both arrive as record batches; the viewer works on
//! JSON property maps, so every cell is mapped to the closest `serde_json::Value`.

use datafusion_common::arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use datafusion_common::arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use datafusion_common::arrow::util::display::{ArrayFormatter, FormatOptions};
use serde_json::{Map, Number, Value};

/// One result row: column name to JSON scalar.
pub type JsonRow = Map<String, Value>;

/// Flatten a sequence of record batches into JSON rows, preserving row order.
///
/// Columns listed in `skip` (by name) are left out of every row.
#[must_use]
pub fn batches_to_rows(batches: &[RecordBatch], skip: &[&str]) -> Vec<JsonRow> {
    let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
    let mut rows = Vec::with_capacity(total);

    for batch in batches {
        let schema = batch.schema();
        let columns: Vec<(&str, &ArrayRef)> = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, column)| (field.name().as_str(), column))
            .filter(|(name, _)| !skip.contains(name))
            .collect();

        for row in 0..batch.num_rows() {
            let mut map = Map::with_capacity(columns.len());
            for (name, column) in &columns {
                map.insert((*name).to_string(), array_value(column, row));
            }
            rows.push(map);
        }
    }

    rows
}

/// Convert a single cell to JSON.
///
/// Integers and floats become numbers (non-finite floats become null), strings stay
/// strings, and everything else is rendered through Arrow's display formatter.
#[must_use]
pub fn array_value(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }

    match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(row)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(row)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(row)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(row)),
        DataType::Float32 => {
            float_value(f64::from(array.as_primitive::<Float32Type>().value(row)))
        },
        DataType::Float64 => float_value(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
        DataType::Utf8View => Value::String(array.as_string_view().value(row).to_string()),
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => {
            let text = formatted(array, row);
            text.parse::<f64>()
                .ok()
                .map_or(Value::String(text), float_value)
        },
        _ => Value::String(formatted(array, row)),
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn formatted(array: &ArrayRef, row: usize) -> String {
    match ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default()) {
        Ok(formatter) => formatter.value(row).to_string(),
        Err(_) => String::new(),
    }
}
