// ABOUTME: MySQL value to export value conversion
// ABOUTME: Renders binary-protocol values as text the way MySQL's text protocol would

use crate::filters::FilterValue;
use crate::source::{format_float, ScalarValue};
use mysql_async::consts::ColumnType;
use mysql_async::{Column, Row, Value};

/// Convert a fetched row into export values
///
/// Returns the values in column order and the number of byte values that
/// needed lossy UTF-8 decoding.
pub fn convert_row(mut row: Row) -> (Vec<ScalarValue>, usize) {
    let columns = row.columns();
    let mut replaced = 0;

    let values = (0..row.len())
        .map(|idx| {
            let value = row.take::<Value, usize>(idx).unwrap_or(Value::NULL);
            let (converted, lossy) = convert_value(value, columns.get(idx));
            if lossy {
                replaced += 1;
            }
            converted
        })
        .collect();

    (values, replaced)
}

/// Convert one MySQL value
///
/// Byte strings (text, decimals, blobs) go through a replacing UTF-8 decode;
/// the flag reports whether a replacement happened. Temporal values use the
/// column metadata to pick the DATE vs DATETIME rendering and the number of
/// fractional second digits.
pub fn convert_value(value: Value, column: Option<&Column>) -> (ScalarValue, bool) {
    match value {
        Value::NULL => (ScalarValue::Null, false),
        Value::Bytes(bytes) => ScalarValue::decode_lossy(bytes),
        Value::Int(i) => (ScalarValue::Integer(i), false),
        Value::UInt(u) => (ScalarValue::UnsignedInteger(u), false),
        // f32 widened to f64 would print spurious digits
        Value::Float(f) => (ScalarValue::Text(format_float(f)), false),
        Value::Double(d) => (ScalarValue::Real(d), false),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let is_date_only = column.is_some_and(|c| {
                matches!(
                    c.column_type(),
                    ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
                )
            });
            let text = if is_date_only {
                format!("{:04}-{:02}-{:02}", year, month, day)
            } else {
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    second,
                    fraction(micros, column)
                )
            };
            (ScalarValue::Text(text), false)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(days) * 24 + u64::from(hours);
            let text = format!(
                "{}{:02}:{:02}:{:02}{}",
                if negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds,
                fraction(micros, column)
            );
            (ScalarValue::Text(text), false)
        }
    }
}

/// Fractional seconds suffix honoring the column's declared precision
fn fraction(micros: u32, column: Option<&Column>) -> String {
    let digits = match column {
        Some(c) => usize::from(c.decimals().min(6)),
        None if micros > 0 => 6,
        None => 0,
    };
    if digits == 0 {
        return String::new();
    }
    let full = format!("{:06}", micros);
    format!(".{}", &full[..digits])
}

/// Bind value for a filter parameter
pub fn filter_value_to_mysql(value: &FilterValue) -> Value {
    match value {
        FilterValue::Integer(i) => Value::Int(*i),
        FilterValue::Float(f) => Value::Double(*f),
        FilterValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
    }
}
