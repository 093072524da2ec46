//! Conversion of BigQuery schemas and `f`/`v` encoded rows into typed values.
//!
//! This is the single point where loosely-typed REST payloads become [`FieldSpec`]s and
//! [`SqlValue`]s. Everything downstream works with the typed forms only.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use common::{Error, FieldSpec, Result, RowBatch, SqlValue};
use serde_json::{Map, Value};

use crate::messages::{TableFieldSchema, TableRow, TableSchema};

/// Turn a warehouse schema into ordered field specs.
///
/// A missing type defaults to STRING. Unnamed fields and empty schemas are rejected.
pub fn decode_schema(table: &str, schema: &TableSchema) -> Result<Vec<FieldSpec>> {
    if schema.fields.is_empty() {
        return Err(Error::remote_fetch(table, "table schema has no fields"));
    }

    schema
        .fields
        .iter()
        .map(|field| {
            if field.name.trim().is_empty() {
                return Err(Error::remote_fetch(table, "schema contains an unnamed field"));
            }
            Ok(FieldSpec {
                name: field.name.clone(),
                source_type: field
                    .field_type
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "STRING".to_string()),
                mode: field.mode.clone(),
            })
        })
        .collect()
}

/// Decode a full query result into a [`RowBatch`].
pub fn decode_batch(table: &str, schema: &TableSchema, rows: &[TableRow]) -> Result<RowBatch> {
    let fields = decode_schema(table, schema)?;
    let rows = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| decode_row(&schema.fields, row).map_err(|e| {
            Error::remote_fetch(table, format!("row {}: {}", idx, e))
        }))
        .collect::<Result<Vec<_>>>()?;

    Ok(RowBatch::new(fields, rows))
}

fn decode_row(fields: &[TableFieldSchema], row: &TableRow) -> std::result::Result<Vec<SqlValue>, String> {
    if row.f.len() != fields.len() {
        return Err(format!(
            "expected {} cells, got {}",
            fields.len(),
            row.f.len()
        ));
    }

    fields
        .iter()
        .zip(&row.f)
        .map(|(field, cell)| decode_cell(field, &cell.v))
        .collect()
}

/// Decode one cell according to its column declaration.
pub fn decode_cell(field: &TableFieldSchema, value: &Value) -> std::result::Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    if field.is_repeated() || field.is_record() {
        let json = nested_to_json(field, value)?;
        return Ok(SqlValue::Text(json.to_string()));
    }

    let raw = scalar_str(field, value)?;
    let kind = field_kind(field);

    let decoded = match kind.as_str() {
        "INT64" | "INTEGER" => SqlValue::Int(
            raw.parse::<i64>()
                .map_err(|e| format!("{}: invalid integer {:?}: {}", field.name, raw, e))?,
        ),
        "FLOAT64" | "FLOAT" => SqlValue::Float(
            raw.parse::<f64>()
                .map_err(|e| format!("{}: invalid float {:?}: {}", field.name, raw, e))?,
        ),
        "BOOL" | "BOOLEAN" => SqlValue::Bool(parse_bool(raw).ok_or_else(|| {
            format!("{}: invalid boolean {:?}", field.name, raw)
        })?),
        "TIMESTAMP" => SqlValue::Text(
            parse_timestamp(raw).ok_or_else(|| format!("{}: invalid timestamp {:?}", field.name, raw))?,
        ),
        "BYTES" => SqlValue::Bytes(
            BASE64
                .decode(raw)
                .map_err(|e| format!("{}: invalid base64: {}", field.name, e))?,
        ),
        _ => SqlValue::Text(raw.to_string()),
    };

    Ok(decoded)
}

fn field_kind(field: &TableFieldSchema) -> String {
    field
        .field_type
        .as_deref()
        .unwrap_or("STRING")
        .to_ascii_uppercase()
}

fn scalar_str<'a>(field: &TableFieldSchema, value: &'a Value) -> std::result::Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{}: expected a scalar string cell, got {}", field.name, value))
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Microseconds since epoch (int64 timestamp output) or float seconds (legacy output).
fn parse_timestamp(raw: &str) -> Option<String> {
    let parsed: Option<DateTime<Utc>> = match raw.parse::<i64>() {
        Ok(micros) => DateTime::<Utc>::from_timestamp_micros(micros),
        Err(_) => {
            let seconds = raw.parse::<f64>().ok()?;
            DateTime::<Utc>::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
        }
    };
    parsed.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Rebuild natural JSON from the `f`/`v` encoding of RECORD and REPEATED columns.
fn nested_to_json(field: &TableFieldSchema, value: &Value) -> std::result::Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if field.is_repeated() {
        let items = value
            .as_array()
            .ok_or_else(|| format!("{}: repeated value is not an array", field.name))?;
        let element = TableFieldSchema {
            mode: None,
            ..field.clone()
        };
        return items
            .iter()
            .map(|item| nested_to_json(&element, item.get("v").unwrap_or(&Value::Null)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    if field.is_record() {
        let cells = value
            .get("f")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("{}: record value has no cells", field.name))?;
        let mut object = Map::new();
        for (sub_field, cell) in field.fields.iter().zip(cells) {
            let sub_value = nested_to_json(sub_field, cell.get("v").unwrap_or(&Value::Null))?;
            object.insert(sub_field.name.clone(), sub_value);
        }
        return Ok(Value::Object(object));
    }

    let raw = scalar_str(field, value)?;
    let json = match field_kind(field).as_str() {
        "INT64" | "INTEGER" => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(raw)),
        "FLOAT64" | "FLOAT" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(raw)),
        "BOOL" | "BOOLEAN" => parse_bool(raw).map(Value::Bool).unwrap_or_else(|| Value::from(raw)),
        "TIMESTAMP" => Value::from(parse_timestamp(raw).unwrap_or_else(|| raw.to_string())),
        "JSON" => serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw)),
        _ => Value::from(raw),
    };
    Ok(json)
}
