//! Warehouse logical type -> local column type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Text,
    BigInt,
    DoublePrecision,
    Boolean,
    TimestampTz,
    Date,
    Timestamp,
    Time,
    Bytea,
    Numeric,
    /// Semi-structured column for records and arrays.
    Jsonb,
}

impl TargetType {
    pub fn as_sql(self) -> &'static str {
        match self {
            TargetType::Text => "TEXT",
            TargetType::BigInt => "BIGINT",
            TargetType::DoublePrecision => "DOUBLE PRECISION",
            TargetType::Boolean => "BOOLEAN",
            TargetType::TimestampTz => "TIMESTAMPTZ",
            TargetType::Date => "DATE",
            TargetType::Timestamp => "TIMESTAMP",
            TargetType::Time => "TIME",
            TargetType::Bytea => "BYTEA",
            TargetType::Numeric => "NUMERIC",
            TargetType::Jsonb => "JSONB",
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Map a source type and mode to a target type.
///
/// Nested or repeated columns always become [`TargetType::Jsonb`], whatever the base
/// type. Unknown types fall back to [`TargetType::Text`].
pub fn translate(source_type: &str, mode: Option<&str>) -> TargetType {
    let source_type = source_type.trim();
    let upper = if source_type.is_empty() {
        "STRING".to_string()
    } else {
        source_type.to_ascii_uppercase()
    };

    if matches!(upper.as_str(), "RECORD" | "STRUCT" | "ARRAY") {
        return TargetType::Jsonb;
    }
    if mode.map_or(false, |m| m.trim().eq_ignore_ascii_case("REPEATED")) {
        return TargetType::Jsonb;
    }

    match upper.as_str() {
        "STRING" => TargetType::Text,
        "INT64" | "INTEGER" => TargetType::BigInt,
        "FLOAT64" | "FLOAT" => TargetType::DoublePrecision,
        "BOOL" | "BOOLEAN" => TargetType::Boolean,
        "TIMESTAMP" => TargetType::TimestampTz,
        "DATE" => TargetType::Date,
        "DATETIME" => TargetType::Timestamp,
        "TIME" => TargetType::Time,
        "BYTES" => TargetType::Bytea,
        "NUMERIC" | "BIGNUMERIC" => TargetType::Numeric,
        "GEOGRAPHY" => TargetType::Text,
        "JSON" => TargetType::Jsonb,
        _ => TargetType::Text,
    }
}
