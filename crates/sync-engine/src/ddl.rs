//! DDL text for mirrored tables.

use common::utils::safe_filename;
use common::FieldSpec;

use crate::translate::translate;

const RESERVED_WORDS: &[&str] = &["ORDER", "GROUP", "TABLE", "SELECT", "FROM", "WHERE", "USER", "LIMIT"];

/// Quote an identifier only when it would not parse bare. Embedded `"` is doubled.
pub fn quote_ident(name: &str) -> String {
    let needs_quotes = name.chars().any(|c| c.is_whitespace() || c == '-' || c == '"')
        || RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name));

    if needs_quotes {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// `CREATE TABLE IF NOT EXISTS` with one line per field, in input order.
pub fn build_create_table(table_id: &str, fields: &[FieldSpec]) -> String {
    let columns = fields
        .iter()
        .map(|field| {
            format!(
                "  {} {}",
                quote_ident(&field.name),
                translate(&field.source_type, field.mode.as_deref())
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(table_id),
        columns
    )
}

pub fn build_drop_table(table_id: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(table_id))
}

/// File the DDL for `table_id` is written to inside the schema directory.
pub fn ddl_file_name(table_id: &str) -> String {
    format!("{}.sql", safe_filename(table_id))
}
