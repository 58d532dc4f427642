//! INSERT rendering and value literal formatting.

use crate::core::identifier::{ident, ident_list};
use crate::core::{RowSet, SqlValue};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use std::io;

/// Render all rows of a table as one multi-row INSERT. `None` when there are no rows.
pub fn render_insert(rows: &RowSet) -> Option<String> {
    if rows.is_empty() {
        return None;
    }

    let values: Vec<String> = rows
        .rows
        .iter()
        .map(|row| {
            let literals: Vec<String> = row.iter().map(format_value).collect();
            format!("({})", literals.join(", "))
        })
        .collect();

    Some(format!(
        "INSERT INTO {} ({}) VALUES\n{};",
        ident(&rows.table),
        ident_list(&rows.columns),
        values.join(",\n")
    ))
}

/// Format one value as a SQL literal.
pub fn format_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::Json(json) => json_literal(json),
        SqlValue::Text(s) => {
            if looks_like_json_object(s) {
                if let Some(json) = reparse_json_text(s) {
                    return json_literal(&json);
                }
            }
            quote_literal(s)
        }
    }
}

/// Brace heuristic for JSON stored in text columns.
///
/// Known false positives: any text that happens to start with `{` and end
/// with `}`, such as a PostgreSQL array literal like `{}` or `{"a"}`, is
/// cast to json when it also parses as JSON.
pub fn looks_like_json_object(s: &str) -> bool {
    s.starts_with('{') && s.ends_with('}')
}

/// Parse JSON-looking text, accepting single-quoted keys and strings.
fn reparse_json_text(s: &str) -> Option<serde_json::Value> {
    serde_json::from_str(&s.replace('\'', "\"")).ok()
}

/// `'<json>'::json` with `", "` and `": "` separators.
fn json_literal(json: &serde_json::Value) -> String {
    format!("{}::json", quote_literal(&to_spaced_json(json)))
}

/// Single-quoted string literal with embedded quotes doubled.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Serialize JSON with a space after every separator, keeping key order.
pub fn to_spaced_json(json: &serde_json::Value) -> String {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, SpacedFormatter);
    if json.serialize(&mut ser).is_err() {
        return json.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| json.to_string())
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
