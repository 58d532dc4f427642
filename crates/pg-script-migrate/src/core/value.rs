//! SQL values read from the source database.

use rust_decimal::Decimal;
use std::str::FromStr;

/// A scalar value tagged once when the row is read.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Json(serde_json::Value),
}

/// How text values of a column are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Decimal,
    Json,
    Text,
}

impl ValueKind {
    /// Classify a declared column type as printed by `format_type`.
    pub fn from_data_type(data_type: &str) -> Self {
        let dt = data_type.trim().to_lowercase();
        if dt.ends_with("[]") {
            return ValueKind::Text;
        }
        let base = dt.split('(').next().unwrap_or("").trim();
        match base {
            "boolean" | "bool" => ValueKind::Bool,
            "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" | "int" | "smallserial"
            | "serial" | "bigserial" => ValueKind::Int,
            "real" | "double precision" | "float4" | "float8" => ValueKind::Float,
            "numeric" | "decimal" => ValueKind::Decimal,
            "json" | "jsonb" => ValueKind::Json,
            _ => ValueKind::Text,
        }
    }
}

impl SqlValue {
    /// Convert a value received in PostgreSQL text format.
    ///
    /// Values that do not parse as their declared kind (NaN, out-of-range
    /// numerics, malformed JSON) are kept as text so no data is lost.
    pub fn from_pg_text(kind: ValueKind, raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return SqlValue::Null;
        };
        match kind {
            ValueKind::Bool => match raw {
                "t" | "true" => SqlValue::Bool(true),
                "f" | "false" => SqlValue::Bool(false),
                other => SqlValue::Text(other.to_string()),
            },
            ValueKind::Int => raw
                .parse::<i64>()
                .map(SqlValue::Int)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ValueKind::Float => match raw.parse::<f64>() {
                Ok(f) if f.is_finite() => SqlValue::Float(f),
                _ => SqlValue::Text(raw.to_string()),
            },
            ValueKind::Decimal => Decimal::from_str(raw)
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ValueKind::Json => serde_json::from_str(raw)
                .map(SqlValue::Json)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ValueKind::Text => SqlValue::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// Rows of one table with positional values aligned to `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn empty(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_data_type() {
        assert_eq!(ValueKind::from_data_type("integer"), ValueKind::Int);
        assert_eq!(ValueKind::from_data_type("numeric(10,2)"), ValueKind::Decimal);
        assert_eq!(ValueKind::from_data_type("double precision"), ValueKind::Float);
        assert_eq!(ValueKind::from_data_type("jsonb"), ValueKind::Json);
        assert_eq!(ValueKind::from_data_type("boolean"), ValueKind::Bool);
        assert_eq!(ValueKind::from_data_type("integer[]"), ValueKind::Text);
        assert_eq!(
            ValueKind::from_data_type("timestamp with time zone"),
            ValueKind::Text
        );
    }

    #[test]
    fn test_from_pg_text() {
        assert_eq!(SqlValue::from_pg_text(ValueKind::Int, None), SqlValue::Null);
        assert_eq!(
            SqlValue::from_pg_text(ValueKind::Bool, Some("t")),
            SqlValue::Bool(true)
        );
        assert_eq!(
            SqlValue::from_pg_text(ValueKind::Int, Some("42")),
            SqlValue::Int(42)
        );
        assert_eq!(
            SqlValue::from_pg_text(ValueKind::Float, Some("NaN")),
            SqlValue::Text("NaN".into())
        );
        assert_eq!(
            SqlValue::from_pg_text(ValueKind::Decimal, Some("12.50")),
            SqlValue::Decimal(Decimal::from_str("12.50").unwrap())
        );
        assert_eq!(
            SqlValue::from_pg_text(ValueKind::Json, Some(r#"{"x":1}"#)),
            SqlValue::Json(serde_json::json!({"x": 1}))
        );
    }
}
