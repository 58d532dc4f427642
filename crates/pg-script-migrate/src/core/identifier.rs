//! Identifier validation and quoting for generated SQL.
//!
//! Identifiers cannot be passed as statement parameters, so every table,
//! column, constraint and sequence name that ends up in a script goes
//! through [`ident`]. Plain lower-case names are emitted bare to keep the
//! scripts readable; anything else is double-quoted.

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers longer than this.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Reserved words that cannot appear unquoted as a table or column name.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both", "case",
    "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user", "default",
    "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch", "for",
    "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null", "offset", "on",
    "only", "or", "order", "placing", "primary", "references", "returning", "select",
    "session_user", "some", "symmetric", "table", "then", "to", "trailing", "true", "union",
    "unique", "user", "using", "variadic", "when", "where", "window", "with",
    // Allowed as function or type names only.
    "authorization", "binary", "collation", "concurrently", "cross", "current_schema", "freeze",
    "full", "ilike", "inner", "is", "isnull", "join", "left", "like", "natural", "notnull",
    "outer", "overlaps", "right", "similar", "tablesample", "verbose",
];

/// Validate an identifier read from the catalog.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }
    Ok(())
}

/// True when the name can be written without quotes and still resolve to itself.
pub fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

/// Render an identifier for a script: bare when possible, quoted otherwise.
pub fn ident(name: &str) -> String {
    if is_bare_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Comma-separated identifier list.
pub fn ident_list(names: &[String]) -> String {
    names.iter().map(|n| ident(n)).collect::<Vec<_>>().join(", ")
}

/// Reverse of [`ident`]: strip quotes and undo doubling. Bare names are returned as-is.
pub fn unquote(token: &str) -> String {
    let token = token.trim();
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        token[1..token.len() - 1].replace("\"\"", "\"")
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_identifiers() {
        assert_eq!(ident("users"), "users");
        assert_eq!(ident("order_items_2"), "order_items_2");
        assert_eq!(ident("_tmp"), "_tmp");
    }

    #[test]
    fn test_quoted_identifiers() {
        assert_eq!(ident("User"), "\"User\"");
        assert_eq!(ident("user"), "\"user\"");
        assert_eq!(ident("my table"), "\"my table\"");
        assert_eq!(ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(ident("1abc"), "\"1abc\"");
        for word in ["left", "join", "is", "current_schema", "full", "verbose"] {
            assert_eq!(ident(word), format!("\"{}\"", word));
        }
    }

    #[test]
    fn test_unquote_reverses_ident() {
        for name in ["users", "User", "a\"b", "my table", "order"] {
            assert_eq!(unquote(&ident(name)), name);
        }
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
    }
}
