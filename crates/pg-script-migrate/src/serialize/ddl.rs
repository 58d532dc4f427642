//! DDL rendering: sequences, tables and foreign keys.

use crate::core::identifier::{ident, ident_list, unquote, validate_identifier};
use crate::core::{ColumnDescriptor, ForeignKeyDescriptor, SequenceDescriptor, TableDescriptor};
use crate::error::{MigrateError, Result};

/// Render a CREATE TABLE statement.
///
/// Fails for a table without columns or a primary key naming a column that
/// is not part of the table.
pub fn render_create_table(table: &TableDescriptor) -> Result<String> {
    validate_table(table)?;

    let mut defs: Vec<String> = table.columns.iter().map(render_column).collect();

    if table.has_pk() {
        defs.push(format!(
            "    CONSTRAINT {} PRIMARY KEY ({})",
            ident(&pk_constraint_name(&table.name)),
            ident_list(&table.primary_key)
        ));
    }

    Ok(format!(
        "CREATE TABLE {} (\n{}\n);",
        ident(&table.name),
        defs.join(",\n")
    ))
}

fn render_column(col: &ColumnDescriptor) -> String {
    let mut def = format!("    {} {}", ident(&col.name), col.data_type);
    if let Some(ref default) = col.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    if !col.is_nullable {
        def.push_str(" NOT NULL");
    }
    def
}

/// Name of the generated primary key constraint.
pub fn pk_constraint_name(table: &str) -> String {
    format!("pk_{}", table)
}

fn validate_table(table: &TableDescriptor) -> Result<()> {
    validate_identifier(&table.name).map_err(|e| MigrateError::validation(&table.name, e.to_string()))?;

    if table.columns.is_empty() {
        return Err(MigrateError::validation(&table.name, "table has no columns"));
    }
    for col in &table.columns {
        validate_identifier(&col.name)
            .map_err(|e| MigrateError::validation(&table.name, e.to_string()))?;
        if col.data_type.trim().is_empty() {
            return Err(MigrateError::validation(
                &table.name,
                format!("column {} has no data type", col.name),
            ));
        }
    }
    for pk in &table.primary_key {
        if table.column(pk).is_none() {
            return Err(MigrateError::validation(
                &table.name,
                format!("primary key column {} is not a column of the table", pk),
            ));
        }
    }
    Ok(())
}

/// Render a CREATE SEQUENCE statement.
pub fn render_sequence(seq: &SequenceDescriptor) -> String {
    let mut sql = format!("CREATE SEQUENCE {}\n", ident(&seq.name));
    if let Some(ref data_type) = seq.data_type {
        sql.push_str(&format!("    AS {}\n", data_type));
    }
    sql.push_str(&format!("    INCREMENT {}\n", seq.increment));
    sql.push_str(&format!("    START {}\n", seq.start));
    sql.push_str(&format!("    MINVALUE {}\n", seq.min));
    sql.push_str(&format!("    MAXVALUE {};", seq.max));
    sql
}

/// Render one ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY statement.
pub fn render_foreign_key(fk: &ForeignKeyDescriptor) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        ident(&fk.table),
        ident(&fk.name),
        ident_list(&fk.columns),
        ident(&fk.ref_table),
        ident_list(&fk.ref_columns)
    );
    if let Some(action) = referential_action(&fk.on_delete) {
        sql.push_str(" ON DELETE ");
        sql.push_str(action);
    }
    if let Some(action) = referential_action(&fk.on_update) {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action);
    }
    sql.push(';');
    sql
}

/// Render the foreign keys of one table, one statement per line.
pub fn render_foreign_keys<'a, I>(fks: I) -> String
where
    I: IntoIterator<Item = &'a ForeignKeyDescriptor>,
{
    fks.into_iter()
        .map(render_foreign_key)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map a catalog action to SQL; `None` for the default NO ACTION.
fn referential_action(action: &str) -> Option<&'static str> {
    match action.to_uppercase().replace('_', " ").as_str() {
        "CASCADE" => Some("CASCADE"),
        "SET NULL" => Some("SET NULL"),
        "SET DEFAULT" => Some("SET DEFAULT"),
        "RESTRICT" => Some("RESTRICT"),
        _ => None,
    }
}

/// Parse a CREATE TABLE statement produced by [`render_create_table`].
///
/// Understands column definitions with optional `DEFAULT` and `NOT NULL`
/// and a `CONSTRAINT <name> PRIMARY KEY (...)` clause. Other table
/// constraints are ignored.
pub fn parse_create_table(sql: &str) -> Result<TableDescriptor> {
    let text: String = sql
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim().trim_end_matches(';').trim_end();

    let rest = strip_keyword(text, "CREATE")
        .and_then(|r| strip_keyword(r, "TABLE"))
        .ok_or_else(|| parse_error("<unknown>", "not a CREATE TABLE statement"))?;

    let (raw_name, rest) = take_identifier(rest);
    let name = unquote(raw_name);
    if name.is_empty() {
        return Err(parse_error("<unknown>", "missing table name"));
    }

    let rest = rest.trim_start();
    if !rest.starts_with('(') || !rest.ends_with(')') {
        return Err(parse_error(&name, "missing column list"));
    }
    let body = &rest[1..rest.len() - 1];

    let mut table = TableDescriptor::new(name.clone());
    for item in split_top_level(body, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if let Some(constraint) = strip_keyword(item, "CONSTRAINT") {
            let (_, clause) = take_identifier(constraint);
            if let Some(cols) = strip_keyword(clause, "PRIMARY").and_then(|r| strip_keyword(r, "KEY")) {
                let cols = cols.trim();
                if !cols.starts_with('(') || !cols.ends_with(')') {
                    return Err(parse_error(&name, "malformed primary key clause"));
                }
                table.primary_key = split_top_level(&cols[1..cols.len() - 1], ',')
                    .into_iter()
                    .map(unquote)
                    .collect();
            }
            continue;
        }
        table.columns.push(parse_column(&name, item)?);
    }

    Ok(table)
}

fn parse_column(table: &str, item: &str) -> Result<ColumnDescriptor> {
    let (raw_name, rest) = take_identifier(item);
    let mut rest = rest.trim();

    let mut is_nullable = true;
    if let Some(stripped) = strip_suffix_keyword(rest, "NOT NULL") {
        is_nullable = false;
        rest = stripped;
    }

    let (data_type, default) = match find_top_level_keyword(rest, "DEFAULT") {
        Some(pos) => (
            rest[..pos].trim(),
            Some(rest[pos + "DEFAULT".len()..].trim().to_string()),
        ),
        None => (rest, None),
    };
    if data_type.is_empty() {
        return Err(parse_error(table, &format!("column {} has no type", raw_name)));
    }

    Ok(ColumnDescriptor {
        name: unquote(raw_name),
        data_type: data_type.to_string(),
        is_nullable,
        default,
    })
}

fn parse_error(table: &str, message: &str) -> MigrateError {
    MigrateError::validation(table, format!("cannot parse CREATE TABLE: {}", message))
}

/// Strip a leading case-insensitive keyword followed by whitespace or `(`.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let s = s.trim_start();
    match s.get(..keyword.len()) {
        Some(head) if head.eq_ignore_ascii_case(keyword) => {}
        _ => return None,
    }
    let rest = &s[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '(' => Some(rest.trim_start()),
        _ => None,
    }
}

fn strip_suffix_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    if s.len() <= keyword.len() {
        return None;
    }
    let split = s.len() - keyword.len();
    if !s.is_char_boundary(split) || !s[split..].eq_ignore_ascii_case(keyword) {
        return None;
    }
    let head = &s[..split];
    head.ends_with(char::is_whitespace).then(|| head.trim_end())
}

/// Split the leading identifier (bare or double-quoted) off `s`.
fn take_identifier(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    if s.starts_with('"') {
        let bytes = s.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == b'"' {
                if bytes.get(i + 1) == Some(&b'"') {
                    i += 2;
                    continue;
                }
                return (&s[..=i], &s[i + 1..]);
            }
            i += 1;
        }
        return (s, "");
    }
    let end = s
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Split on `sep` outside quotes and parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 && !in_single && !in_double => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Byte offset of a whitespace-delimited keyword outside quotes and parentheses.
fn find_top_level_keyword(s: &str, keyword: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_ws = false;

    for (i, c) in s.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => depth = depth.saturating_sub(1),
            _ => {}
        }
        if prev_ws && depth == 0 && !in_single && !in_double {
            let tail = &s[i..];
            if tail.len() >= keyword.len()
                && tail.is_char_boundary(keyword.len())
                && tail[..keyword.len()].eq_ignore_ascii_case(keyword)
                && tail[keyword.len()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
            {
                return Some(i);
            }
        }
        prev_ws = c.is_whitespace();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> TableDescriptor {
        TableDescriptor {
            name: "users".into(),
            columns: vec![
                ColumnDescriptor::new("id", "integer", false)
                    .with_default("nextval('users_id_seq'::regclass)"),
                ColumnDescriptor::new("email", "text", false),
                ColumnDescriptor::new("meta", "json", true),
            ],
            primary_key: vec!["id".into()],
        }
    }

    #[test]
    fn test_render_create_table() {
        let sql = render_create_table(&users_table()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE users (\n\
             \x20   id integer DEFAULT nextval('users_id_seq'::regclass) NOT NULL,\n\
             \x20   email text NOT NULL,\n\
             \x20   meta json,\n\
             \x20   CONSTRAINT pk_users PRIMARY KEY (id)\n\
             );"
        );
    }

    #[test]
    fn test_table_without_pk_has_no_constraint() {
        let mut table = users_table();
        table.primary_key.clear();
        let sql = render_create_table(&table).unwrap();
        assert!(!sql.contains("CONSTRAINT"));
    }

    #[test]
    fn test_zero_columns_is_validation_error() {
        let table = TableDescriptor::new("empty");
        assert!(matches!(
            render_create_table(&table),
            Err(MigrateError::Validation { .. })
        ));
    }

    #[test]
    fn test_unknown_pk_column_is_validation_error() {
        let mut table = users_table();
        table.primary_key = vec!["missing".into()];
        let err = render_create_table(&table).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_schema_round_trip() {
        let tables = vec![
            users_table(),
            TableDescriptor {
                name: "Order Lines".into(),
                columns: vec![
                    ColumnDescriptor::new("order", "bigint", false),
                    ColumnDescriptor::new("line", "smallint", false),
                    ColumnDescriptor::new("price", "numeric(10,2)", true).with_default("0.00"),
                    ColumnDescriptor::new("note", "character varying(80)", true)
                        .with_default("'n/a, DEFAULT; (x)'::character varying"),
                    ColumnDescriptor::new("Tags", "text[]", true),
                    ColumnDescriptor::new("created", "timestamp without time zone", false)
                        .with_default("now()"),
                ],
                primary_key: vec!["order".into(), "line".into()],
            },
        ];

        for table in tables {
            let sql = render_create_table(&table).unwrap();
            let parsed = parse_create_table(&sql).unwrap();
            assert_eq!(parsed, table, "round trip failed for:\n{}", sql);
        }
    }

    #[test]
    fn test_render_sequence() {
        let seq = SequenceDescriptor {
            name: "users_id_seq".into(),
            data_type: Some("bigint".into()),
            start: 1,
            min: 1,
            max: i64::MAX,
            increment: 1,
        };
        assert_eq!(
            render_sequence(&seq),
            "CREATE SEQUENCE users_id_seq\n    AS bigint\n    INCREMENT 1\n    START 1\n    \
             MINVALUE 1\n    MAXVALUE 9223372036854775807;"
        );
    }

    #[test]
    fn test_render_foreign_key() {
        let fk = ForeignKeyDescriptor::simple("fk_orders_user", "orders", "user_id", "users", "id");
        assert_eq!(
            render_foreign_key(&fk),
            "ALTER TABLE orders ADD CONSTRAINT fk_orders_user FOREIGN KEY (user_id) REFERENCES users(id);"
        );

        let mut cascading = fk.clone();
        cascading.on_delete = "CASCADE".into();
        cascading.on_update = "SET_NULL".into();
        assert!(render_foreign_key(&cascading)
            .ends_with("REFERENCES users(id) ON DELETE CASCADE ON UPDATE SET NULL;"));
    }
}
