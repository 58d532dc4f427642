//! Statement splitting for generated scripts.

/// Split script text into executable statements.
///
/// Lines whose trimmed content starts with `--` are dropped unless they sit
/// inside a literal that spans lines. The rest is split on `;` outside
/// single-quoted literals and double-quoted identifiers. Doubled quotes
/// inside either are handled by toggling twice. Statements are trimmed and
/// empty ones discarded.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for line in script.split_inclusive('\n') {
        if quote.is_none() && line.trim_start().starts_with("--") {
            continue;
        }
        for c in line.chars() {
            match (quote, c) {
                (None, '\'' | '"') => {
                    quote = Some(c);
                    current.push(c);
                }
                (Some(q), _) if c == q => {
                    quote = None;
                    current.push(c);
                }
                (None, ';') => {
                    push_statement(&mut statements, &current);
                    current.clear();
                }
                _ => current.push(c),
            }
        }
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
}

/// First `max` characters of a statement for error reports.
pub fn preview(statement: &str, max: usize) -> String {
    statement.chars().take(max).collect()
}
