pub const LESSON_SCHEMA_SQL: &str = include_str!("../../sql/lesson_schema.sql");
pub const SCHEMA_VERSION: &str = "1";

/// Splits a schema script into statements, ignoring `;` inside quotes and
/// dropping `--` comment lines.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in sql.lines() {
        if line.trim_start().starts_with("--") {
            continue;
        }
        for ch in line.chars() {
            match ch {
                '\'' if !in_double_quote => in_single_quote = !in_single_quote,
                '"' if !in_single_quote => in_double_quote = !in_double_quote,
                ';' if !in_single_quote && !in_double_quote => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_schema_into_statements() {
        let statements = split_sql_statements(LESSON_SCHEMA_SQL);
        assert_eq!(statements.len(), 4);
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS \"lessons\""));
        assert!(statements.iter().all(|s| !s.contains("--")));
    }

    #[test]
    fn keeps_semicolons_inside_quotes() {
        let statements = split_sql_statements("INSERT INTO t VALUES ('a;b');\n-- note\nSELECT 1;");
        assert_eq!(statements, vec!["INSERT INTO t VALUES ('a;b')", "SELECT 1"]);
    }
}
