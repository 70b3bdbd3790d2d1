//! Readable descriptions of PostgreSQL failures for deployed and ad-hoc scripts.

use sqlx::postgres::{PgDatabaseError, PgErrorPosition};

const CONTEXT_LINES: usize = 3;

/// Structured pieces of a PostgreSQL error
#[derive(Debug, Clone, Default)]
pub struct SqlErrorContext {
    pub message: String,
    /// 1-indexed line within the executed script
    pub line_number: Option<usize>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// PL/pgSQL or statement context reported by the server
    pub context: Option<String>,
    /// SQLSTATE, e.g. `55006` when the database is in use
    pub code: Option<String>,
}

impl SqlErrorContext {
    pub fn from_sqlx_error(error: &sqlx::Error, sql: &str) -> Self {
        let Some(pg_error) = error
            .as_database_error()
            .and_then(|db_error| db_error.try_downcast_ref::<PgDatabaseError>())
        else {
            return Self {
                message: error.to_string(),
                ..Self::default()
            };
        };

        let line_number = pg_error.position().map(|position| {
            let offset = match position {
                PgErrorPosition::Original(p) => p,
                PgErrorPosition::Internal { position, .. } => position,
            };
            position_to_line(sql, offset)
        });

        Self {
            message: pg_error.message().to_string(),
            line_number,
            detail: pg_error.detail().map(str::to_string),
            hint: pg_error.hint().map(str::to_string),
            context: pg_error.r#where().map(str::to_string),
            code: Some(pg_error.code().to_string()),
        }
    }

    /// Render as a multi-line message naming the script it came from
    pub fn describe(&self, script: &str, sql: &str) -> String {
        let mut out = format!("SQL error in '{}'", script);
        if let Some(line) = self.line_number {
            out.push_str(&format!(" at line {}", line));
        }
        out.push_str(&format!(": {}", self.message));

        for (label, value) in [
            ("Detail", &self.detail),
            ("Hint", &self.hint),
            ("Context", &self.context),
        ] {
            if let Some(value) = value {
                out.push_str(&format!("\n  {}: {}", label, value));
            }
        }

        if let Some(line) = self.line_number {
            out.push_str("\n\n");
            out.push_str(&format_line_context(sql, line));
        }

        out
    }
}

/// Shorthand for [`SqlErrorContext::describe`]
pub fn describe_sql_error(error: &sqlx::Error, script: &str, sql: &str) -> String {
    SqlErrorContext::from_sqlx_error(error, sql).describe(script, sql)
}

/// Convert a 1-indexed character position into a line number
pub fn position_to_line(content: &str, position: usize) -> usize {
    content
        .chars()
        .take(position.saturating_sub(1))
        .filter(|c| *c == '\n')
        .count()
        + 1
}

/// Show the failing line with a few lines of context on either side
pub fn format_line_context(content: &str, error_line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let error_idx = error_line.saturating_sub(1).min(lines.len());
    let start = error_idx.saturating_sub(CONTEXT_LINES);
    let end = (error_idx + CONTEXT_LINES + 1).min(lines.len());
    let width = end.to_string().len();

    let mut out = String::new();
    if start > 0 {
        out.push_str(&format!("  ... [{} lines above]\n", start));
    }
    for (offset, line) in lines[start..end].iter().enumerate() {
        let number = start + offset + 1;
        let marker = if number == error_line { ">" } else { " " };
        out.push_str(&format!("{} {:>width$} | {}\n", marker, number, line, width = width));
    }
    if end < lines.len() {
        out.push_str(&format!("  ... [{} lines below]\n", lines.len() - end));
    }

    out
}
