use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::PgConnection;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info};

use super::{MigrationRunner, RunResult};
use crate::constants::{DEFAULT_JOURNAL_SCHEMA, DEFAULT_JOURNAL_TABLE};
use crate::db::connection::{close_connection, connect_unpooled};
use crate::db::error_context::describe_sql_error;
use crate::error::{FixtureError, Result};
use crate::selector::OrderedScript;

/// Schema-qualified journal table recording applied scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalTable {
    pub schema: String,
    pub name: String,
}

impl Default for JournalTable {
    fn default() -> Self {
        Self {
            schema: DEFAULT_JOURNAL_SCHEMA.to_string(),
            name: DEFAULT_JOURNAL_TABLE.to_string(),
        }
    }
}

impl JournalTable {
    /// Quoted `"schema"."name"`, validating both parts as plain identifiers
    pub fn qualified_name(&self) -> Result<String> {
        fn is_valid_sql_identifier(name: &str) -> bool {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) if first.is_alphabetic() || first == '_' => {
                    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
                }
                _ => false,
            }
        }

        for (part, value) in [("schema", &self.schema), ("table", &self.name)] {
            if !is_valid_sql_identifier(value) {
                return Err(FixtureError::Configuration(format!(
                    "Invalid journal {} name '{}': must contain only letters, numbers, underscores, and dollar signs, starting with letter or underscore",
                    part, value
                )));
            }
        }

        Ok(format!(r#""{}"."{}""#, self.schema, self.name))
    }
}

/// Checksum stored alongside each journaled script
pub fn calculate_checksum(content: &str) -> String {
    format!("{:x}", md5::compute(content))
}

/// [`MigrationRunner`] that records applied scripts in a journal table
///
/// Scripts already present in the journal are skipped, so re-running a sequence
/// against the same database only applies what is new.
#[derive(Debug, Clone)]
pub struct JournaledRunner {
    journal: JournalTable,
    transactional: bool,
}

impl Default for JournaledRunner {
    fn default() -> Self {
        Self {
            journal: JournalTable::default(),
            transactional: true,
        }
    }
}

impl JournaledRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: JournalTable) -> Self {
        self.journal = journal;
        self
    }

    /// Run each script in its own transaction (default) or directly on the session.
    ///
    /// Scripts containing statements such as `CREATE INDEX CONCURRENTLY` need the
    /// non-transactional mode.
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    async fn ensure_journal(&self, conn: &mut PgConnection, table: &str) -> sqlx::Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                script_name TEXT PRIMARY KEY,
                checksum TEXT NOT NULL,
                applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            table
        );
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&ddl)).await?;
        Ok(())
    }

    async fn applied_scripts(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> sqlx::Result<HashSet<String>> {
        let names: Vec<String> =
            sqlx::query_scalar(&format!("SELECT script_name FROM {}", table))
                .fetch_all(&mut *conn)
                .await?;
        Ok(names.into_iter().collect())
    }

    async fn apply_script(
        &self,
        conn: &mut PgConnection,
        table: &str,
        script: &OrderedScript,
    ) -> std::result::Result<(), String> {
        let record_sql = format!(
            "INSERT INTO {} (script_name, checksum) VALUES ($1, $2)",
            table
        );
        let checksum = calculate_checksum(script.content());
        let has_content = !script.content().trim().is_empty();
        let describe = |e: sqlx::Error| describe_sql_error(&e, script.name(), script.content());

        if self.transactional {
            let mut tx = conn.begin().await.map_err(describe)?;
            if has_content {
                sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(script.content()))
                    .await
                    .map_err(describe)?;
            }
            sqlx::query(&record_sql)
                .bind(script.name())
                .bind(&checksum)
                .execute(&mut *tx)
                .await
                .map_err(describe)?;
            tx.commit().await.map_err(describe)?;
        } else {
            if has_content {
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(script.content()))
                    .await
                    .map_err(describe)?;
            }
            sqlx::query(&record_sql)
                .bind(script.name())
                .bind(&checksum)
                .execute(&mut *conn)
                .await
                .map_err(describe)?;
        }

        Ok(())
    }

    async fn apply_on(&self, conn: &mut PgConnection, scripts: &[OrderedScript]) -> RunResult {
        let table = match self.journal.qualified_name() {
            Ok(table) => table,
            Err(e) => return RunResult::failed(0, None, e),
        };

        debug!("Checking whether journal table {} exists", table);
        if let Err(e) = self.ensure_journal(conn, &table).await {
            return RunResult::failed(0, None, format!("Failed to create journal {}: {}", table, e));
        }

        let already_applied = match self.applied_scripts(conn, &table).await {
            Ok(names) => names,
            Err(e) => {
                return RunResult::failed(0, None, format!("Failed to read journal {}: {}", table, e));
            }
        };

        let mut applied = 0;
        for script in scripts {
            if already_applied.contains(script.name()) {
                debug!("Skipping already applied script: {}", script.name());
                continue;
            }

            info!("Executing script: {}", script.name());
            if let Err(message) = self.apply_script(conn, &table, script).await {
                error!("Script {} failed: {}", script.name(), message);
                return RunResult::failed(applied, Some(script.name().to_string()), message);
            }
            applied += 1;
        }

        RunResult::succeeded(applied)
    }
}

#[async_trait]
impl MigrationRunner for JournaledRunner {
    async fn apply(&self, scripts: &[OrderedScript], connection_string: &str) -> RunResult {
        let started = Instant::now();
        info!("Applying {} script(s)", scripts.len());

        let mut conn = match connect_unpooled(connection_string).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Unable to connect for deployment: {}", e);
                return RunResult::failed(0, None, e);
            }
        };

        let result = self.apply_on(&mut conn, scripts).await;
        close_connection(conn).await;

        if result.successful {
            info!(
                "Applied {} script(s) [{} ms]",
                result.applied_count,
                started.elapsed().as_millis()
            );
        } else {
            error!(
                "Deployment stopped after {} script(s) [{} ms]",
                result.applied_count,
                started.elapsed().as_millis()
            );
        }

        result
    }
}
