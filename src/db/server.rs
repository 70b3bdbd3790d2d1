//! The database engine seam used by the fixture lifecycle.
//!
//! [`PgServer`] runs administrative statements against the server's maintenance
//! database and script content against the fixture database. Every call opens its
//! own connection and closes it before returning, whatever the outcome.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use tracing::debug;

use super::connection::{close_connection, connect_unpooled, database_url, parse_connection_url};
use super::error_context::describe_sql_error;
use super::quote_ident;
use crate::error::{FixtureError, Result};

/// Server-level operations a fixture needs from its engine.
#[async_trait]
pub trait DatabaseServer: Send + Sync {
    /// Connection string for a database on this server.
    fn database_url(&self, database: &str) -> String;

    async fn database_exists(&self, database: &str) -> Result<bool>;

    /// Create an empty database.
    async fn create_database(&self, database: &str) -> Result<()>;

    /// Create `target` as a copy of `source`. Fails while `source` has other sessions.
    async fn clone_database(&self, source: &str, target: &str) -> Result<()>;

    /// Drop a database. Fails while it has other sessions.
    async fn drop_database(&self, database: &str) -> Result<()>;

    /// Run raw SQL inside `database`; `label` names the SQL in error messages.
    async fn execute(&self, database: &str, label: &str, sql: &str) -> Result<()>;
}

/// PostgreSQL implementation of [`DatabaseServer`].
#[derive(Debug, Clone)]
pub struct PgServer {
    server_url: String,
}

impl PgServer {
    /// `server_url` must point at a maintenance database, usually `postgres`.
    pub fn new(server_url: impl Into<String>) -> Result<Self> {
        let server_url = server_url.into();
        parse_connection_url(&server_url)?;
        Ok(Self { server_url })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn run_admin(&self, operation: &str, sql: &str) -> Result<()> {
        debug!("SQL: {}", sql);
        let mut conn = connect_unpooled(&self.server_url).await?;
        let result = sqlx::Executor::execute(&mut conn, sqlx::raw_sql(sql)).await;
        close_connection(conn).await;

        result
            .map(|_| ())
            .map_err(|e| FixtureError::execution(operation, describe_sql_error(&e, operation, sql)))
    }
}

async fn fetch_database_exists(conn: &mut PgConnection, database: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(database)
        .fetch_one(conn)
        .await
}

#[async_trait]
impl DatabaseServer for PgServer {
    fn database_url(&self, database: &str) -> String {
        database_url(&self.server_url, database)
    }

    async fn database_exists(&self, database: &str) -> Result<bool> {
        let mut conn = connect_unpooled(&self.server_url).await?;
        let result = fetch_database_exists(&mut conn, database).await;
        close_connection(conn).await;

        result.map_err(|e| {
            FixtureError::execution(format!("Check whether database {} exists", database), e)
        })
    }

    async fn create_database(&self, database: &str) -> Result<()> {
        self.run_admin(
            &format!("Create database {}", database),
            &format!("CREATE DATABASE {}", quote_ident(database)),
        )
        .await
    }

    async fn clone_database(&self, source: &str, target: &str) -> Result<()> {
        self.run_admin(
            &format!("Clone database {} into {}", source, target),
            &format!(
                "CREATE DATABASE {} TEMPLATE {}",
                quote_ident(target),
                quote_ident(source)
            ),
        )
        .await
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        self.run_admin(
            &format!("Drop database {}", database),
            &format!("DROP DATABASE {}", quote_ident(database)),
        )
        .await
    }

    async fn execute(&self, database: &str, label: &str, sql: &str) -> Result<()> {
        let mut conn = connect_unpooled(&self.database_url(database)).await?;
        let result = sqlx::Executor::execute(&mut conn, sqlx::raw_sql(sql)).await;
        close_connection(conn).await;

        match result {
            Ok(done) => {
                debug!("{} affected {} row(s)", label, done.rows_affected());
                Ok(())
            }
            Err(e) => Err(FixtureError::execution(
                format!("Execute {}", label),
                describe_sql_error(&e, label, sql),
            )),
        }
    }
}
