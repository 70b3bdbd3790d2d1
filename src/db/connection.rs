use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use tracing::log::LevelFilter;

use crate::constants::CONNECT_TIMEOUT;
use crate::error::{FixtureError, Result};

/// Mask password in database URL for display
pub fn mask_url_password(url: &str) -> String {
    let Some((protocol, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    if let Some((user_info, host_and_path)) = rest.split_once('@')
        && let Some((username, _password)) = user_info.split_once(':')
    {
        return format!("{}://{}:***@{}", protocol, username, host_and_path);
    }

    url.to_string()
}

/// Parse a PostgreSQL connection URL, rejecting anything else as a configuration error
pub fn parse_connection_url(url: &str) -> Result<PgConnectOptions> {
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(FixtureError::Configuration(format!(
            "expected a postgres:// URL, got '{}'",
            mask_url_password(url)
        )));
    }

    PgConnectOptions::from_str(url).map_err(|e| {
        FixtureError::Configuration(format!(
            "malformed server URL '{}': {}",
            mask_url_password(url),
            e
        ))
    })
}

/// Replace the database path of a server URL, keeping credentials and query parameters
pub fn database_url(server_url: &str, database: &str) -> String {
    let (base, query) = match server_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (server_url, None),
    };

    let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
    let base = match base[authority_start..].find('/') {
        Some(slash) => &base[..authority_start + slash],
        None => base,
    };

    match query {
        Some(query) => format!("{}/{}?{}", base, database, query),
        None => format!("{}/{}", base, database),
    }
}

/// Open a single, unpooled connection bounded by the fixture connect timeout
///
/// Fixture operations never share connections: pooled idle sessions would keep the
/// database busy and make snapshot restores fail.
pub async fn connect_unpooled(url: &str) -> Result<PgConnection> {
    connect_unpooled_with_timeout(url, CONNECT_TIMEOUT).await
}

pub async fn connect_unpooled_with_timeout(url: &str, timeout: Duration) -> Result<PgConnection> {
    let options = parse_connection_url(url)?
        .log_slow_statements(LevelFilter::Off, Duration::from_secs(0));

    let operation = || format!("Connect to {}", mask_url_password(url));

    match tokio::time::timeout(timeout, PgConnection::connect_with(&options)).await {
        Ok(Ok(conn)) => {
            debug!("Opened connection to {}", mask_url_password(url));
            Ok(conn)
        }
        Ok(Err(e)) => Err(FixtureError::execution(operation(), e)),
        Err(_) => Err(FixtureError::execution(
            operation(),
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

/// Close a connection, logging instead of failing when the server already hung up
pub async fn close_connection(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!("Ignoring error while closing connection: {}", e);
    }
}
