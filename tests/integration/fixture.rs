use crate::helpers::harness::{PgTestInstance, orders_definition, orders_store};
use anyhow::Result;
use pgfixture::config::DatabaseConfiguration;
use pgfixture::db::{DatabaseServer, PgServer};
use pgfixture::fixture::{FixtureContext, FixtureDatabase, with_fixture};
use sqlx::Connection;
use std::sync::Arc;
use tempfile::TempDir;

fn live_context(
    configuration: &DatabaseConfiguration,
    snapshot_dir: &TempDir,
) -> Result<FixtureContext> {
    Ok(FixtureContext::postgres(configuration, Arc::new(orders_store()))?
        .with_snapshot_dir(snapshot_dir.path()))
}

async fn customer_count(fixture: &FixtureDatabase) -> Result<i64> {
    let mut conn = fixture.connect().await?;
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM customers")
        .fetch_one(&mut conn)
        .await?;
    conn.close().await?;
    Ok(count)
}

#[tokio::test]
async fn test_full_lifecycle() -> Result<()> {
    let Some(instance) = PgTestInstance::try_new().await else {
        return Ok(());
    };
    let snapshot_dir = TempDir::new()?;
    let configuration = instance.configuration("lifecycle");
    let name = configuration.database_name.clone();

    let fixture = FixtureDatabase::provision(
        live_context(&configuration, &snapshot_dir)?,
        orders_definition(),
        configuration,
    )
    .await?;
    assert!(fixture.deployment_successful());
    assert_eq!(fixture.deployment().unwrap().applied_count, 3);

    let mut conn = fixture.connect().await?;
    let views: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM information_schema.views WHERE table_name = 'order_counts'",
    )
    .fetch_one(&mut conn)
    .await?;
    assert_eq!(views, 1);
    let journaled: Vec<String> =
        sqlx::query_scalar("SELECT script_name FROM public.schema_versions ORDER BY script_name")
            .fetch_all(&mut conn)
            .await?;
    assert_eq!(
        journaled,
        vec![
            "00000-Tables.Customers",
            "00001-Tables.Orders",
            "00002-Views.OrderCounts"
        ]
    );
    conn.close().await?;

    fixture.dispose().await?;

    let server = PgServer::new(instance.server_url.clone())?;
    assert!(!server.database_exists(&name).await?);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_round_trip() -> Result<()> {
    let Some(instance) = PgTestInstance::try_new().await else {
        return Ok(());
    };
    let snapshot_dir = TempDir::new()?;
    let configuration = instance.configuration("snapshot");
    let name = configuration.database_name.clone();

    let fixture = FixtureDatabase::provision(
        live_context(&configuration, &snapshot_dir)?,
        orders_definition(),
        configuration,
    )
    .await?;

    fixture.create_snapshot().await?;
    fixture.run_script("SeedCustomers").await?;
    assert_eq!(customer_count(&fixture).await?, 2);

    fixture.restore_snapshot().await?;
    assert_eq!(customer_count(&fixture).await?, 0);

    // A second cycle starts from the same snapshot
    fixture.run_script("SeedCustomers").await?;
    fixture.restore_snapshot().await?;
    assert_eq!(customer_count(&fixture).await?, 0);

    fixture.dispose().await?;

    let server = PgServer::new(instance.server_url.clone())?;
    assert!(!server.database_exists(&name).await?);
    assert!(!server.database_exists(&format!("Snapshot-{}", name)).await?);
    Ok(())
}

#[tokio::test]
async fn test_restore_fails_with_open_session() -> Result<()> {
    let Some(instance) = PgTestInstance::try_new().await else {
        return Ok(());
    };
    let snapshot_dir = TempDir::new()?;
    let configuration = instance.configuration("busy");

    let fixture = FixtureDatabase::provision(
        live_context(&configuration, &snapshot_dir)?,
        orders_definition(),
        configuration,
    )
    .await?;
    fixture.create_snapshot().await?;

    let conn = fixture.connect().await?;
    assert!(fixture.restore_snapshot().await.is_err());
    conn.close().await?;

    fixture.restore_snapshot().await?;
    fixture.dispose().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_deploy_against_live_server() -> Result<()> {
    let Some(instance) = PgTestInstance::try_new().await else {
        return Ok(());
    };
    let snapshot_dir = TempDir::new()?;
    let store = orders_store().with(
        "Orders.Schema.Tables.Orders.sql",
        "CREATE TABLE orders (id INT REFERENCES no_such_table(id));",
    );
    let configuration = instance.configuration("broken");
    let context = FixtureContext::postgres(&configuration, Arc::new(store))?
        .with_snapshot_dir(snapshot_dir.path());

    let fixture = FixtureDatabase::provision(context, orders_definition(), configuration).await?;

    let outcome = fixture.deployment().unwrap();
    assert!(!outcome.successful);
    assert_eq!(outcome.applied_count, 1);
    assert_eq!(outcome.failed_script.as_deref(), Some("00001-Tables.Orders"));
    assert!(outcome.error.as_deref().unwrap().contains("no_such_table"));
    assert!(fixture.connection_string().is_err());

    fixture.dispose().await?;
    Ok(())
}

#[tokio::test]
async fn test_with_fixture_leaves_nothing_behind() -> Result<()> {
    let Some(instance) = PgTestInstance::try_new().await else {
        return Ok(());
    };
    let snapshot_dir = TempDir::new()?;
    let configuration = instance.configuration("scoped");
    let name = configuration.database_name.clone();

    let seeded = with_fixture(
        live_context(&configuration, &snapshot_dir)?,
        orders_definition(),
        configuration,
        async |db| -> Result<i64> {
            db.create_snapshot().await?;
            db.run_script("SeedCustomers").await?;
            customer_count(db).await
        },
    )
    .await??;
    assert_eq!(seeded, 2);

    let server = PgServer::new(instance.server_url.clone())?;
    assert!(!server.database_exists(&name).await?);
    assert!(!server.database_exists(&format!("Snapshot-{}", name)).await?);
    Ok(())
}
