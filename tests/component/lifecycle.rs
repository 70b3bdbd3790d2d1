//! Fixture lifecycle against the in-memory server

use crate::helpers::harness::{FakeEnvironment, orders_definition, orders_store};
use pgfixture::config::DatabaseDefinition;
use pgfixture::error::FixtureError;
use pgfixture::fixture::FixtureDatabase;

#[tokio::test]
async fn test_provision_deploys_in_inclusion_order() {
    let env = FakeEnvironment::new();
    let fixture = FixtureDatabase::provision(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .await
    .unwrap();

    assert!(fixture.deployment_successful());
    let outcome = fixture.deployment().unwrap();
    assert_eq!(outcome.planned, 3);
    assert_eq!(outcome.applied_count, 3);
    assert_eq!(
        fixture.connection_string().unwrap(),
        "memory://orders_test"
    );

    let contents = env.server.contents("orders_test").unwrap();
    assert_eq!(contents.len(), 3);
    assert!(contents[0].starts_with("CREATE TABLE customers"));
    assert!(contents[1].starts_with("CREATE TABLE orders"));
    assert!(contents[2].starts_with("CREATE VIEW order_counts"));

    fixture.dispose().await.unwrap();
    assert!(env.server.databases().is_empty());
}

#[tokio::test]
async fn test_unlisted_and_unknown_scripts_are_not_deployed() {
    let env = FakeEnvironment::new();
    let definition = DatabaseDefinition::new("Orders.Schema", "Orders.TestScripts")
        .with_resources(["Tables.Customers", "Tables.DoesNotExist"]);

    let fixture =
        FixtureDatabase::provision(env.context(), definition, env.configuration("orders_test"))
            .await
            .unwrap();

    let outcome = fixture.deployment().unwrap();
    assert!(outcome.successful);
    assert_eq!(outcome.planned, 1);
    assert_eq!(env.server.contents("orders_test").unwrap().len(), 1);

    fixture.dispose().await.unwrap();
}

#[tokio::test]
async fn test_failed_deploy_is_captured_not_thrown() {
    let env = FakeEnvironment::with_store(
        orders_store().with("Orders.Schema.Tables.Broken.sql", "CREATE TABLE FAIL"),
    );
    let definition = DatabaseDefinition::new("Orders.Schema", "Orders.TestScripts")
        .with_resources(["Tables.Customers", "Tables.Broken", "Tables.Orders"]);

    let fixture =
        FixtureDatabase::provision(env.context(), definition, env.configuration("orders_test"))
            .await
            .unwrap();

    assert!(!fixture.deployment_successful());
    let outcome = fixture.deployment().unwrap();
    assert_eq!(outcome.planned, 3);
    assert_eq!(outcome.applied_count, 1);
    assert_eq!(outcome.failed_script.as_deref(), Some("00001-Tables.Broken"));

    let err = fixture.connection_string().unwrap_err();
    assert!(matches!(err, FixtureError::State(_)));
    assert!(matches!(
        fixture.run_script("SeedCustomers").await,
        Err(FixtureError::State(_))
    ));

    fixture.dispose().await.unwrap();
    assert!(env.server.databases().is_empty());
}

#[tokio::test]
async fn test_duplicate_inclusion_fails_deployment_under_strict_policy() {
    let env = FakeEnvironment::new();
    let definition = DatabaseDefinition::new("Orders.Schema", "Orders.TestScripts")
        .with_resources(["Tables.Customers", "Tables.Customers"]);

    let fixture =
        FixtureDatabase::provision(env.context(), definition, env.configuration("orders_test"))
            .await
            .unwrap();

    let outcome = fixture.deployment().unwrap();
    assert!(!outcome.successful);
    assert_eq!(outcome.planned, 0);
    assert!(
        outcome
            .error
            .as_deref()
            .unwrap()
            .contains("Duplicate inclusion name 'Tables.Customers'")
    );
    // Runner never ran
    assert!(env.server.contents("orders_test").unwrap().is_empty());

    fixture.dispose().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_inclusion_redeploys_under_permissive_policy() {
    let env = FakeEnvironment::new();
    let definition = DatabaseDefinition::new("Orders.Schema", "Orders.TestScripts")
        .with_resources(["Tables.Customers", "Tables.Customers"])
        .allow_duplicates(true);

    let fixture =
        FixtureDatabase::provision(env.context(), definition, env.configuration("orders_test"))
            .await
            .unwrap();

    assert!(fixture.deployment_successful());
    assert_eq!(env.server.contents("orders_test").unwrap().len(), 2);

    fixture.dispose().await.unwrap();
}

#[tokio::test]
async fn test_connection_string_before_deploy_is_state_error() {
    let env = FakeEnvironment::new();
    let fixture = FixtureDatabase::new(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .unwrap();

    assert!(fixture.deployment().is_none());
    let err = fixture.connection_string().unwrap_err();
    assert_eq!(err.to_string(), "Database orders_test has not been deployed");

    fixture.dispose().await.unwrap();
}

#[tokio::test]
async fn test_new_performs_no_io_and_validates() {
    let env = FakeEnvironment::new();
    let err = FixtureDatabase::new(
        env.context(),
        orders_definition(),
        env.configuration("bad name"),
    )
    .unwrap_err();
    assert!(matches!(err, FixtureError::Configuration(_)));
    assert!(env.server.calls().is_empty());
}

#[tokio::test]
async fn test_create_cleans_up_leftovers() {
    let env = FakeEnvironment::new();
    env.server.seed_database("orders_test", &["stale"]);
    env.server.seed_database("Snapshot-orders_test", &["stale"]);

    let fixture = FixtureDatabase::new(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .unwrap();
    std::fs::write(&fixture.snapshot().file_path, "{}").unwrap();

    fixture.create().await.unwrap();

    assert_eq!(env.server.databases(), vec!["orders_test"]);
    assert!(env.server.contents("orders_test").unwrap().is_empty());
    assert!(!fixture.snapshot().file_path.exists());

    fixture.dispose().await.unwrap();
}

#[tokio::test]
async fn test_failed_create_disposes_and_propagates() {
    let env = FakeEnvironment::new();
    env.server.seed_database("Snapshot-orders_test", &["stale"]);
    env.server.fail_create(true);

    let err = FixtureDatabase::provision(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FixtureError::Execution { .. }));
    assert!(err.to_string().contains("permission denied"));
    assert!(env.server.databases().is_empty());
}

#[tokio::test]
async fn test_drop_if_exists_is_idempotent() {
    let env = FakeEnvironment::new();
    let fixture = FixtureDatabase::new(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .unwrap();

    fixture.drop_snapshot_if_exists().await.unwrap();
    fixture.drop_database_if_exists().await.unwrap();
    fixture.drop_database_if_exists().await.unwrap();

    assert!(!env.server.calls().iter().any(|c| c.starts_with("drop")));
    fixture.dispose().await.unwrap();
}

#[tokio::test]
async fn test_dispose_attempts_both_drops_and_returns_first_error() {
    let env = FakeEnvironment::new();
    let fixture = FixtureDatabase::provision(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .await
    .unwrap();
    fixture.create_snapshot().await.unwrap();

    env.server.set_busy("Snapshot-orders_test", true);
    let err = fixture.dispose().await.unwrap_err();

    assert!(err.to_string().contains("Snapshot-orders_test"));
    // The database drop still ran
    assert_eq!(env.server.databases(), vec!["Snapshot-orders_test"]);
}

#[tokio::test]
async fn test_drop_without_dispose_cleans_up() {
    let env = FakeEnvironment::new();
    {
        let fixture = FixtureDatabase::provision(
            env.context(),
            orders_definition(),
            env.configuration("orders_test"),
        )
        .await
        .unwrap();
        fixture.create_snapshot().await.unwrap();
        assert_eq!(env.server.databases().len(), 2);
    }

    assert!(env.server.databases().is_empty());
}

#[tokio::test]
async fn test_persist_keeps_database() {
    let env = FakeEnvironment::new();
    let fixture = FixtureDatabase::provision(
        env.context(),
        orders_definition(),
        env.configuration("orders_test"),
    )
    .await
    .unwrap();

    let kept = fixture.persist();
    assert_eq!(kept.database_name, "orders_test");
    assert_eq!(env.server.databases(), vec!["orders_test"]);
}
