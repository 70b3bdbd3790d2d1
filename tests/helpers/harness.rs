use pgfixture::config::{DatabaseConfiguration, DatabaseDefinition, unique_database_name};
use pgfixture::fixture::FixtureContext;
use pgfixture::resources::MemoryStore;
use std::sync::Arc;
use tempfile::TempDir;

use super::fakes::{FAKE_SERVER_URL, FakeRunner, FakeServer};

/// Schema scripts and test scripts for an orders database
pub fn orders_store() -> MemoryStore {
    MemoryStore::new()
        .with(
            "Orders.Schema.Tables.Customers.sql",
            "CREATE TABLE customers (id INT PRIMARY KEY, name TEXT NOT NULL);",
        )
        .with(
            "Orders.Schema.Tables.Orders.sql",
            "CREATE TABLE orders (id INT PRIMARY KEY, customer_id INT REFERENCES customers(id));",
        )
        .with(
            "Orders.Schema.Views.OrderCounts.sql",
            "CREATE VIEW order_counts AS SELECT customer_id, count(*) FROM orders GROUP BY customer_id;",
        )
        .with(
            "Orders.TestScripts.SeedCustomers.sql",
            "INSERT INTO customers VALUES (1, 'Ada'), (2, 'Grace');",
        )
}

pub fn orders_definition() -> DatabaseDefinition {
    DatabaseDefinition::new("Orders.Schema", "Orders.TestScripts").with_resources([
        "Tables.Customers",
        "Tables.Orders",
        "Views.OrderCounts",
    ])
}

/// A fixture context wired to in-memory collaborators
pub struct FakeEnvironment {
    pub server: Arc<FakeServer>,
    pub snapshot_dir: TempDir,
    store: Arc<MemoryStore>,
}

impl FakeEnvironment {
    pub fn new() -> Self {
        Self::with_store(orders_store())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            server: FakeServer::new(),
            snapshot_dir: TempDir::new().expect("Failed to create snapshot directory"),
            store: Arc::new(store),
        }
    }

    pub fn context(&self) -> FixtureContext {
        FixtureContext::new(
            self.server.clone(),
            FakeRunner::new(self.server.clone()),
            self.store.clone(),
        )
        .with_snapshot_dir(self.snapshot_dir.path())
    }

    pub fn configuration(&self, database: &str) -> DatabaseConfiguration {
        DatabaseConfiguration::new(FAKE_SERVER_URL, database)
    }
}

/// Connection to a live PostgreSQL server, when `DATABASE_URL` names one
pub struct PgTestInstance {
    pub server_url: String,
}

impl PgTestInstance {
    /// `None` (with a message) when no server is configured, so live tests can skip
    pub async fn try_new() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(server_url) = std::env::var("DATABASE_URL") else {
            eprintln!("Skipping test: DATABASE_URL is not set");
            return None;
        };

        if let Err(e) = pgfixture::db::connection::connect_unpooled(&server_url).await {
            eprintln!("Skipping test: cannot connect to DATABASE_URL: {}", e);
            return None;
        }

        Some(Self { server_url })
    }

    /// A configuration for a database no other test uses
    pub fn configuration(&self, prefix: &str) -> DatabaseConfiguration {
        DatabaseConfiguration::new(self.server_url.clone(), unique_database_name(prefix))
    }
}
