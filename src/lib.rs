//! Ephemeral PostgreSQL databases for integration tests.
//!
//! A [`FixtureDatabase`] creates a database, deploys an explicitly ordered selection of
//! SQL scripts into it, snapshots the deployed state so tests can reset to it, and drops
//! everything it created when it is disposed or dropped.

pub mod config;
pub mod constants;
pub mod db;
pub mod docker;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod resources;
pub mod runner;
pub mod selector;

pub use config::{DatabaseConfiguration, DatabaseDefinition, unique_database_name};
pub use error::{FixtureError, Result};
pub use fixture::{DeploymentOutcome, FixtureContext, FixtureDatabase, Snapshot, with_fixture};
pub use logging::LogHandle;
pub use resources::{
    DirectoryStore, EmbeddedStore, MemoryStore, ResourceStore, ScriptResource, discover_scripts,
};
pub use runner::{JournaledRunner, MigrationRunner, RunResult};
pub use selector::{OrderedScript, SelectionPolicy, select_scripts};
