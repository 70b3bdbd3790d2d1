//! Fixture databases: create, deploy, snapshot, restore, dispose.

mod database;
mod scope;
pub mod snapshot;

pub use database::FixtureDatabase;
pub use scope::with_fixture;
pub use snapshot::{Snapshot, SnapshotManifest};

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::DatabaseConfiguration;
use crate::db::{DatabaseServer, PgServer};
use crate::error::Result;
use crate::logging::LogHandle;
use crate::resources::ResourceStore;
use crate::runner::{JournaledRunner, MigrationRunner, RunResult};

/// Collaborators shared by fixtures.
///
/// Cloning is cheap; fixtures built from clones share the same server, runner, store
/// and log sink.
#[derive(Clone)]
pub struct FixtureContext {
    pub server: Arc<dyn DatabaseServer>,
    pub runner: Arc<dyn MigrationRunner>,
    pub resources: Arc<dyn ResourceStore>,
    pub log: LogHandle,
    /// Where snapshot manifests are written
    pub snapshot_dir: PathBuf,
}

impl FixtureContext {
    pub fn new(
        server: Arc<dyn DatabaseServer>,
        runner: Arc<dyn MigrationRunner>,
        resources: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            server,
            runner,
            resources,
            log: LogHandle::current(),
            snapshot_dir: std::env::temp_dir(),
        }
    }

    /// PostgreSQL server from `configuration.server` with the journaled runner.
    pub fn postgres(
        configuration: &DatabaseConfiguration,
        resources: Arc<dyn ResourceStore>,
    ) -> Result<Self> {
        let server = PgServer::new(configuration.server.clone())?;
        Ok(Self::new(
            Arc::new(server),
            Arc::new(JournaledRunner::new()),
            resources,
        ))
    }

    pub fn with_log(mut self, log: LogHandle) -> Self {
        self.log = log;
        self
    }

    pub fn with_snapshot_dir(mut self, snapshot_dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = snapshot_dir.into();
        self
    }
}

impl std::fmt::Debug for FixtureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureContext")
            .field("snapshot_dir", &self.snapshot_dir)
            .finish_non_exhaustive()
    }
}

/// Result of [`FixtureDatabase::deploy`].
///
/// A failed deployment is a value, not an error: the fixture stays inspectable and
/// every later use of its connection string fails instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentOutcome {
    pub successful: bool,
    /// Scripts selected for deployment
    pub planned: usize,
    pub applied_count: usize,
    pub failed_script: Option<String>,
    pub error: Option<String>,
}

impl DeploymentOutcome {
    pub fn from_run(planned: usize, run: RunResult) -> Self {
        Self {
            successful: run.successful,
            planned,
            applied_count: run.applied_count,
            failed_script: run.failed_script,
            error: run.error,
        }
    }

    /// Deployment that stopped before the runner was invoked.
    pub fn not_started(error: impl std::fmt::Display) -> Self {
        Self {
            successful: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}
