use sqlx::postgres::PgConnection;
use std::future::Future;
use std::time::Instant;
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use super::{DeploymentOutcome, FixtureContext, Snapshot};
use crate::config::{DatabaseConfiguration, DatabaseDefinition};
use crate::db::DatabaseServer;
use crate::db::connection::connect_unpooled;
use crate::error::{FixtureError, Result};
use crate::resources::{discover_scripts, read_test_script, test_script_resource_name};
use crate::selector::{select_scripts, unresolved_inclusions};

/// A database owned by a test fixture.
///
/// The fixture moves through create, deploy, snapshot and restore, and always ends with
/// its snapshot and database removed: by [`FixtureDatabase::dispose`], or by `Drop` when
/// the fixture goes out of scope without being disposed.
pub struct FixtureDatabase {
    context: FixtureContext,
    definition: DatabaseDefinition,
    configuration: DatabaseConfiguration,
    snapshot: Snapshot,
    deployment: Option<DeploymentOutcome>,
    span: Span,
    disposed: bool,
}

impl FixtureDatabase {
    /// Validate the configuration and derive the snapshot. No I/O happens here.
    pub fn new(
        context: FixtureContext,
        definition: DatabaseDefinition,
        configuration: DatabaseConfiguration,
    ) -> Result<Self> {
        configuration.validate()?;

        let snapshot = Snapshot::in_directory(&configuration.database_name, &context.snapshot_dir);
        let span = context
            .log
            .in_scope(|| info_span!("fixture", database = %configuration.database_name));

        Ok(Self {
            context,
            definition,
            configuration,
            snapshot,
            deployment: None,
            span,
            disposed: false,
        })
    }

    /// Create and deploy a fixture.
    ///
    /// A failed create disposes the fixture before the error is returned; a failed
    /// deploy does not, see [`FixtureDatabase::deploy`].
    pub async fn provision(
        context: FixtureContext,
        definition: DatabaseDefinition,
        configuration: DatabaseConfiguration,
    ) -> Result<Self> {
        let mut fixture = Self::new(context, definition, configuration)?;

        if let Err(e) = fixture.create().await {
            let log = fixture.context.log.clone();
            if let Err(cleanup) = fixture.dispose().await {
                log.in_scope(|| warn!("Cleanup after failed create also failed: {}", cleanup));
            }
            return Err(e);
        }

        fixture.deploy().await;
        Ok(fixture)
    }

    pub fn database_name(&self) -> &str {
        &self.configuration.database_name
    }

    pub fn definition(&self) -> &DatabaseDefinition {
        &self.definition
    }

    pub fn configuration(&self) -> &DatabaseConfiguration {
        &self.configuration
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Drop leftovers of earlier runs, then create an empty database.
    pub async fn create(&self) -> Result<()> {
        let server = self.server();
        self.traced(format!("Create database {}", self.database_name()), async {
            drop_snapshot(server, &self.snapshot).await?;
            drop_database(server, self.database_name()).await?;
            server.create_database(self.database_name()).await
        })
        .await
    }

    /// Discover, select and apply the definition's scripts.
    ///
    /// Never fails: the outcome records whether deployment succeeded and is kept for
    /// [`FixtureDatabase::connection_string`] to check.
    pub async fn deploy(&mut self) -> &DeploymentOutcome {
        let outcome = self
            .in_span(async {
                let started = Instant::now();
                info!(
                    "Deploying {} from namespace {}",
                    self.database_name(),
                    self.definition.resource_namespace
                );

                let outcome = self.deploy_scripts().await;
                let elapsed = started.elapsed().as_millis();
                if outcome.successful {
                    info!(
                        "Deployment succeeded: {}/{} script(s) applied [{} ms]",
                        outcome.applied_count, outcome.planned, elapsed
                    );
                } else {
                    error!(
                        "Deployment failed at {}: {} [{} ms]",
                        outcome.failed_script.as_deref().unwrap_or("setup"),
                        outcome.error.as_deref().unwrap_or("unknown error"),
                        elapsed
                    );
                }
                outcome
            })
            .await;

        self.deployment.insert(outcome)
    }

    async fn deploy_scripts(&self) -> DeploymentOutcome {
        let scripts = discover_scripts(
            self.context.resources.as_ref(),
            &self.definition.resource_namespace,
        );
        debug!("Discovered {} script(s)", scripts.len());

        let inclusions = self.definition.ordered_resources.as_slice();
        for missing in unresolved_inclusions(&scripts, inclusions) {
            warn!("Inclusion '{}' does not match any script", missing);
        }

        let ordered = match select_scripts(&scripts, inclusions, self.definition.selection_policy())
        {
            Ok(ordered) => ordered,
            Err(e) => return DeploymentOutcome::not_started(e),
        };

        let url = self.server().database_url(self.database_name());
        let run = self.context.runner.apply(&ordered, &url).await;
        DeploymentOutcome::from_run(ordered.len(), run)
    }

    /// `None` until [`FixtureDatabase::deploy`] has run.
    pub fn deployment(&self) -> Option<&DeploymentOutcome> {
        self.deployment.as_ref()
    }

    pub fn deployment_successful(&self) -> bool {
        self.deployment.as_ref().is_some_and(|d| d.successful)
    }

    /// Connection string of the deployed database.
    ///
    /// Fails with [`FixtureError::State`] unless deployment succeeded.
    pub fn connection_string(&self) -> Result<String> {
        match &self.deployment {
            Some(outcome) if outcome.successful => {
                Ok(self.server().database_url(self.database_name()))
            }
            Some(outcome) => Err(FixtureError::State(format!(
                "Database {} failed to deploy: {}",
                self.database_name(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ))),
            None => Err(FixtureError::State(format!(
                "Database {} has not been deployed",
                self.database_name()
            ))),
        }
    }

    /// Open an unpooled connection; close it before restoring a snapshot.
    pub async fn connect(&self) -> Result<PgConnection> {
        connect_unpooled(&self.connection_string()?).await
    }

    /// Capture the database's current state.
    pub async fn create_snapshot(&self) -> Result<()> {
        self.traced(format!("Create snapshot {}", self.snapshot.name), async {
            self.server()
                .clone_database(self.database_name(), &self.snapshot.name)
                .await?;
            self.snapshot.write_manifest(&self.configuration.server)
        })
        .await
    }

    /// Reset the database to the snapshot. No other session may be connected to it.
    pub async fn restore_snapshot(&self) -> Result<()> {
        let server = self.server();
        self.traced(format!("Restore snapshot {}", self.snapshot.name), async {
            if !server.database_exists(&self.snapshot.name).await? {
                return Err(FixtureError::State(format!(
                    "Snapshot {} does not exist; create it before restoring",
                    self.snapshot.name
                )));
            }
            server.drop_database(self.database_name()).await?;
            server
                .clone_database(&self.snapshot.name, self.database_name())
                .await
        })
        .await
    }

    pub async fn drop_snapshot_if_exists(&self) -> Result<()> {
        self.traced(
            format!("Drop snapshot {}", self.snapshot.name),
            drop_snapshot(self.server(), &self.snapshot),
        )
        .await
    }

    pub async fn drop_database_if_exists(&self) -> Result<()> {
        self.traced(
            format!("Drop database {}", self.database_name()),
            drop_database(self.server(), self.database_name()),
        )
        .await
    }

    /// Execute `{test_script_namespace}.{name}.sql` against the deployed database.
    pub async fn run_script(&self, name: &str) -> Result<()> {
        self.connection_string()?;

        let resource_name = test_script_resource_name(&self.definition.test_script_namespace, name);
        self.traced(format!("Run script {}", resource_name), async {
            let content = read_test_script(
                self.context.resources.as_ref(),
                &self.definition.test_script_namespace,
                name,
            )
            .ok_or_else(|| FixtureError::not_found("Test script", resource_name.clone()))?;

            self.server()
                .execute(self.database_name(), &resource_name, &content)
                .await
        })
        .await
    }

    /// Drop the snapshot and the database.
    ///
    /// Both drops are attempted whatever state the fixture reached; the first error is
    /// returned.
    pub async fn dispose(mut self) -> Result<()> {
        self.disposed = true;
        let server = self.server();
        self.traced(format!("Dispose {}", self.database_name()), async {
            let snapshot = drop_snapshot(server, &self.snapshot).await;
            let database = drop_database(server, self.database_name()).await;
            snapshot.and(database)
        })
        .await
    }

    /// Give up ownership: the snapshot and database outlive this handle.
    pub fn persist(mut self) -> DatabaseConfiguration {
        self.disposed = true;
        self.context
            .log
            .in_scope(|| info!("Keeping database {}", self.database_name()));
        self.configuration.clone()
    }

    fn server(&self) -> &dyn DatabaseServer {
        self.context.server.as_ref()
    }

    async fn in_span<F: Future>(&self, future: F) -> F::Output {
        future
            .instrument(self.span.clone())
            .with_subscriber(self.context.log.dispatch().clone())
            .await
    }

    async fn traced<T>(
        &self,
        operation: String,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.in_span(async move {
            let started = Instant::now();
            info!("{}", operation);
            let result = future.await;
            let elapsed = started.elapsed().as_millis();
            match &result {
                Ok(_) => info!("{} completed [{} ms]", operation, elapsed),
                Err(e) => error!("{} failed [{} ms]: {}", operation, elapsed, e),
            }
            result
        })
        .await
    }
}

impl std::fmt::Debug for FixtureDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureDatabase")
            .field("database_name", &self.configuration.database_name)
            .field("snapshot", &self.snapshot.name)
            .field("deployment", &self.deployment)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Drop for FixtureDatabase {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }

        let server = self.context.server.clone();
        let snapshot = self.snapshot.clone();
        let database = self.configuration.database_name.clone();
        let dispatch = self.context.log.dispatch().clone();
        let span = self.span.clone();

        // Block until cleanup finishes so a test runtime shutting down cannot cut it short
        let cleanup = std::thread::spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                let _entered = span.enter();
                warn!("Fixture dropped without dispose; removing {}", database);

                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create runtime for cleanup: {}", e);
                        return;
                    }
                };

                let result = rt.block_on(async {
                    let snapshot = drop_snapshot(server.as_ref(), &snapshot).await;
                    let database = drop_database(server.as_ref(), &database).await;
                    snapshot.and(database)
                });
                if let Err(e) = result {
                    error!("Cleanup of {} failed: {}", database, e);
                }
            });
        });

        let _ = cleanup.join();
    }
}

async fn drop_database(server: &dyn DatabaseServer, database: &str) -> Result<()> {
    if server.database_exists(database).await? {
        server.drop_database(database).await
    } else {
        debug!("Database {} does not exist; nothing to drop", database);
        Ok(())
    }
}

async fn drop_snapshot(server: &dyn DatabaseServer, snapshot: &Snapshot) -> Result<()> {
    drop_database(server, &snapshot.name).await?;
    snapshot.remove_manifest()
}
