use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use pgfixture::config::{Config, ServerSource};
use pgfixture::db::connection::mask_url_password;
use pgfixture::docker::{self, DockerManager, EphemeralServer};
use pgfixture::fixture::{DeploymentOutcome, FixtureContext, FixtureDatabase};
use pgfixture::logging::LogHandle;
use pgfixture::resources::DirectoryStore;

/// A server URL plus the container backing it, if one was started
pub struct ResolvedServer {
    pub url: String,
    pub container: Option<EphemeralServer>,
}

pub async fn resolve_server(source: &ServerSource) -> Result<ResolvedServer> {
    match source {
        ServerSource::Url(url) => Ok(ResolvedServer {
            url: url.clone(),
            container: None,
        }),
        ServerSource::Docker(container_config) => {
            println!(
                "🐳 Starting PostgreSQL container ({})...",
                container_config.resolved_image()
            );
            let manager = DockerManager::new().await?;
            let server = manager
                .start_server(container_config)
                .await
                .context("Failed to start PostgreSQL container")?;
            Ok(ResolvedServer {
                url: server.server_url(),
                container: Some(server),
            })
        }
    }
}

pub fn open_log(config: &Config, root_dir: &Path) -> Result<LogHandle> {
    match &config.logging.file {
        Some(file) => {
            let path = root_dir.join(file);
            LogHandle::file_with_filter(&path, &config.logging.filter)
                .with_context(|| format!("Failed to open log file {}", path.display()))
        }
        None => Ok(LogHandle::current()),
    }
}

/// Provision a fixture and report the outcome. Returns whether deployment succeeded.
pub async fn cmd_deploy(config: &Config, root_dir: &Path, keep: bool) -> Result<bool> {
    let server = resolve_server(&config.server).await?;
    let configuration = config.database_configuration(server.url.clone());
    let store = DirectoryStore::new(root_dir.join(&config.resource_dir));

    let context = FixtureContext::postgres(&configuration, Arc::new(store))?
        .with_log(open_log(config, root_dir)?);

    println!(
        "🚀 Deploying {} to {}",
        style(&configuration.database_name).bold(),
        mask_url_password(&configuration.server)
    );

    let fixture =
        FixtureDatabase::provision(context, config.definition.clone(), configuration).await?;

    let successful = fixture.deployment_successful();
    if let Some(outcome) = fixture.deployment() {
        print_outcome(outcome);
    }

    if keep {
        let kept = fixture.persist();
        let container_url = server.container.map(|container| {
            docker::unregister_container(container.container_id());
            container.into_server_url()
        });
        println!(
            "📌 Kept database {} on {}",
            style(&kept.database_name).bold(),
            mask_url_password(container_url.as_deref().unwrap_or(&kept.server))
        );
    } else {
        fixture.dispose().await?;
        info!("Fixture disposed");
    }

    Ok(successful)
}

fn print_outcome(outcome: &DeploymentOutcome) {
    if outcome.successful {
        println!(
            "{} Deployed {} script(s), {} applied",
            style("✓").green(),
            outcome.planned,
            outcome.applied_count
        );
        return;
    }

    println!(
        "{} Deployment failed after {} of {} script(s)",
        style("✗").red(),
        outcome.applied_count,
        outcome.planned
    );
    if let Some(script) = &outcome.failed_script {
        println!("  Script: {}", style(script).bold());
    }
    if let Some(error) = &outcome.error {
        for line in error.lines() {
            println!("  {}", style(line).dim());
        }
    }
}
