use anyhow::{Result, anyhow};
use console::style;
use std::sync::Arc;

use crate::prompts::confirm;
use pgfixture::config::{Config, ServerSource};
use pgfixture::fixture::{FixtureContext, FixtureDatabase};
use pgfixture::resources::MemoryStore;

/// Drop the configured database and its snapshot, e.g. after `deploy --keep`.
pub async fn cmd_cleanup(config: &Config, yes: bool) -> Result<()> {
    let ServerSource::Url(server_url) = &config.server else {
        return Err(anyhow!(
            "cleanup needs a server URL; containers started by deploy are removed when it exits"
        ));
    };

    if config.database.unique {
        return Err(anyhow!(
            "database.unique generates a new name on every run; pass the kept name with --database-name"
        ));
    }

    let configuration = config.database_configuration(server_url.clone());
    let prompt = format!(
        "Drop database {} and snapshot Snapshot-{}?",
        configuration.database_name, configuration.database_name
    );
    if !confirm(&prompt, yes)? {
        println!("Cleanup cancelled");
        return Ok(());
    }

    let context = FixtureContext::postgres(&configuration, Arc::new(MemoryStore::new()))?;
    let fixture = FixtureDatabase::new(context, config.definition.clone(), configuration)?;
    let name = fixture.database_name().to_string();
    fixture.dispose().await?;

    println!("{} Removed {} and its snapshot", style("✓").green(), name);
    Ok(())
}
