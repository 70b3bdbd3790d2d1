use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{MAX_DATABASE_NAME_BYTES, NAMESPACE_SEPARATOR};
use crate::db::connection::parse_connection_url;
use crate::error::{FixtureError, Result};
use crate::selector::SelectionPolicy;

/// What gets deployed into a fixture database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDefinition {
    /// Namespace holding the schema scripts, e.g. `Schema`
    pub resource_namespace: String,
    /// Namespace holding scripts for [`crate::fixture::FixtureDatabase::run_script`]
    pub test_script_namespace: String,
    /// Names relative to `resource_namespace`, in deployment order
    #[serde(default)]
    pub ordered_resources: Vec<String>,
    #[serde(default)]
    pub allow_duplicates: bool,
}

impl DatabaseDefinition {
    pub fn new(
        resource_namespace: impl Into<String>,
        test_script_namespace: impl Into<String>,
    ) -> Self {
        Self {
            resource_namespace: resource_namespace.into(),
            test_script_namespace: test_script_namespace.into(),
            ordered_resources: Vec::new(),
            allow_duplicates: false,
        }
    }

    pub fn with_resources<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordered_resources = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::from_allow_duplicates(self.allow_duplicates)
    }
}

/// The physical target of a fixture: a server and the database created on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfiguration {
    /// Server URL naming a maintenance database
    pub server: String,
    pub database_name: String,
}

impl DatabaseConfiguration {
    pub fn new(server: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database_name: database_name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        parse_connection_url(&self.server)?;
        validate_database_name(&self.database_name)
    }
}

/// Check a fixture database name against the naming rules.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FixtureError::Configuration(
            "Database name must not be empty".to_string(),
        ));
    }

    if name.len() > MAX_DATABASE_NAME_BYTES {
        return Err(FixtureError::Configuration(format!(
            "Database name '{}' is {} bytes long; the limit is {} bytes",
            name,
            name.len(),
            MAX_DATABASE_NAME_BYTES
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '_' | '-' | NAMESPACE_SEPARATOR)))
    {
        return Err(FixtureError::Configuration(format!(
            "Database name '{}' contains invalid character '{}': use letters, digits, '_', '-' or '.'",
            name, bad
        )));
    }

    Ok(())
}

/// `{prefix}_{uuid}` trimmed so the result stays a valid database name.
pub fn unique_database_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let budget = MAX_DATABASE_NAME_BYTES - suffix.len() - 1;

    let prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '-' | NAMESPACE_SEPARATOR))
        .take(budget)
        .collect();

    if prefix.is_empty() {
        format!("fixture_{}", suffix)
    } else {
        format!("{}_{}", prefix, suffix)
    }
}

/// Raw configuration input - all fields Optional for merging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigInput {
    pub server: Option<ServerInput>,
    pub database: Option<DatabaseInput>,
    pub definition: Option<DefinitionInput>,
    pub logging: Option<LoggingInput>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerSource,
    pub database: DatabaseSettings,
    pub definition: DatabaseDefinition,
    /// Directory scanned for scripts by the CLI
    pub resource_dir: String,
    pub logging: Logging,
}

impl Config {
    /// Fixture configuration once the server URL is known.
    pub fn database_configuration(&self, server_url: impl Into<String>) -> DatabaseConfiguration {
        DatabaseConfiguration::new(server_url, self.database.name.clone())
    }
}

// Server configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerInput {
    pub url: Option<String>,
    pub docker: Option<ServerDockerInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerDockerInput {
    pub version: Option<String>,
    pub image: Option<String>,
    pub environment: Option<HashMap<String, String>>,
    pub container_name: Option<String>,
    pub auto_cleanup: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum ServerSource {
    Url(String),
    /// Start a disposable PostgreSQL container
    Docker(ServerContainerConfig),
}

impl ServerSource {
    pub fn describe(&self) -> String {
        match self {
            ServerSource::Url(url) => crate::db::connection::mask_url_password(url),
            ServerSource::Docker(config) => format!("docker ({})", config.resolved_image()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerContainerConfig {
    pub version: Option<String>,
    pub image: String,
    pub environment: HashMap<String, String>,
    pub container_name: Option<String>,
    pub auto_cleanup: bool,
}

impl ServerContainerConfig {
    /// Resolve the Docker image from version or use the image directly
    /// Precedence: explicit image > version > default
    pub fn resolved_image(&self) -> String {
        if !self.image.is_empty() && self.image != Self::default_image() {
            return self.image.clone();
        }

        if let Some(version) = &self.version {
            return format!("postgres:{}-alpine", version);
        }

        self.image.clone()
    }

    pub fn default_image() -> String {
        "postgres:18-alpine".to_string()
    }

    /// Superuser password the container is started with
    pub fn password(&self) -> &str {
        self.environment
            .get("POSTGRES_PASSWORD")
            .map(String::as_str)
            .unwrap_or("postgres")
    }

    pub fn user(&self) -> &str {
        self.environment
            .get("POSTGRES_USER")
            .map(String::as_str)
            .unwrap_or("postgres")
    }
}

// Database naming
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseInput {
    pub name: Option<String>,
    /// Append a random suffix to `name`
    pub unique: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Final name, suffix already applied when `unique` is set
    pub name: String,
    pub unique: bool,
}

// Deployment definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefinitionInput {
    pub resource_namespace: Option<String>,
    pub test_script_namespace: Option<String>,
    pub ordered_resources: Option<Vec<String>>,
    pub allow_duplicates: Option<bool>,
    pub resource_dir: Option<String>,
}

// Logging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingInput {
    pub file: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Logging {
    /// Fixture log file; fixture events go to the console subscriber when unset
    pub file: Option<String>,
    pub filter: String,
}

// CLI argument groups
#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    #[arg(long, help = "Server URL naming a maintenance database")]
    pub server_url: Option<String>,

    #[arg(long, help = "Name of the fixture database")]
    pub database_name: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DefinitionArgs {
    #[arg(long, help = "Directory containing the SQL scripts")]
    pub resource_dir: Option<String>,

    #[arg(long, help = "Namespace of the schema scripts")]
    pub resource_namespace: Option<String>,

    #[arg(long, help = "Allow duplicate script and inclusion names")]
    pub allow_duplicates: bool,
}

impl From<ServerArgs> for ConfigInput {
    fn from(args: ServerArgs) -> Self {
        Self {
            server: args.server_url.map(|url| ServerInput {
                url: Some(url),
                docker: None,
            }),
            database: args.database_name.map(|name| DatabaseInput {
                name: Some(name),
                unique: None,
            }),
            definition: None,
            logging: None,
        }
    }
}

impl From<DefinitionArgs> for DefinitionInput {
    fn from(args: DefinitionArgs) -> Self {
        Self {
            resource_namespace: args.resource_namespace,
            test_script_namespace: None,
            ordered_resources: None,
            allow_duplicates: if args.allow_duplicates {
                Some(true)
            } else {
                None
            },
            resource_dir: args.resource_dir,
        }
    }
}
