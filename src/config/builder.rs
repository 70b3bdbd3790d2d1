use crate::config::defaults::{default_definition, default_resource_dir};
use crate::config::{merge::Merge, types::*};
use crate::error::{FixtureError, Result};

/// Environment variables consulted for the server URL, in order
pub const SERVER_URL_ENV_VARS: [&str; 2] = ["PGFIXTURE_SERVER_URL", "DATABASE_URL"];

pub struct ConfigBuilder {
    config_input: ConfigInput,
    env_server_url: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
            env_server_url: None,
        }
    }

    pub fn with_file(mut self, file_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(file_input);
        self
    }

    /// A database name given on the command line is used verbatim, even when a file
    /// layer sets `unique`.
    pub fn with_cli_args(mut self, mut cli_input: ConfigInput) -> Self {
        if let Some(database) = cli_input.database.as_mut()
            && database.name.is_some()
        {
            database.unique.get_or_insert(false);
        }
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    /// Read the server URL fallback from the process environment
    pub fn with_environment(self) -> Self {
        let url = SERVER_URL_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
        self.with_env_server_url(url)
    }

    pub fn with_env_server_url(mut self, url: Option<String>) -> Self {
        self.env_server_url = url;
        self
    }

    pub fn resolve(self) -> Result<Config> {
        let defaults = Config::default();

        let definition = self.resolve_definition();
        if definition.resource_namespace.is_empty() {
            return Err(FixtureError::Configuration(
                "definition.resource_namespace must not be empty".to_string(),
            ));
        }

        Ok(Config {
            server: self.resolve_server(&defaults.server),
            database: self.resolve_database(&defaults.database)?,
            definition,
            resource_dir: self
                .config_input
                .definition
                .as_ref()
                .and_then(|d| d.resource_dir.clone())
                .unwrap_or_else(default_resource_dir),
            logging: self.resolve_logging(&defaults.logging),
        })
    }

    fn resolve_server(&self, default: &ServerSource) -> ServerSource {
        let server_input = self.config_input.server.as_ref();

        // Explicit URL from file or CLI takes highest precedence
        if let Some(url) = server_input.and_then(|s| s.url.as_ref()) {
            return ServerSource::Url(url.clone());
        }

        if let Some(docker_input) = server_input.and_then(|s| s.docker.as_ref()) {
            let defaults = ServerContainerConfig::default();
            return ServerSource::Docker(ServerContainerConfig {
                version: docker_input.version.clone(),
                image: docker_input
                    .image
                    .as_ref()
                    .cloned()
                    .unwrap_or_else(|| defaults.image.clone()),
                environment: docker_input
                    .environment
                    .as_ref()
                    .cloned()
                    .unwrap_or_else(|| defaults.environment.clone()),
                container_name: docker_input.container_name.clone(),
                auto_cleanup: docker_input.auto_cleanup.unwrap_or(defaults.auto_cleanup),
            });
        }

        self.env_server_url
            .clone()
            .map(ServerSource::Url)
            .unwrap_or_else(|| default.clone())
    }

    fn resolve_database(&self, defaults: &DatabaseSettings) -> Result<DatabaseSettings> {
        let db_input = self.config_input.database.as_ref();

        let base = db_input
            .and_then(|d| d.name.as_ref())
            .cloned()
            .unwrap_or_else(|| defaults.name.clone());
        let unique = db_input.and_then(|d| d.unique).unwrap_or(defaults.unique);

        let name = if unique {
            unique_database_name(&base)
        } else {
            base
        };
        validate_database_name(&name)?;

        Ok(DatabaseSettings { name, unique })
    }

    fn resolve_definition(&self) -> DatabaseDefinition {
        let defaults = default_definition();
        let def_input = self.config_input.definition.as_ref();

        DatabaseDefinition {
            resource_namespace: def_input
                .and_then(|d| d.resource_namespace.as_ref())
                .cloned()
                .unwrap_or(defaults.resource_namespace),
            test_script_namespace: def_input
                .and_then(|d| d.test_script_namespace.as_ref())
                .cloned()
                .unwrap_or(defaults.test_script_namespace),
            ordered_resources: def_input
                .and_then(|d| d.ordered_resources.as_ref())
                .cloned()
                .unwrap_or(defaults.ordered_resources),
            allow_duplicates: def_input
                .and_then(|d| d.allow_duplicates)
                .unwrap_or(defaults.allow_duplicates),
        }
    }

    fn resolve_logging(&self, defaults: &Logging) -> Logging {
        let log_input = self.config_input.logging.as_ref();

        Logging {
            file: log_input
                .and_then(|l| l.file.as_ref())
                .cloned()
                .or_else(|| defaults.file.clone()),
            filter: log_input
                .and_then(|l| l.filter.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.filter.clone()),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
