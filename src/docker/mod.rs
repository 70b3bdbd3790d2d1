//! Disposable PostgreSQL servers in Docker containers
//!
//! Fixtures need a server to create their databases on. When none is configured, the
//! CLI starts one here, lets Docker pick the host port and removes the container when
//! the [`EphemeralServer`] is dropped.

use anyhow::{Result, anyhow};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, ContainerStateStatusEnum};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    LogsOptionsBuilder, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::secret::{ContainerInspectResponse, HostConfig, PortBinding};
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::types::ServerContainerConfig;
use crate::db::connection::{close_connection, connect_unpooled_with_timeout, mask_url_password};

const POSTGRES_PORT: &str = "5432/tcp";
const MAINTENANCE_DATABASE: &str = "postgres";
const KEEP_ON_FAILURE_ENV: &str = "PGFIXTURE_KEEP_SERVER_ON_FAILURE";

/// Docker container manager for fixture servers
pub struct DockerManager {
    docker: Docker,
}

/// Where a started container can be reached
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ContainerInfo {
    /// Server URL naming the maintenance database
    pub fn server_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode=disable",
            self.username, self.password, self.host, self.port, MAINTENANCE_DATABASE
        )
    }
}

/// RAII handle on a running server container
pub struct EphemeralServer {
    container_info: ContainerInfo,
    auto_cleanup: bool,
}

impl EphemeralServer {
    pub fn server_url(&self) -> String {
        self.container_info.server_url()
    }

    pub fn container_id(&self) -> &str {
        &self.container_info.id
    }

    /// Keep the container running after this handle is dropped.
    ///
    /// It stays in the registry, so [`cleanup_all_containers`] still removes it.
    pub fn into_server_url(mut self) -> String {
        self.auto_cleanup = false;
        self.container_info.server_url()
    }
}

impl Drop for EphemeralServer {
    fn drop(&mut self) {
        if !self.auto_cleanup {
            return;
        }

        let container_id = self.container_info.id.clone();
        unregister_container(&container_id);

        // Block on cleanup so a test runtime shutting down cannot cut it short
        let cleanup = std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    debug!("Failed to create runtime for cleanup: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                match DockerManager::new().await {
                    Ok(manager) => match manager.stop_container(&container_id, true).await {
                        Ok(()) => debug!("Removed server container: {}", container_id),
                        Err(e) if is_not_found(&e) => {}
                        Err(e) => debug!("Failed to remove container {}: {}", container_id, e),
                    },
                    Err(e) => debug!("Failed to create Docker manager for cleanup: {}", e),
                }
            });
        });

        let _ = cleanup.join();
    }
}

fn is_not_found(error: &anyhow::Error) -> bool {
    let message = error.to_string();
    message.contains("404") || message.contains("No such container")
}

impl DockerManager {
    /// Connect to the Docker daemon, retrying briefly while it comes up
    pub async fn new() -> Result<Self> {
        const MAX_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 200;

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            match Self::try_connect().await {
                Ok(manager) => {
                    if attempt > 0 {
                        debug!("Connected to Docker after {} retries", attempt);
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "Failed to connect to Docker after {} attempts: {}\nMake sure Docker is running or set DOCKER_HOST",
            MAX_RETRIES + 1,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    async fn try_connect() -> Result<Self> {
        for socket_path in Self::socket_candidates() {
            if let Ok(docker) = Self::try_socket_path(&socket_path).await {
                return Ok(Self { docker });
            }
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| anyhow!("Failed to connect to Docker daemon: {}", e))?;
        docker
            .ping()
            .await
            .map_err(|e| anyhow!("Docker daemon not responding: {}", e))?;

        Ok(Self { docker })
    }

    /// Socket paths to try, `DOCKER_HOST` first
    fn socket_candidates() -> Vec<String> {
        let mut candidates = Vec::new();

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            candidates.push(docker_host);
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(home) = std::env::var("HOME") {
                candidates.push(format!("unix://{}/.docker/run/docker.sock", home));
                candidates.push(format!("unix://{}/.colima/default/docker.sock", home));
                candidates.push(format!("unix://{}/.orbstack/run/docker.sock", home));
            }
        }

        candidates.push("unix:///var/run/docker.sock".to_string());
        candidates
    }

    async fn try_socket_path(socket_path: &str) -> Result<Docker> {
        let Some(socket_file) = socket_path.strip_prefix("unix://") else {
            return Err(anyhow!("Unsupported socket protocol: {}", socket_path));
        };

        let docker = Docker::connect_with_socket(socket_file, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| anyhow!("Failed to connect to socket {}: {}", socket_path, e))?;
        docker
            .ping()
            .await
            .map_err(|e| anyhow!("Socket {} not responding: {}", socket_path, e))?;

        Ok(docker)
    }

    /// Start a PostgreSQL server and wait until it accepts queries
    ///
    /// A container left over under the same name is removed first.
    pub async fn start_server(&self, config: &ServerContainerConfig) -> Result<EphemeralServer> {
        let container_name = config
            .container_name
            .clone()
            .unwrap_or_else(|| format!("pgfixture_{}", uuid::Uuid::new_v4().simple()));

        if let Some(existing_id) = self.find_container_by_name(&container_name).await? {
            warn!("Removing leftover container {}", container_name);
            self.remove_container(&existing_id, true).await?;
        }

        let image = config.resolved_image();
        self.ensure_image_available(&image).await?;

        let mut env_vars = Vec::new();
        if !config.environment.contains_key("POSTGRES_USER") {
            env_vars.push(format!("POSTGRES_USER={}", config.user()));
        }
        if !config.environment.contains_key("POSTGRES_PASSWORD") {
            env_vars.push(format!("POSTGRES_PASSWORD={}", config.password()));
        }
        for (key, value) in &config.environment {
            env_vars.push(format!("{}={}", key, value));
        }

        // No host port: Docker picks a free one on 127.0.0.1
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            POSTGRES_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: None,
            }]),
        );

        let container_config = ContainerCreateBody {
            image: Some(image.clone()),
            env: Some(env_vars),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        debug!("Creating container {} from {}", container_name, image);
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(container_name.clone()),
                    ..Default::default()
                }),
                container_config,
            )
            .await
            .map_err(|e| anyhow!("Failed to create container: {}", e))?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
        {
            let _ = self.remove_container(&container.id, true).await;
            return Err(anyhow!("Failed to start container: {}", e));
        }

        let container_info = match self.started_container_info(&container.id, config).await {
            Ok(info) => info,
            Err(e) => {
                let _ = self.remove_container(&container.id, true).await;
                return Err(e);
            }
        };

        if let Err(readiness_err) = self.wait_for_ready(&container_info).await {
            let logs = self.fetch_container_logs(&container.id).await;
            if std::env::var(KEEP_ON_FAILURE_ENV).is_ok_and(|v| !v.is_empty()) {
                return Err(anyhow!(
                    "{readiness_err}\n\nContainer logs (last 50 lines):\n{logs}\n\n\
                     The container was kept for debugging: docker rm -f {container_name}"
                ));
            }
            let _ = self.remove_container(&container.id, true).await;
            return Err(anyhow!(
                "{readiness_err}\n\nContainer logs (last 50 lines):\n{logs}\n\n\
                 Set {KEEP_ON_FAILURE_ENV}=1 to keep the container for debugging."
            ));
        }

        if config.auto_cleanup {
            register_container(container.id.clone());
        }

        info!(
            "PostgreSQL server ready: {}",
            mask_url_password(&container_info.server_url())
        );

        Ok(EphemeralServer {
            container_info,
            auto_cleanup: config.auto_cleanup,
        })
    }

    /// Host port and credentials of a container that has just started
    async fn started_container_info(
        &self,
        container_id: &str,
        config: &ServerContainerConfig,
    ) -> Result<ContainerInfo> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| anyhow!("Failed to inspect container: {}", e))?;

        Ok(ContainerInfo {
            id: container_id.to_string(),
            host: "127.0.0.1".to_string(),
            port: extract_host_port(&inspect)?,
            username: config.user().to_string(),
            password: config.password().to_string(),
        })
    }

    /// Stop and optionally remove a container.
    /// If stop fails on a crashed container, still attempts force-remove.
    pub async fn stop_container(&self, container_id: &str, remove: bool) -> Result<()> {
        let stop_result = self
            .docker
            .stop_container(container_id, None::<StopContainerOptions>)
            .await;
        unregister_container(container_id);

        match stop_result {
            Ok(()) if remove => self.remove_container(container_id, false).await,
            Ok(()) => Ok(()),
            Err(e) => {
                let error = anyhow!("Failed to stop container: {}", e);
                if remove && !is_not_found(&error) {
                    self.remove_container(container_id, true).await
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| anyhow!("Failed to remove container: {}", e))
    }

    async fn find_container_by_name(&self, name: &str) -> Result<Option<String>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: Some(filters),
                ..Default::default()
            }))
            .await
            .map_err(|e| anyhow!("Failed to list containers: {}", e))?;

        // The name filter matches substrings; require an exact name
        let wanted = format!("/{}", name);
        Ok(containers
            .into_iter()
            .find(|c| c.names.as_ref().is_some_and(|names| names.contains(&wanted)))
            .and_then(|c| c.id))
    }

    async fn ensure_image_available(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling PostgreSQL image: {}", image);
        let mut pull_stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = pull_stream.next().await {
            result.map_err(|e| anyhow!("Failed to pull image {}: {}", image, e))?;
        }

        Ok(())
    }

    async fn fetch_container_logs(&self, container_id: &str) -> String {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .tail("50")
            .build();
        let log_stream = self.docker.logs(container_id, Some(options));

        match tokio::time::timeout(
            Duration::from_secs(3),
            log_stream.collect::<Vec<std::result::Result<LogOutput, _>>>(),
        )
        .await
        {
            Ok(results) => {
                let lines: Vec<String> = results
                    .into_iter()
                    .filter_map(|r| r.ok())
                    .map(|output| output.to_string())
                    .collect();
                if lines.is_empty() {
                    "(no logs available)".to_string()
                } else {
                    lines.join("")
                }
            }
            Err(_) => "(timed out fetching container logs)".to_string(),
        }
    }

    /// Poll until `SELECT 1` succeeds, failing fast if the container exits
    async fn wait_for_ready(&self, container_info: &ContainerInfo) -> Result<()> {
        const MAX_ATTEMPTS: u32 = 60;
        const RETRY_DELAY_MS: u64 = 1000;
        const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

        sleep(Duration::from_millis(500)).await;

        let url = container_info.server_url();
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let inspect = self
                .docker
                .inspect_container(&container_info.id, None::<InspectContainerOptions>)
                .await
                .map_err(|e| anyhow!("Failed to inspect container: {}", e))?;

            if let Some(state) = &inspect.state
                && matches!(
                    state.status,
                    Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD)
                )
            {
                return Err(anyhow!(
                    "Server container exited with code {}",
                    state.exit_code.unwrap_or(-1)
                ));
            }

            match connect_unpooled_with_timeout(&url, ATTEMPT_TIMEOUT).await {
                Ok(mut conn) => {
                    let probe = sqlx::query("SELECT 1").execute(&mut conn).await;
                    close_connection(conn).await;
                    match probe {
                        Ok(_) => {
                            debug!("PostgreSQL ready after {} attempt(s)", attempt);
                            return Ok(());
                        }
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Err(e) => last_error = e.to_string(),
            }

            debug!("PostgreSQL not ready (attempt {}): {}", attempt, last_error);
            sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
        }

        Err(anyhow!(
            "PostgreSQL failed to become ready after {} attempts. Last error: {}",
            MAX_ATTEMPTS,
            last_error
        ))
    }
}

fn extract_host_port(inspect: &ContainerInspectResponse) -> Result<u16> {
    let host_port = inspect
        .network_settings
        .as_ref()
        .and_then(|settings| settings.ports.as_ref())
        .and_then(|ports| ports.get(POSTGRES_PORT))
        .and_then(|bindings| bindings.as_ref())
        .and_then(|bindings| bindings.first())
        .and_then(|binding| binding.host_port.as_ref())
        .ok_or_else(|| anyhow!("Container has no host port bound to {}", POSTGRES_PORT))?;

    host_port
        .parse::<u16>()
        .map_err(|e| anyhow!("Invalid host port '{}': {}", host_port, e))
}

/// Containers to remove at process exit if RAII cleanup never ran
static CONTAINER_REGISTRY: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub fn register_container(container_id: String) {
    if let Ok(mut registry) = CONTAINER_REGISTRY.lock() {
        registry.push(container_id);
    }
}

pub fn unregister_container(container_id: &str) {
    if let Ok(mut registry) = CONTAINER_REGISTRY.lock() {
        registry.retain(|id| id != container_id);
    }
}

pub fn registered_containers() -> Vec<String> {
    CONTAINER_REGISTRY
        .lock()
        .map(|registry| registry.clone())
        .unwrap_or_default()
}

/// Remove every registered container
pub async fn cleanup_all_containers() -> Result<()> {
    let container_ids = match CONTAINER_REGISTRY.lock() {
        Ok(mut registry) => std::mem::take(&mut *registry),
        Err(_) => return Err(anyhow!("Container registry lock poisoned")),
    };

    if container_ids.is_empty() {
        return Ok(());
    }

    info!("Cleaning up {} registered container(s)", container_ids.len());

    let manager = DockerManager::new().await?;
    let cleanup = futures_util::future::join_all(container_ids.iter().map(|id| {
        let manager = &manager;
        async move {
            match manager.stop_container(id, true).await {
                Ok(()) => info!("Removed container: {}", id),
                Err(e) if is_not_found(&e) => debug!("Container {} already removed", id),
                Err(e) => warn!("Failed to remove container {}: {}", id, e),
            }
        }
    }));

    const CLEANUP_TIMEOUT_SECS: u64 = 10;
    if tokio::time::timeout(Duration::from_secs(CLEANUP_TIMEOUT_SECS), cleanup)
        .await
        .is_err()
    {
        warn!(
            "Container cleanup timed out after {} seconds",
            CLEANUP_TIMEOUT_SECS
        );
    }

    Ok(())
}
