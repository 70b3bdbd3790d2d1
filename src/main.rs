mod commands;
mod prompts;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use commands::PlanFormat;
use pgfixture::config::{self, ConfigBuilder, ConfigInput, DefinitionArgs, ServerArgs};
use pgfixture::constants::CONFIG_FILENAME;
use pgfixture::docker;
use pgfixture::logging::initialize_cli_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the ordered scripts a deployment would apply
    Plan {
        #[arg(long, value_enum, default_value_t = PlanFormat::Text)]
        format: PlanFormat,

        #[command(flatten)]
        definition_args: DefinitionArgs,
    },
    /// Create a fixture database and deploy the configured scripts into it
    Deploy {
        /// Keep the database (and container) instead of disposing it
        #[arg(long)]
        keep: bool,

        #[command(flatten)]
        server_args: ServerArgs,

        #[command(flatten)]
        definition_args: DefinitionArgs,
    },
    /// Drop the configured database and its snapshot
    Cleanup {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,

        #[command(flatten)]
        server_args: ServerArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);

    let result = tokio::select! {
        result = run_main(cli) => result,
        _ = wait_for_shutdown_signal() => {
            info!("Received shutdown signal, cleaning up...");
            Ok(())
        }
    };

    if let Err(e) = docker::cleanup_all_containers().await {
        eprintln!("Warning: Failed to cleanup Docker containers: {}", e);
    }

    result
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    initialize_cli_logging(level);
}

async fn run_main(cli: Cli) -> Result<()> {
    let (file_config, root_dir) = config::load_config(&cli.config_file)?;
    let builder = ConfigBuilder::new().with_file(file_config).with_environment();

    match cli.command {
        Commands::Plan {
            format,
            definition_args,
        } => {
            let config = builder
                .with_cli_args(ConfigInput {
                    definition: Some(definition_args.into()),
                    ..ConfigInput::default()
                })
                .resolve()?;

            info!("Planning deployment of {}", config.definition.resource_namespace);
            commands::cmd_plan(&config, &root_dir, format)
        }
        Commands::Deploy {
            keep,
            server_args,
            definition_args,
        } => {
            let cli_config = ConfigInput {
                definition: Some(definition_args.into()),
                ..server_args.into()
            };
            let config = builder.with_cli_args(cli_config).resolve()?;

            info!(
                "Deploying fixture {} on {}",
                config.database.name,
                config.server.describe()
            );
            let successful = commands::cmd_deploy(&config, &root_dir, keep).await?;
            if !successful {
                docker::cleanup_all_containers().await.ok();
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Cleanup { yes, server_args } => {
            let config = builder.with_cli_args(server_args.into()).resolve()?;

            info!("Cleaning up fixture {}", config.database.name);
            commands::cmd_cleanup(&config, yes).await
        }
    }
}
