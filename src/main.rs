// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use tracing::info;

use aaw_host::cli::{handle_generate_config, handle_validate, handle_version, Cli, Commands};
use aaw_host::config::HostConfig;
use aaw_host::logging::init_logging;
use aaw_host::{http, HOST_FULL_NAME, HOST_VERSION};

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();

    // Subcommands that don't need the server
    match &cli.command {
        Some(Commands::Version) => {
            handle_version();
            return Ok(());
        }
        Some(Commands::GenerateConfig { output }) => {
            handle_generate_config(output.as_deref())?;
            return Ok(());
        }
        Some(Commands::Validate { verbose }) => {
            handle_validate(cli.config.as_deref(), *verbose)?;
            return Ok(());
        }
        Some(Commands::Run) | None => {}
    }

    let config = HostConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;

    let mut logging_config = config.logging.clone();
    logging_config.level = cli.effective_log_level(&logging_config.level);
    init_logging(&logging_config)?;

    info!(target: "aaw::init", "{} v{}", HOST_FULL_NAME, HOST_VERSION);

    http::serve(&config)
        .await
        .with_context(|| format!("Server on {} failed", config.bind_addr()))?;

    Ok(())
}
