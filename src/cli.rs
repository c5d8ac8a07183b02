// ============================================================================
// COMMAND LINE INTERFACE
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::HostConfig;
use crate::error::HostResult;
use crate::{HOST_FULL_NAME, HOST_NAME, HOST_VERSION};

// ----------------------------------------------------------------------------
// Argument Parser
// ----------------------------------------------------------------------------

/// AAW host CLI
#[derive(Parser, Debug)]
#[command(
    name = "aaw-host",
    author = "AAW Team",
    version,
    about = "Concurrency-gated code analysis server",
    long_about = "Serves code analysis over HTTP from a shared text-generation model, \
                  admitting at most N analyses at once. N can be changed at runtime \
                  through the admin API."
)]
pub struct Cli {
    /// Configuration file path (optional; environment variables also apply)
    #[arg(short, long, env = "AAW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level override
    #[arg(short, long, env = "AAW_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Subcommand to run (default: run)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server
    Run,

    /// Validate configuration
    Validate {
        /// Show the full resolved configuration
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version and build info
    Version,
}

impl Cli {
    /// Level to log at after `--debug` and `--log-level` are applied.
    pub fn effective_log_level(&self, configured: &str) -> String {
        if self.debug {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.to_string())
        }
    }
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

/// Handle the validate subcommand
pub fn handle_validate(config_path: Option<&Path>, verbose: bool) -> HostResult<()> {
    match config_path {
        Some(path) => println!("Validating configuration: {}", path.display()),
        None => println!("Validating configuration from defaults and environment"),
    }

    let config = match HostConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration validation failed!");
            println!("Error: {}", e);
            return Err(e.into());
        }
    };

    println!("Configuration is valid");

    if verbose {
        println!("\nResolved configuration:");
        println!("{}", "=".repeat(60));
        println!("{}", redacted_toml(&config));
    }

    println!("\nSummary:");
    println!("  • Listen address: {}", config.bind_addr());
    println!("  • Static directory: {}", config.static_dir.display());
    println!("  • Allowed keys: {}", config.allowed_keys.len());
    println!("  • Max concurrency: {}", config.initial_capacity());
    println!(
        "  • Inference: {} ({})",
        config.inference.backend, config.inference.model_name
    );
    if let Some(endpoint) = &config.inference.endpoint {
        println!("  • Endpoint: {}", endpoint);
    }
    match config.inference.timeout_secs {
        Some(secs) => println!("  • Inference timeout: {}s", secs),
        None => println!("  • Inference timeout: none"),
    }

    Ok(())
}

/// Resolved config as TOML with secrets masked.
fn redacted_toml(config: &HostConfig) -> String {
    let mut shown = config.clone();
    shown.allowed_keys = shown.allowed_keys.iter().map(|_| "***".to_string()).collect();
    if shown.inference.api_token.is_some() {
        shown.inference.api_token = Some("***".to_string());
    }
    toml::to_string_pretty(&shown).unwrap_or_else(|e| format!("Failed to serialize: {}", e))
}

/// Handle the generate-config subcommand
pub fn handle_generate_config(output: Option<&Path>) -> HostResult<()> {
    let config_str = HostConfig::generate_default_config();

    match output {
        Some(path) => {
            fs::write(path, &config_str)?;
            println!("Default configuration written to: {}", path.display());
        }
        None => println!("{}", config_str),
    }

    Ok(())
}

/// Handle the version subcommand
pub fn handle_version() {
    println!("{} ({}) v{}", HOST_FULL_NAME, HOST_NAME, HOST_VERSION);
    println!();
    println!("Build Information:");
    println!("  • Target: {}", std::env::consts::ARCH);
    println!("  • OS: {}", std::env::consts::OS);
    println!("  • Family: {}", std::env::consts::FAMILY);
    println!();
    println!("Inference backends: echo, http");
    println!("License: MIT");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_defaults_to_no_command() {
        let cli = Cli::try_parse_from(["aaw-host"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.effective_log_level("warn"), "warn");
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["aaw-host", "-c", "host.toml", "validate", "--verbose"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("host.toml")));
        assert_eq!(cli.command, Some(Commands::Validate { verbose: true }));

        let cli = Cli::try_parse_from(["aaw-host", "generate-config", "-o", "out.toml"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::GenerateConfig {
                output: Some(PathBuf::from("out.toml"))
            })
        );
    }

    #[test]
    fn test_debug_flag_wins_over_log_level() {
        let cli = Cli::try_parse_from(["aaw-host", "--log-level", "error", "--debug"]).unwrap();
        assert_eq!(cli.effective_log_level("info"), "debug");

        let cli = Cli::try_parse_from(["aaw-host", "--log-level", "error"]).unwrap();
        assert_eq!(cli.effective_log_level("info"), "error");
    }

    #[test]
    fn test_generate_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aaw.toml");

        handle_generate_config(Some(&path)).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let parsed = HostConfig::from_toml_str(&written).unwrap();
        assert_eq!(parsed.port, crate::DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_redacted_toml_hides_secrets() {
        let mut config = HostConfig::default();
        config.allowed_keys = vec!["team-secret".into()];
        config.inference.api_token = Some("hf_token".into());

        let shown = redacted_toml(&config);
        assert!(!shown.contains("team-secret"));
        assert!(!shown.contains("hf_token"));
    }
}
