//! Datasource Registry CLI
//!
//! Command-line interface for managing datasources stored in a document
//! database, with per-user access policies.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;

use commands::{open_registry, run_datasource_command, CommandContext, DatasourceCommands};
use config::AppConfig;
use dsr_core::User;
use dsr_observability::{init_logging_with_config, repository_span, LoggingConfig};
use tracing::Instrument;

#[derive(Parser)]
#[command(name = "datasource-registry")]
#[command(version)]
#[command(about = "Manage datasources and their access policies", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database URL (sqlite://, postgres://, or "memory"); overrides the config file
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Acting user; overrides defaults.user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Group of the acting user (repeatable)
    #[arg(short, long = "group", global = true)]
    groups: Vec<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage datasources
    Datasource {
        #[command(subcommand)]
        action: DatasourceCommands,
    },

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => return Err(e),
        Err(e) => {
            if cli.verbose {
                eprintln!("Using default configuration ({:#})", e);
            }
            AppConfig::default()
        }
    };
    if let Some(database) = &cli.database {
        config.database.url = database.clone();
    }

    // Initialize logging
    let mut logging = LoggingConfig::from_settings(&config.logging.level, config.logging.format);
    if cli.verbose {
        logging = logging.verbose();
    }
    init_logging_with_config(logging);

    // Execute command
    match cli.command {
        Commands::Datasource { action } => {
            let user = acting_user(cli.user, cli.groups, &config)?;
            let registry = open_registry(&config.database).await?;
            let ctx = CommandContext {
                registry,
                user,
                defaults: config.defaults,
                format: cli.format,
            };
            run_datasource_command(action, &ctx)
                .instrument(repository_span!("datasource", "cli", user = %ctx.user.username))
                .await
        }
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format),
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from("datasource-registry.yaml")
}

/// Resolves the acting user from flags, then config defaults.
fn acting_user(user: Option<String>, groups: Vec<String>, config: &AppConfig) -> Result<User> {
    let Some(username) = user.or_else(|| config.defaults.user.clone()) else {
        bail!("No acting user; pass --user or set defaults.user");
    };

    let groups = if groups.is_empty() {
        config.defaults.groups.clone()
    } else {
        groups
    };

    Ok(groups
        .into_iter()
        .fold(User::new(username), |user, group| user.with_group(group)))
}

fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        println!("Database: {}", display_config.database.url);
        if let Some(max) = display_config.database.max_connections {
            println!("Max connections: {}", max);
        }
        println!(
            "Logging: {} ({:?})",
            display_config.logging.level, display_config.logging.format
        );
        println!("\nDefaults:");
        println!(
            "  Organization: {}",
            display_config.defaults.organization_id.as_deref().unwrap_or("-")
        );
        println!(
            "  Plugin: {}",
            display_config.defaults.plugin_id.as_deref().unwrap_or("-")
        );
        println!(
            "  User: {}",
            display_config.defaults.user.as_deref().unwrap_or("-")
        );
        if !display_config.defaults.groups.is_empty() {
            println!("  Groups: {}", display_config.defaults.groups.join(", "));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_acting_user_prefers_flags() {
        let mut config = AppConfig::default();
        config.defaults.user = Some("default@example.com".to_string());
        config.defaults.groups = vec!["ops".to_string()];

        let user = acting_user(
            Some("ana@example.com".to_string()),
            vec!["eng".to_string()],
            &config,
        )
        .unwrap();
        assert_eq!(user.username, "ana@example.com");
        assert!(user.in_group("eng"));
        assert!(!user.in_group("ops"));

        let fallback = acting_user(None, Vec::new(), &config).unwrap();
        assert_eq!(fallback.username, "default@example.com");
        assert!(fallback.in_group("ops"));
    }

    #[test]
    fn test_acting_user_required() {
        assert!(acting_user(None, Vec::new(), &AppConfig::default()).is_err());
    }

    #[test]
    fn test_cli_parses_datasource_create() {
        let cli = Cli::try_parse_from([
            "datasource-registry",
            "--database",
            "memory",
            "datasource",
            "create",
            "Users API",
            "--plugin",
            "restapi-plugin",
            "--org",
            "org-1",
            "--header",
            "Accept=application/json",
            "--user",
            "ana@example.com",
        ])
        .unwrap();

        assert_eq!(cli.database.as_deref(), Some("memory"));
        assert_eq!(cli.user.as_deref(), Some("ana@example.com"));
        assert!(matches!(
            cli.command,
            Commands::Datasource {
                action: DatasourceCommands::Create { .. }
            }
        ));
    }
}
