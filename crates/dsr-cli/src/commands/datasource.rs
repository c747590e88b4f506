//! Datasource commands - create, list, inspect, update and archive.

use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::debug;

use dsr_core::db::{DatasourceUpdate, Pagination};
use dsr_core::{
    AclPermission, AuthenticationDTO, Datasource, DatasourceConfiguration, Endpoint, Entity,
    Property, User,
};

use super::Registry;
use crate::config::DefaultsConfig;
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum DatasourceCommands {
    /// Create a datasource owned by the acting user
    Create {
        /// Datasource name
        name: String,

        /// Plugin that executes queries against this datasource
        #[arg(short, long)]
        plugin: Option<String>,

        /// Organization id
        #[arg(short, long)]
        org: Option<String>,

        /// Base URL (API datasources)
        #[arg(long)]
        url: Option<String>,

        /// Template the datasource was created from
        #[arg(long)]
        template: Option<String>,

        /// Default header as KEY=VALUE (repeatable)
        #[arg(long = "header", value_name = "KEY=VALUE")]
        headers: Vec<String>,

        /// Endpoint as HOST[:PORT] (repeatable)
        #[arg(long = "endpoint", value_name = "HOST[:PORT]")]
        endpoints: Vec<String>,

        /// Authentication type (e.g. basic, dbAuth)
        #[arg(long)]
        auth_type: Option<String>,

        /// Authentication username
        #[arg(long)]
        auth_username: Option<String>,

        /// Authentication password
        #[arg(long)]
        auth_password: Option<String>,

        /// Database name
        #[arg(long)]
        database_name: Option<String>,
    },

    /// List an organization's datasources
    List {
        /// Organization id
        #[arg(short, long)]
        org: Option<String>,

        /// Only show the datasource with this name
        #[arg(short, long)]
        name: Option<String>,

        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Datasources per page
        #[arg(long, default_value = "50")]
        per_page: u32,
    },

    /// Show datasource details
    Get {
        /// Datasource id
        id: String,
    },

    /// Update a datasource
    Update {
        /// Datasource id
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New template name
        #[arg(long)]
        template: Option<String>,

        /// New base URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Archive a datasource
    Archive {
        /// Datasource id
        id: String,
    },
}

/// Everything a datasource command needs besides its arguments.
pub struct CommandContext {
    pub registry: Registry,
    pub user: User,
    pub defaults: DefaultsConfig,
    pub format: OutputFormat,
}

impl CommandContext {
    fn organization(&self, org: Option<String>) -> Result<String> {
        org.or_else(|| self.defaults.organization_id.clone())
            .ok_or_else(|| anyhow!("No organization given; pass --org or set defaults.organization_id"))
    }
}

pub async fn run_datasource_command(action: DatasourceCommands, ctx: &CommandContext) -> Result<()> {
    debug!(user = %ctx.user.username, "Running datasource command");

    match action {
        DatasourceCommands::Create {
            name,
            plugin,
            org,
            url,
            template,
            headers,
            endpoints,
            auth_type,
            auth_username,
            auth_password,
            database_name,
        } => {
            let organization_id = ctx.organization(org)?;
            let plugin_id = plugin
                .or_else(|| ctx.defaults.plugin_id.clone())
                .ok_or_else(|| anyhow!("No plugin given; pass --plugin or set defaults.plugin_id"))?;

            let authentication = if auth_type.is_some()
                || auth_username.is_some()
                || auth_password.is_some()
                || database_name.is_some()
            {
                Some(AuthenticationDTO {
                    auth_type,
                    username: auth_username,
                    password: auth_password,
                    database_name,
                })
            } else {
                None
            };

            let configuration = DatasourceConfiguration {
                url,
                headers: headers
                    .iter()
                    .map(|h| parse_header(h))
                    .collect::<Result<_>>()?,
                authentication,
                endpoints: endpoints
                    .iter()
                    .map(|e| parse_endpoint(e))
                    .collect::<Result<_>>()?,
            };

            let mut datasource = Datasource::new(name, plugin_id, organization_id)
                .with_configuration(configuration);
            datasource.template_name = template;
            datasource.base.policies = ctx
                .registry
                .policy_utils
                .generate_policies(&[AclPermission::ManageDatasources], &ctx.user);
            datasource.refresh_validity();

            let saved = ctx.registry.repository.save(&datasource).await?;
            let saved = ctx
                .registry
                .policy_utils
                .set_user_permissions_in_object(saved, &ctx.user);

            if ctx.format == OutputFormat::Text {
                println!("{}", "Datasource created".green().bold());
            }
            print_datasource(&saved, ctx.format)?;
        }

        DatasourceCommands::List {
            org,
            name,
            page,
            per_page,
        } => {
            let organization_id = ctx.organization(org)?;
            let repository = &ctx.registry.repository;

            if let Some(name) = name {
                let found = repository
                    .find_by_name_and_organization_id(
                        &name,
                        &organization_id,
                        Some(AclPermission::ReadDatasources),
                        &ctx.user,
                    )
                    .await?;
                match found {
                    Some(datasource) => print_datasource(&datasource, ctx.format)?,
                    None => bail!("No datasource named '{}' in {}", name, organization_id),
                }
                return Ok(());
            }

            let result = repository
                .find_page_by_organization_id(
                    &organization_id,
                    Some(AclPermission::ReadDatasources),
                    &ctx.user,
                    &Pagination::new(page, per_page),
                )
                .await?;

            if ctx.format == OutputFormat::Json {
                let items: Vec<Datasource> = result.items.iter().map(Datasource::redacted).collect();
                let response = serde_json::json!({
                    "items": items,
                    "total": result.total,
                    "page": result.page,
                    "perPage": result.per_page,
                    "totalPages": result.total_pages,
                });
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{} {}", "Datasources in".bold(), organization_id.bold());
                println!("─────────────────────");
                if result.is_empty() {
                    println!("No datasources found");
                } else {
                    for datasource in &result.items {
                        println!("  {}", summary_line(datasource));
                    }
                    println!();
                    println!(
                        "Page {}/{} ({} total)",
                        result.page, result.total_pages, result.total
                    );
                }
            }
        }

        DatasourceCommands::Get { id } => {
            let found = ctx
                .registry
                .repository
                .find_by_id(&id, Some(AclPermission::ReadDatasources), &ctx.user)
                .await?;
            match found {
                Some(datasource) => print_datasource(&datasource, ctx.format)?,
                None => bail!("Datasource {} not found", id),
            }
        }

        DatasourceCommands::Update {
            id,
            name,
            template,
            url,
        } => {
            let datasource_configuration = match url {
                Some(url) => {
                    let current = ctx
                        .registry
                        .repository
                        .find_by_id(&id, Some(AclPermission::ManageDatasources), &ctx.user)
                        .await?
                        .with_context(|| format!("Datasource {} not found", id))?;
                    let mut configuration = current.datasource_configuration.unwrap_or_default();
                    configuration.url = Some(url);
                    Some(configuration)
                }
                None => None,
            };

            let update = DatasourceUpdate {
                name,
                template_name: template,
                datasource_configuration,
            };
            if update.is_empty() {
                bail!("Nothing to update; pass --name, --template or --url");
            }

            let updated = ctx
                .registry
                .repository
                .update_by_id(&id, &update, Some(AclPermission::ManageDatasources), &ctx.user)
                .await?
                .with_context(|| format!("Datasource {} not found", id))?;

            if ctx.format == OutputFormat::Text {
                println!("{}", "Datasource updated".green().bold());
            }
            print_datasource(&updated, ctx.format)?;
        }

        DatasourceCommands::Archive { id } => {
            let archived = ctx
                .registry
                .repository
                .archive_by_id(&id, Some(AclPermission::ManageDatasources), &ctx.user)
                .await?;
            if !archived {
                bail!("Datasource {} not found", id);
            }

            if ctx.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "id": id, "archived": true }));
            } else {
                println!("Archived datasource {}", id.cyan());
            }
        }
    }

    Ok(())
}

fn parse_header(raw: &str) -> Result<Property> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid header '{}': expected KEY=VALUE", raw))?;
    Ok(Property::new(key.trim(), value.trim()))
}

fn parse_endpoint(raw: &str) -> Result<Endpoint> {
    match raw.rsplit_once(':') {
        Some((host, port)) => Ok(Endpoint {
            host: Some(host.to_string()),
            port: Some(
                port.parse()
                    .with_context(|| format!("Invalid port in endpoint '{}'", raw))?,
            ),
        }),
        None => Ok(Endpoint {
            host: Some(raw.to_string()),
            port: None,
        }),
    }
}

fn summary_line(datasource: &Datasource) -> String {
    let validity = if datasource.is_valid {
        "valid".green()
    } else {
        "invalid".red()
    };
    format!(
        "{} {} [{}] {}",
        datasource.id().unwrap_or("-").cyan(),
        datasource.name,
        validity,
        datasource.plugin_id.as_deref().unwrap_or("-")
    )
}

fn print_datasource(datasource: &Datasource, format: OutputFormat) -> Result<()> {
    let datasource = datasource.redacted();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&datasource)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "Datasource:".bold(),
        datasource.id().unwrap_or("-")
    );
    println!("─────────────────────────────────────────");
    println!("  {} {}", "Name:".cyan(), datasource.name);
    println!(
        "  {} {}",
        "Plugin:".cyan(),
        datasource.plugin_id.as_deref().unwrap_or("-")
    );
    println!(
        "  {} {}",
        "Organization:".cyan(),
        datasource.organization_id.as_deref().unwrap_or("-")
    );
    if let Some(template) = &datasource.template_name {
        println!("  {} {}", "Template:".cyan(), template);
    }
    if let Some(url) = datasource.url() {
        println!("  {} {}", "URL:".cyan(), url);
    }
    if let Some(configuration) = &datasource.datasource_configuration {
        for endpoint in &configuration.endpoints {
            let host = endpoint.host.as_deref().unwrap_or("-");
            match endpoint.port {
                Some(port) => println!("  {} {}:{}", "Endpoint:".cyan(), host, port),
                None => println!("  {} {}", "Endpoint:".cyan(), host),
            }
        }
        if let Some(auth) = &configuration.authentication {
            println!(
                "  {} {} ({})",
                "Auth:".cyan(),
                auth.auth_type.as_deref().unwrap_or("-"),
                auth.username.as_deref().unwrap_or("-")
            );
        }
    }
    if let Some(created_at) = datasource.base.created_at {
        println!(
            "  {} {}",
            "Created:".cyan(),
            created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    let permissions: Vec<&str> = datasource
        .base
        .user_permissions
        .iter()
        .map(String::as_str)
        .collect();
    println!("  {} {}", "Permissions:".cyan(), permissions.join(", "));

    if datasource.is_valid {
        println!("  {} {}", "Status:".cyan(), "valid".green());
    } else {
        println!("  {} {}", "Status:".cyan(), "invalid".red());
        for invalid in &datasource.invalids {
            println!("    - {}", invalid.yellow());
        }
    }

    Ok(())
}
