//! Administrative CLI for the Quire resource history.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use quire_core::config::AppConfig;
use quire_core::{
    BackupFile, BackupHeader, BackupProject, HistoryKey, PurgeScope, ResourceId, RetentionPolicy,
    StructureId,
};
use quire_metadata::{MetadataStore, PurgeStats, RetentionManager};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quirectl")]
#[command(about = "Administrative CLI for the Quire resource history")]
#[command(version)]
struct Cli {
    /// Config file path (optional; QUIRE_* environment variables override it)
    #[arg(long, env = "QUIRE_CONFIG", default_value = "quire.toml", global = true)]
    config: PathBuf,

    /// Print JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing history tables and indexes
    Migrate,
    /// List every version of one resource, oldest first
    History {
        /// Root path of the resource
        #[arg(long)]
        path: String,
        /// Structure id of the resource
        #[arg(long)]
        structure_id: String,
    },
    /// List the latest backup of every resource, newest first
    Latest,
    /// Show one backup
    Show(ShowArgs),
    /// Delete historical versions
    Purge(PurgeArgs),
    /// Property definition commands
    Properties {
        #[command(subcommand)]
        command: PropertyCommands,
    },
    /// Project publish record commands
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Print the next free publish tag
    NextTag,
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["structure_id", "path"])))]
struct ShowArgs {
    /// Publish tag of the backup
    #[arg(long)]
    tag: i32,
    /// Structure id of the resource
    #[arg(long)]
    structure_id: Option<String>,
    /// Root path of the resource
    #[arg(long)]
    path: Option<String>,
    /// Write the backed-up content to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("policy").args(["max_tag", "max_versions"])))]
struct PurgeArgs {
    /// Delete every version published with this tag or an older one
    #[arg(long)]
    max_tag: Option<i32>,
    /// Versions to keep per resource (default: retention.max_versions)
    #[arg(long)]
    max_versions: Option<u32>,
    /// Limit the purge to one structure entry
    #[arg(long, requires = "resource_id")]
    structure_id: Option<String>,
    /// Resource id belonging to --structure-id
    #[arg(long, requires = "structure_id")]
    resource_id: Option<String>,
}

#[derive(Subcommand)]
enum PropertyCommands {
    /// Create a property definition
    Define { name: String },
    /// Delete a property definition no backup or live resource uses
    Delete { name: String },
    /// List property definitions
    List,
    /// Show the properties recorded with one backup
    Show {
        #[arg(long)]
        tag: i32,
        #[arg(long)]
        structure_id: String,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List recent project publish records, newest first
    List,
    /// Show the project published with a tag
    Show { tag: i32 },
    /// Print the highest tag published at or before an RFC 3339 date
    TagForDate { date: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(
        config = %cli.config.display(),
        max_versions = config.retention.max_versions,
        "configuration loaded"
    );

    let store = quire_metadata::from_config(&config.metadata)
        .await
        .context("failed to open history store")?;
    let manager = RetentionManager::new(store)
        .with_project_list_limit(config.retention.project_list_limit);
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Migrate => {
            manager
                .store()
                .migrate()
                .await
                .context("failed to migrate history schema")?;
            out.message("History schema is up to date")
        }
        Commands::History { path, structure_id } => {
            let key = HistoryKey::new(path, parse_structure_id(&structure_id)?);
            let headers = manager.list_headers(Some(&key)).await?;
            out.headers(&headers)
        }
        Commands::Latest => {
            let headers = manager.list_headers(None).await?;
            out.headers(&headers)
        }
        Commands::Show(args) => handle_show(&manager, args, &out).await,
        Commands::Purge(args) => handle_purge(&manager, &config, args, &out).await,
        Commands::Properties { command } => handle_property_command(&manager, command, &out).await,
        Commands::Projects { command } => handle_project_command(&manager, command, &out).await,
        Commands::NextTag => {
            let tag = manager.next_tag().await?;
            out.value(&tag, &tag.to_string())
        }
    }
}

/// Defaults, then the TOML file if present, then `QUIRE_` environment
/// variables (`__` separates nested keys).
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("QUIRE_").ignore(&["config"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn parse_structure_id(value: &str) -> Result<StructureId> {
    StructureId::parse(value).with_context(|| format!("invalid structure id '{value}'"))
}

fn parse_resource_id(value: &str) -> Result<ResourceId> {
    ResourceId::parse(value).with_context(|| format!("invalid resource id '{value}'"))
}

async fn handle_show(manager: &RetentionManager, args: ShowArgs, out: &Output) -> Result<()> {
    let file = match (&args.structure_id, &args.path) {
        (Some(structure_id), _) => {
            manager
                .read_backup(args.tag, parse_structure_id(structure_id)?)
                .await?
        }
        (None, Some(path)) => manager.read_backup_by_path(args.tag, path).await?,
        (None, None) => anyhow::bail!("either --structure-id or --path is required"),
    };

    if let Some(output) = &args.output {
        tokio::fs::write(output, &file.content)
            .await
            .with_context(|| format!("failed to write content to {}", output.display()))?;
    }

    out.backup(&file)
}

async fn handle_purge(
    manager: &RetentionManager,
    config: &AppConfig,
    args: PurgeArgs,
    out: &Output,
) -> Result<()> {
    let policy = match (args.max_tag, args.max_versions) {
        (Some(tag), _) => RetentionPolicy::MaxTag(tag),
        (None, Some(versions)) => RetentionPolicy::MaxVersions(versions),
        (None, None) => RetentionPolicy::MaxVersions(config.retention.max_versions),
    };
    let scope = match (&args.structure_id, &args.resource_id) {
        (Some(structure_id), Some(resource_id)) => PurgeScope::Resource {
            structure_id: parse_structure_id(structure_id)?,
            resource_id: parse_resource_id(resource_id)?,
        },
        _ => PurgeScope::All,
    };

    let stats = manager.purge(scope, policy).await?;
    out.purge_stats(&stats)
}

async fn handle_property_command(
    manager: &RetentionManager,
    command: PropertyCommands,
    out: &Output,
) -> Result<()> {
    match command {
        PropertyCommands::Define { name } => {
            let definition = manager.create_property_definition(&name).await?;
            out.value(
                &definition,
                &format!("Defined property '{}' ({})", definition.name, definition.id),
            )
        }
        PropertyCommands::Delete { name } => {
            manager.delete_property_definition(&name).await?;
            out.message(&format!("Deleted property '{name}'"))
        }
        PropertyCommands::List => {
            let definitions = manager.list_property_definitions().await?;
            let text = definitions
                .iter()
                .map(|d| format!("{}  {}", d.id, d.name))
                .collect::<Vec<_>>()
                .join("\n");
            out.value(&definitions, &text)
        }
        PropertyCommands::Show { tag, structure_id } => {
            let file = manager
                .read_backup(tag, parse_structure_id(&structure_id)?)
                .await?;
            let properties = manager.read_properties(&file.header).await?;
            let text = properties
                .iter()
                .map(|p| {
                    format!(
                        "{}: structure={} resource={}",
                        p.name,
                        p.structure_value.as_deref().unwrap_or("-"),
                        p.resource_value.as_deref().unwrap_or("-")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            out.value(&properties, &text)
        }
    }
}

async fn handle_project_command(
    manager: &RetentionManager,
    command: ProjectCommands,
    out: &Output,
) -> Result<()> {
    match command {
        ProjectCommands::List => {
            let projects = manager.list_projects().await?;
            let lines = projects
                .iter()
                .map(project_line)
                .collect::<Result<Vec<_>>>()?;
            out.value(&projects, &lines.join("\n"))
        }
        ProjectCommands::Show { tag } => {
            let project = manager.read_project(tag).await?;
            let mut text = project_line(&project)?;
            for path in &project.resources {
                text.push_str(&format!("\n  {path}"));
            }
            out.value(&project, &text)
        }
        ProjectCommands::TagForDate { date } => {
            let date = OffsetDateTime::parse(&date, &Rfc3339)
                .with_context(|| format!("invalid RFC 3339 date '{date}'"))?;
            let tag = manager.tag_for_date(date).await?;
            out.value(&tag, &tag.to_string())
        }
    }
}

fn project_line(project: &BackupProject) -> Result<String> {
    Ok(format!(
        "{:>6}  {}  {}  published by {}",
        project.tag_id,
        project.publish_date.format(&Rfc3339)?,
        project.name,
        display_name(&project.published_by_name),
    ))
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<unknown>" } else { name }
}

/// Text or JSON rendering of command results on stdout.
struct Output {
    json: bool,
}

impl Output {
    fn value<T: Serialize>(&self, value: &T, text: &str) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else if !text.is_empty() {
            println!("{text}");
        }
        Ok(())
    }

    fn message(&self, text: &str) -> Result<()> {
        self.value(&serde_json::json!({ "message": text }), text)
    }

    fn headers(&self, headers: &[BackupHeader]) -> Result<()> {
        let lines = headers
            .iter()
            .map(header_line)
            .collect::<Result<Vec<_>>>()?;
        self.value(&headers, &lines.join("\n"))
    }

    fn backup(&self, file: &BackupFile) -> Result<()> {
        let value = serde_json::json!({
            "header": file.header,
            "content_id": file.content_id,
            "content_length": file.content.len(),
        });
        let text = format!(
            "{}\ncontent {} ({} bytes)",
            header_line(&file.header)?,
            file.content_id,
            file.content.len()
        );
        self.value(&value, &text)
    }

    fn purge_stats(&self, stats: &PurgeStats) -> Result<()> {
        let text = format!(
            "Deleted {} backups ({} resource, {} content, {} property rows)",
            stats.backups_deleted, stats.resource_rows, stats.content_rows, stats.property_rows
        );
        self.value(stats, &text)
    }
}

fn header_line(header: &BackupHeader) -> Result<String> {
    Ok(format!(
        "tag {:>5}  v{:<3} {}  {:?}  {}  modified by {}",
        header.tag_id,
        header.version_id,
        header.date_published.format(&Rfc3339)?,
        header.state,
        header.root_path,
        display_name(&header.user_last_modified_name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_purge_policy_flags_conflict() {
        let result = Cli::try_parse_from(["quirectl", "purge", "--max-tag", "3", "--max-versions", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_purge_resource_scope_requires_both_ids() {
        let result = Cli::try_parse_from([
            "quirectl",
            "purge",
            "--structure-id",
            "6f1c1a4e-9a53-4c7e-9a57-5d2c1c9f0b11",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let temp = tempfile::tempdir().unwrap();
        let config = load_config(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.retention.max_versions, 10);
    }

    #[test]
    fn test_load_config_reads_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("quire.toml");
        std::fs::write(
            &path,
            "[metadata]\ntype = \"sqlite\"\npath = \"/var/lib/quire/history.db\"\n\n[retention]\nmax_versions = 4\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.retention.max_versions, 4);
        assert_eq!(config.retention.project_list_limit, 300);
        assert!(matches!(
            config.metadata,
            quire_core::config::MetadataConfig::Sqlite { ref path, .. }
                if path == Path::new("/var/lib/quire/history.db")
        ));
    }

    #[test]
    fn test_load_config_rejects_zero_versions() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("quire.toml");
        std::fs::write(&path, "[retention]\nmax_versions = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
