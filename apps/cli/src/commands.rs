//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use refresh_core::{ArticleOutcome, RefreshPipeline, RunReport};
use refresh_shared::{
    AppConfig, ArticleId, BackendKind, GenerationSection, NewArticle, PipelineConfig,
    init_config, init_config_at, load_config, load_config_from, validate_api_keys,
};
use refresh_storage::{ArticleStore, Storage};
use tracing::info;
use url::Url;

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// article-refresh: rewrite stored articles using fresh reference material.
#[derive(Parser)]
#[command(
    name = "refresh",
    version,
    about = "Rewrite stored blog articles using web references and a language model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.article-refresh/article-refresh.toml).
    #[arg(long, global = true, env = "ARTICLE_REFRESH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Rewrite every pending article once.
    Run {
        /// Process at most this many pending articles.
        #[arg(long)]
        limit: Option<usize>,

        /// Run every stage but do not save rewrites.
        #[arg(long)]
        dry_run: bool,

        /// Override the requests-per-minute ceiling.
        #[arg(long)]
        rpm: Option<u32>,

        /// Use this generation backend with its default model and key variable.
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// List stored articles.
    List {
        /// Only originals that have not been rewritten.
        #[arg(long, conflicts_with = "updated")]
        pending: bool,

        /// Only rewritten articles.
        #[arg(long)]
        updated: bool,
    },

    /// Store a new original article.
    Add {
        /// Article title.
        #[arg(long)]
        title: String,

        /// File holding the article body.
        #[arg(long)]
        content_file: PathBuf,

        /// Where the article was published.
        #[arg(long)]
        source_url: Option<String>,
    },

    /// Print one article with its reference links.
    Show {
        /// Article ID.
        id: String,
    },

    /// Remove an article.
    Delete {
        /// Article ID.
        id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "refresh=info",
        1 => "refresh=debug",
        _ => "refresh=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            limit,
            dry_run,
            rpm,
            backend,
        } => cmd_run(config_path, limit, dry_run, rpm, backend).await,
        Command::List { pending, updated } => cmd_list(config_path, pending, updated).await,
        Command::Add {
            title,
            content_file,
            source_url,
        } => cmd_add(config_path, &title, &content_file, source_url).await,
        Command::Show { id } => cmd_show(config_path, &id).await,
        Command::Delete { id } => cmd_delete(config_path, &id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = config.storage.resolved_db_path()?;
    Ok(Storage::open(&db_path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    limit: Option<usize>,
    dry_run: bool,
    rpm: Option<u32>,
    backend: Option<BackendKind>,
) -> Result<()> {
    let mut config = load(config_path)?;
    if let Some(backend) = backend {
        config.generation = GenerationSection {
            backend,
            ..GenerationSection::default()
        };
    }
    if let Some(rpm) = rpm {
        config.pipeline.requests_per_minute = rpm;
    }
    config.validate()?;

    // Fail before touching the database if a key is missing.
    validate_api_keys(&config)?;

    let pipeline_config = PipelineConfig {
        limit,
        dry_run,
        ..PipelineConfig::from(&config.pipeline)
    };

    let store = Arc::new(open_storage(&config).await?);
    let pipeline = RefreshPipeline::from_app_config(store, &config, pipeline_config)?;

    info!(
        backend = %config.generation.backend,
        rpm = config.pipeline.requests_per_minute,
        dry_run,
        "starting refresh"
    );

    let progress = CliProgress::new();
    let report = pipeline.run(&progress).await;
    progress.finish();

    print_report(&report?);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    if report.outcomes.is_empty() {
        println!("  No pending articles.");
        println!();
        return;
    }

    let updated_label = if report.dry_run { "Would update" } else { "Updated" };
    println!("  Refresh run complete{}", if report.dry_run { " (dry run)" } else { "" });
    println!("  {updated_label:<13} {}", report.updated());
    println!("  {:<13} {}", "Skipped", report.skipped());
    println!("  {:<13} {}", "Errored", report.errored());
    println!("  {:<13} {:.1}s", "Time", report.elapsed.as_secs_f64());
    println!();

    println!("  {:<9} {:<36}  TITLE", "OUTCOME", "ID");
    for entry in &report.outcomes {
        let detail = match &entry.outcome {
            ArticleOutcome::Updated => String::new(),
            ArticleOutcome::Skipped(reason) => format!("  ({reason})"),
            ArticleOutcome::Errored(message) => format!("  ({message})"),
        };
        println!(
            "  {:<9} {:<36}  {}{detail}",
            entry.outcome.label(),
            entry.id,
            entry.title
        );
    }
    println!();
}

async fn cmd_list(config_path: Option<&Path>, pending: bool, updated: bool) -> Result<()> {
    let config = load(config_path)?;
    let storage = open_storage(&config).await?;

    let articles = if pending {
        storage.list_pending().await?
    } else {
        let all = storage.list_all().await?;
        if updated {
            all.into_iter().filter(|a| a.is_updated).collect()
        } else {
            all
        }
    };

    if articles.is_empty() {
        println!("No articles found.");
        return Ok(());
    }

    println!("{:<36}  {:<9} {:>4}  TITLE", "ID", "STATUS", "REFS");
    for article in &articles {
        let status = if article.is_updated { "updated" } else { "original" };
        println!(
            "{:<36}  {:<9} {:>4}  {}",
            article.id,
            status,
            article.reference_links.len(),
            article.title
        );
    }
    Ok(())
}

async fn cmd_add(
    config_path: Option<&Path>,
    title: &str,
    content_file: &Path,
    source_url: Option<String>,
) -> Result<()> {
    if let Some(url) = &source_url {
        Url::parse(url).map_err(|e| eyre!("invalid source URL '{url}': {e}"))?;
    }

    let content = std::fs::read_to_string(content_file)
        .map_err(|e| eyre!("cannot read '{}': {e}", content_file.display()))?;
    if content.trim().is_empty() {
        return Err(eyre!("'{}' is empty", content_file.display()));
    }

    let config = load(config_path)?;
    let storage = open_storage(&config).await?;
    let id = storage
        .create(NewArticle::original(title.trim(), content, source_url))
        .await?;

    info!(%id, title, "article added");
    println!("{id}");
    Ok(())
}

fn parse_id(id: &str) -> Result<ArticleId> {
    id.parse()
        .map_err(|e| eyre!("invalid article id '{id}': {e}"))
}

async fn cmd_show(config_path: Option<&Path>, id: &str) -> Result<()> {
    let article_id = parse_id(id)?;

    let config = load(config_path)?;
    let storage = open_storage(&config).await?;
    let article = storage
        .get(&article_id)
        .await?
        .ok_or_else(|| eyre!("article {id} not found"))?;

    println!("ID:       {}", article.id);
    println!("Title:    {}", article.title);
    println!("Slug:     {}", article.slug);
    println!(
        "Status:   {}",
        if article.is_updated { "updated" } else { "original" }
    );
    if let Some(url) = &article.source_url {
        println!("Source:   {url}");
    }
    println!("Created:  {}", article.created_at.to_rfc3339());
    println!("Updated:  {}", article.updated_at.to_rfc3339());
    if !article.reference_links.is_empty() {
        println!("References:");
        for link in &article.reference_links {
            println!("  - {link}");
        }
    }
    println!();
    println!("{}", article.content);
    Ok(())
}

async fn cmd_delete(config_path: Option<&Path>, id: &str) -> Result<()> {
    let article_id = parse_id(id)?;

    let config = load(config_path)?;
    let storage = open_storage(&config).await?;
    if storage.get(&article_id).await?.is_none() {
        return Err(eyre!("article {id} not found"));
    }
    storage.delete(&article_id).await?;

    info!(%article_id, "article deleted");
    println!("Deleted {article_id}");
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
