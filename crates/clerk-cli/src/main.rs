//! clerk: turn natural-language notes into tasks from the command line.
//!
//! Environment variables:
//!   DATABASE_URL           - PostgreSQL connection string
//!   CLERK_DEFAULT_BACKEND  - backend used when an owner has no preference
//!   OLLAMA_*, QIANWEN_*, OPENAI_*  - backend endpoints, models and keys
//!   LOG_FORMAT, LOG_FILE, LOG_ANSI, RUST_LOG  - logging

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use clerk_core::{ExtractionBackend, InputType, UserSettings};
use clerk_db::{log_pool_health, Database, PoolConfig};
use clerk_inference::{BackendKind, BackendSelector};
use clerk_ingest::{IngestionPipeline, PipelineConfig};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/clerk";

#[derive(Parser)]
#[command(name = "clerk")]
#[command(author, version, about = "Natural-language task ingestion")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tasks from text and store them for an owner
    Ingest {
        /// Owner id
        #[arg(short, long)]
        owner: Uuid,

        /// How the text was captured: text or voice
        #[arg(short = 't', long, default_value = "text")]
        input_type: String,

        /// Force a backend (ollama, qianwen, openai) instead of the owner's preference
        #[arg(short, long)]
        backend: Option<String>,

        /// Text to ingest; read from stdin when omitted
        text: Vec<String>,
    },

    /// Register an owner
    AddOwner {
        /// Unique username
        username: String,

        /// Preferred AI backend (ollama, qianwen, openai)
        #[arg(long)]
        ai_model: Option<String>,

        /// Preferred language tag, e.g. en-US or zh-CN
        #[arg(long)]
        language: Option<String>,
    },

    /// Apply pending database migrations
    Migrate,

    /// List configured extraction backends and check their health
    Backends,
}

/// Install the tracing subscriber.
///
/// Returns the file writer guard, which must live until exit.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clerk=info,clerk_ingest=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("clerk.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Logs go to stderr so stdout stays machine-readable.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

async fn connect() -> anyhow::Result<Database> {
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("failed to connect to database")
}

fn read_input(words: Vec<String>) -> anyhow::Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read stdin")?;
    Ok(text)
}

async fn ingest(
    owner: Uuid,
    input_type: &str,
    backend: Option<&str>,
    words: Vec<String>,
) -> anyhow::Result<()> {
    let input_type: InputType = input_type.parse().map_err(anyhow::Error::msg)?;
    let text = read_input(words)?;

    let db = connect().await?;
    let selector = BackendSelector::from_env()?;
    let pipeline = IngestionPipeline::new(Arc::new(db.ingestion.clone()), selector)
        .with_config(PipelineConfig::from_env());

    let report = match backend {
        Some(name) => {
            let backend = forced_backend(pipeline.selector(), name)?;
            pipeline
                .ingest_with_backend(owner, &text, input_type, backend)
                .await?
        }
        None => pipeline.ingest_detailed(owner, &text, input_type).await?,
    };

    log_pool_health(db.pool());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// The registered backend for `name`. Never substitutes another kind.
fn forced_backend(
    selector: &BackendSelector,
    name: &str,
) -> anyhow::Result<Arc<dyn ExtractionBackend>> {
    let kind: BackendKind = name.parse()?;
    selector
        .registered()
        .into_iter()
        .find(|(registered, _)| *registered == kind)
        .map(|(_, backend)| backend)
        .with_context(|| format!("backend '{}' is not configured", kind))
}

async fn add_owner(
    username: &str,
    ai_model: Option<String>,
    language: Option<String>,
) -> anyhow::Result<()> {
    let db = connect().await?;
    let owner = db
        .users
        .create_owner(
            username,
            UserSettings {
                ai_model,
                preferred_language: language,
            },
        )
        .await?;
    println!("{}", owner.id);
    Ok(())
}

async fn migrate() -> anyhow::Result<()> {
    let db = connect().await?;
    db.migrate().await.context("migration failed")?;
    info!("Migrations applied");
    Ok(())
}

async fn backends() -> anyhow::Result<()> {
    let selector = BackendSelector::from_env()?;
    for (kind, backend) in selector.registered() {
        let healthy = backend.health_check().await.unwrap_or(false);
        let marker = if kind == selector.default_kind() {
            " (default)"
        } else {
            ""
        };
        println!(
            "{:<8} {:<28} {}{}",
            kind,
            backend.identifier(),
            if healthy { "healthy" } else { "unreachable" },
            marker
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest {
            owner,
            input_type,
            backend,
            text,
        } => ingest(owner, &input_type, backend.as_deref(), text).await,
        Commands::AddOwner {
            username,
            ai_model,
            language,
        } => add_owner(&username, ai_model, language).await,
        Commands::Migrate => migrate().await,
        Commands::Backends => backends().await,
    }
}
