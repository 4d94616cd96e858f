use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::LogFormat;
use database::{Database, TxContext};
use std::path::PathBuf;
use std::sync::Arc;
use timelines::{TimelineCreateReq, TimelineService};

mod hooks;

use hooks::ShutdownHooks;

/// The entry point for the accelerate driver.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets such as AC_DATABASE__PASSWORD may live in a .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => configuration::load_config_from(path, configuration::environment()),
        None => configuration::load_config(),
    }
    .context("problem reading configuration")?;
    if let Some(format) = cli.log_format {
        config.logger.format = format;
    }
    let _log_guard = configuration::init_logging(&config.logger).context("problem creating logger")?;

    let db = Arc::new(Database::new(config.database));
    db.connect().await.context("problem creating database")?;

    let mut hooks = ShutdownHooks::default();
    let closing = db.clone();
    hooks.before_shutdown("database", move || async move { closing.shutdown().await });

    let outcome = match cli.command {
        Commands::Serve => serve().await,
        Commands::CreateTimeline(args) => create_timeline(db.clone(), args).await,
        Commands::ListTimelines(args) => list_timelines(db.clone(), args).await,
    };

    tracing::info!(hooks = hooks.len(), "shutting down");
    let stopped = hooks.run().await;

    outcome?;
    stopped.context("problem shutting down")?;
    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Pooled PostgreSQL access with a sample timelines service.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file [default: config.toml]. A missing
    /// file is not an error.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured log format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hold the connection pool open until SIGINT or SIGTERM.
    Serve,
    /// Store a new timeline for a user.
    CreateTimeline(CreateTimelineArgs),
    /// Print every timeline owned by a user.
    ListTimelines(ListTimelinesArgs),
}

#[derive(Parser)]
struct CreateTimelineArgs {
    /// The owning user's id.
    #[arg(long)]
    user: String,

    /// The timeline's display name.
    #[arg(long)]
    name: String,
}

#[derive(Parser)]
struct ListTimelinesArgs {
    /// The owning user's id.
    #[arg(long)]
    user: String,

    /// Print the raw list response as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn serve() -> anyhow::Result<()> {
    tracing::info!("database ready, waiting for a shutdown signal");
    shutdown_signal().await
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        res = ctrl_c => {
            res.context("failed to listen for Ctrl+C")?;
            tracing::info!("received SIGINT, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
    Ok(())
}

async fn create_timeline(db: Arc<Database>, args: CreateTimelineArgs) -> anyhow::Result<()> {
    let service = timelines::new_service(db);
    let created = service
        .create_timeline(
            TxContext::new(),
            &args.user,
            TimelineCreateReq { name: args.name },
        )
        .await?;

    println!("Created timeline {} ({})", created.timeline.name, created.id);
    Ok(())
}

async fn list_timelines(db: Arc<Database>, args: ListTimelinesArgs) -> anyhow::Result<()> {
    let service = timelines::new_service(db);
    let resp = service.list_timelines(TxContext::new(), &args.user).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    if resp.records.is_empty() {
        println!("No timelines found for user {}", args.user);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Created", "Updated"]);
    for t in &resp.records {
        table.add_row(vec![
            t.id.to_string(),
            t.timeline.name.clone(),
            t.timeline.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            t.timeline.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
