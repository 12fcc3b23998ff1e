use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gator::commands::{self, parse_interval, Session};
use gator::config::{self, Config};
use gator::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "RSS feed aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// List users, marking the current one
    Users,
    /// Delete all users, feeds, follows and posts
    Reset,
    /// Add a feed owned by the current user and follow it
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow a feed someone already added
    Follow { url: String },
    /// Stop following a feed
    Unfollow { url: String },
    /// List feeds the current user follows
    Following,
    /// Poll feeds forever, one per interval (e.g. 30s, 1m30s, 2h)
    Agg {
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => config::config_dir()
            .context("Failed to locate config directory")?
            .join("config.toml"),
    };

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // The database defaults to living next to the config file
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    let db_path = config.resolved_db_path(config_dir);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory {}", parent.display())
        })?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let mut session = Session::new(config, config_path, db);
    let mut out = std::io::stdout().lock();

    match args.command {
        Command::Register { name } => commands::register(&mut session, &name, &mut out).await?,
        Command::Login { name } => commands::login(&mut session, &name, &mut out).await?,
        Command::Users => commands::users(&session, &mut out).await?,
        Command::Reset => commands::reset(&mut session, &mut out).await?,
        Command::Addfeed { name, url } => {
            commands::addfeed(&session, &name, &url, &mut out).await?
        }
        Command::Feeds => commands::feeds(&session, &mut out).await?,
        Command::Follow { url } => commands::follow(&session, &url, &mut out).await?,
        Command::Unfollow { url } => commands::unfollow(&session, &url, &mut out).await?,
        Command::Following => commands::following(&session, &mut out).await?,
        Command::Agg { interval } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            commands::agg(&session, interval, shutdown, &mut out).await?
        }
    }

    Ok(())
}
