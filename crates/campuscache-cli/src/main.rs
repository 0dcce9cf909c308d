//! Campus portal CLI - prints portal data as JSON, served from the local
//! cache when possible and refreshed from the portal otherwise.

mod cli;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use campuscache_core::{Config, Lifetime, Liveness, Portal};

use cli::{resolve_user, CacheAction, Cli, Command};

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=campuscache_core=debug).
/// The returned guard must stay alive for file logs to be flushed.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "campuscache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    let log_dir = if cli.log_file {
        Some(config.cache_dir()?)
    } else {
        None
    };
    let _guard = init_tracing(log_dir.as_deref())?;
    info!("campuscache starting");

    let portal = if cli.ephemeral {
        Portal::ephemeral(&config)?
    } else {
        Portal::from_config(&config)?
    };

    let lifetime = Lifetime::new();
    let result = run(cli.command, &portal, &config, &lifetime.liveness()).await;
    lifetime.end();

    info!("campuscache finished");
    result
}

async fn run(
    command: Command,
    portal: &Portal,
    config: &Config,
    liveness: &Liveness,
) -> Result<()> {
    match command {
        Command::News => print_json(&portal.news(liveness).await?),
        Command::Events => print_json(&portal.events(liveness).await?),
        Command::Schedule { group } => {
            print_json(&portal.schedule(group.or(config.group_id), liveness).await?)
        }
        Command::Grades { user } => {
            let user = resolve_user(user, config)?;
            print_json(&portal.grades(user, liveness).await?)
        }
        Command::Courses { user } => {
            let user = resolve_user(user, config)?;
            print_json(&portal.courses(user, liveness).await?)
        }
        Command::Profile { user } => {
            let user = resolve_user(user, config)?;
            print_json(&portal.profile(user, liveness).await?)
        }
        Command::Users => print_json(&portal.users(liveness).await?),
        Command::Warm { user } => {
            let report = portal.warm(user.or(config.user_id), liveness).await;
            eprintln!("Loaded {} resource(s)", report.loaded);
            if !report.all_loaded() {
                eprintln!("Failed: {}", report.failed.join(", "));
            }
            Ok(())
        }
        Command::Cache { action } => run_cache(action, portal).await,
    }
}

async fn run_cache(action: CacheAction, portal: &Portal) -> Result<()> {
    let cache = portal.cache();
    match action {
        CacheAction::Clear => {
            cache.try_clear().await.context("Failed to clear cache")?;
            eprintln!("Cache cleared");
        }
        CacheAction::Forget { key } => {
            cache
                .try_remove(&key)
                .await
                .with_context(|| format!("Failed to remove {}", key))?;
            eprintln!("Removed {}", key);
        }
        CacheAction::Show { key } => match cache.try_peek(&key).await? {
            Some(entry) => {
                eprintln!(
                    "{}: cached {}, expires {}",
                    key,
                    entry.age_display(),
                    entry.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
                );
                print_json(&entry.data)?;
            }
            None => eprintln!("{}: not cached", key),
        },
    }
    Ok(())
}
