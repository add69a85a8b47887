use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, ConfigStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod services;

use cli::{Cli, Commands};
use services::Services;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.clone());
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to prepare data dir {}", data_dir.display()))?;
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let config_store = ConfigStore::from_dir(data_dir.join("config"));
    let mut config = match config_store.load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err:#}");
            AppConfig::default()
        }
    };
    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.clone();
    }
    if cli.user_id.is_some() {
        config.backend.user_id = cli.user_id.clone();
    }
    info!(data_dir = %data_dir.display(), backend = %config.backend.base_url, "starting pocket-notes");

    if let Commands::Annotate(args) = &cli.command {
        return cli::annotate(&config, args).await;
    }

    let services = Services::build(config, &data_dir).await?;
    cli::run(&services, cli.command).await
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        let mut dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push("pocket-notes");
        dir
    })
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "pocket-notes.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,app_cli=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
