// src/main.rs
use anyhow::{Context, Result};
use log::{error, info, warn};
use nacos_config_watcher::config::Config;
use nacos_config_watcher::modules::LoggingChangeHandler;
use nacos_config_watcher::{NacosHttpClient, WatchScheduler};
use std::env;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger based on RUST_LOG env var, or default to info
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    if let Some(ref path) = config_path {
        info!("Loading configuration from: {:?}", path);
    } else {
        info!("Use default configuration");
    }

    let config = match Config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            exit(1);
        }
    };

    let keys = config
        .watch_keys()
        .context("Invalid [[watch]] entry in configuration")?;
    if keys.is_empty() {
        warn!("No [[watch]] entries configured; the watcher will idle until stopped.");
    }
    let options = config.watch_options().context("Invalid watch options")?;

    let client = Arc::new(
        NacosHttpClient::from_config(&config).context("Failed to create Nacos HTTP client")?,
    );
    let scheduler = WatchScheduler::new(client.clone(), client, options);
    for key in keys {
        info!("Watching config {}", key);
        scheduler.watch(key, LoggingChangeHandler::new());
    }
    scheduler.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested; waiting for the in-flight poll to finish.");
    scheduler.stop();
    scheduler.join().await;
    Ok(())
}
