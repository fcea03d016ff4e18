// src/main.rs

//! Validates a tree-connect configuration: loads it, resolves every share once,
//! and reports what an SMB server would expose.

use anyhow::{Result, anyhow};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};
use treeconn::config::Config;
use treeconn::core::metrics;
use treeconn::core::share::{ShareConfigManager, ShareConfigProvider};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("treeconn version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via --config; otherwise it defaults to "treeconn.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("treeconn.toml");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    let initial_log_level =
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true),
        )
        .init();

    if let Err(e) = check_shares(&config) {
        error!("Configuration check failed: {}", e);
        return Err(e);
    }

    if config.metrics.enabled {
        print!("{}", metrics::gather_metrics());
    }

    Ok(())
}

/// Resolves every configured share through the provider the registry would use.
fn check_shares(config: &Config) -> Result<()> {
    let manager = Arc::new(ShareConfigManager::new(&config.shares));
    let names = manager.share_names();
    if names.is_empty() {
        warn!("No shares are configured; every tree connect will fail");
    }

    for name in &names {
        let share = manager
            .resolve(name)
            .ok_or_else(|| anyhow!("share '{name}' did not resolve"))?;
        let kind = if share.is_pipe() { "pipe" } else { "disk" };
        let path = share
            .path
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string());
        info!(
            "share '{}': {} {} (flags {:?})",
            share.name, kind, path, share.flags
        );
        manager.release(share);
    }

    info!(
        "{} shares OK; at most {} tree connects per session, ipc timeout {:?}",
        names.len(),
        config.tree_connect.max_per_session,
        config.ipc.timeout
    );
    Ok(())
}
