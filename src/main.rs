// src/main.rs

//! The main entry point for the opcgate gateway.

use anyhow::{Context, Result};
use opcgate::config::Config;
use opcgate::core::driver::SimulatedDriver;
use opcgate::server;
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("opcgate version {VERSION}");
        return Ok(());
    }

    // It can be provided via a --config flag; otherwise, it defaults to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(initial_log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true),
        )
        .init();

    // The worker pool is sized once here and outlives every connection.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.pool_size)
        .thread_name("opcgate-worker")
        .enable_all()
        .build()
        .context("Failed to build the worker pool")?;

    info!("Starting opcgate {VERSION}.");
    let driver = Arc::new(SimulatedDriver::new());
    if let Err(e) = runtime.block_on(server::run(config, driver)) {
        error!("Gateway runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
