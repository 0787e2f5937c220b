//! Heirloom Server: headless daemon that keeps vault timers moving.
//!
//! Advances every non-terminal vault through Active → Grace → Triggered,
//! expires stale recovery attempts, and logs owner heartbeats.
//!
//! # Usage
//!
//! ```bash
//! heirloom-server --config /path/to/heirloom-server.toml
//! heirloom-server --check    # Run one scheduler pass and exit
//! heirloom-server --validate # Validate config and exit
//! ```

mod config;
mod daemon;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI args (minimal, no clap dependency needed)
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("/config/heirloom-server.toml");
    let mut one_shot = false;
    let mut validate_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--check" | "--once" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("heirloom-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let mut server_config = config::ServerConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    server_config.apply_env_overrides();
    server_config
        .validate()
        .context("Configuration validation failed")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&server_config.server.log_level),
    )
    .init();

    if validate_only {
        println!("Configuration is valid.");
        println!("  Database:       {}", server_config.db_path().display());
        println!("  Deployment:     {}", server_config.recovery.deployment);
        println!(
            "  Tick interval:  {} secs",
            server_config.server.tick_interval_secs
        );
        println!(
            "  Attempt TTL:    {} secs",
            server_config.recovery.attempt_ttl_secs
        );
        println!(
            "  Replay window:  {} secs (skew {} secs)",
            server_config.recovery.replay_window_secs, server_config.recovery.clock_skew_secs
        );
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if one_shot {
        log::info!("Running single scheduler pass…");
        let orch = Arc::new(daemon::open_orchestrator(&server_config)?);
        let report = rt.block_on(daemon::run_check_cycle(
            orch,
            server_config.heartbeat_config(),
        ))?;
        log::info!(
            "Done: {} vaults, {} transitions, {} attempts expired.",
            report.evaluated,
            report.transitions.len(),
            report.attempts_expired.len()
        );
    } else {
        let shutdown = rt.block_on(async {
            tokio::select! {
                result = daemon::run(server_config) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received shutdown signal. Exiting…");
                    Ok(())
                }
            }
        });

        if let Err(e) = shutdown {
            log::error!("Server error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"Heirloom Server: headless vault scheduler

USAGE:
    heirloom-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/heirloom-server.toml)
    --check, --once       Run a single scheduler pass and exit
    --validate            Validate config file and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    HEIRLOOM_DATA_DIR        Data directory path
    HEIRLOOM_TICK_INTERVAL   Scheduler interval in seconds
    HEIRLOOM_LOG_LEVEL       Log level (error/warn/info/debug/trace)
    HEIRLOOM_DEPLOYMENT      Deployment name for attestation domains
    HEIRLOOM_ATTEMPT_TTL     Recovery attempt lifetime in seconds
    HEIRLOOM_FRAGMENT_KEY    Fragment encryption key (64 hex chars)

EXAMPLES:
    # Run as daemon with config file
    heirloom-server --config /path/to/config.toml

    # Single pass (useful for cron jobs)
    heirloom-server --config config.toml --check

    # Validate configuration
    heirloom-server --config config.toml --validate
"#
    );
}
