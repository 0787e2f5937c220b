//! The daemon loop: periodically advances every vault and reports owner heartbeats.

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use heirloom_core::{AesGcmFragmentCipher, Clock, SystemClock, Timestamp};
use heirloom_recovery::{LogNotifier, RecoveryOrchestrator, TickReport};
use heirloom_store::SqliteStore;
use heirloom_vault::{HeartbeatAction, HeartbeatConfig, HeartbeatStatus};
use std::sync::Arc;
use std::time::Duration;

pub type ServerOrchestrator =
    RecoveryOrchestrator<SqliteStore, AesGcmFragmentCipher, SystemClock, LogNotifier>;

/// Open the store under the data directory and wire up the orchestrator.
pub fn open_orchestrator(config: &ServerConfig) -> Result<ServerOrchestrator> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.server.data_dir.display()
        )
    })?;

    let db_path = config.db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    Ok(RecoveryOrchestrator::new(
        store,
        config.fragment_cipher()?,
        SystemClock,
        LogNotifier,
        config.recovery_config(),
    ))
}

/// Run the daemon loop. Blocks forever (until shutdown signal).
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("Heirloom server starting…");
    log::info!("  Deployment: {}", config.recovery.deployment);
    log::info!(
        "  Interval:   {} seconds ({:.1} minutes)",
        config.server.tick_interval_secs,
        config.server.tick_interval_secs as f64 / 60.0
    );
    log::info!("  Database:   {}", config.db_path().display());

    let orch = Arc::new(open_orchestrator(&config)?);
    let heartbeat = config.heartbeat_config();
    let interval = Duration::from_secs(config.server.tick_interval_secs);

    // First pass runs immediately.
    let mut first = true;
    loop {
        if !first {
            log::debug!(
                "Sleeping {} seconds until next pass…",
                config.server.tick_interval_secs
            );
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_check_cycle(Arc::clone(&orch), heartbeat.clone()).await {
            Ok(report) => log::info!(
                "Pass completed: {} vaults, {} transitions.",
                report.evaluated,
                report.transitions.len()
            ),
            Err(e) => log::error!("Pass failed: {:#}", e),
        }
    }
}

/// One scheduler pass plus heartbeat reporting, on the blocking pool.
pub async fn run_check_cycle(
    orch: Arc<ServerOrchestrator>,
    heartbeat: HeartbeatConfig,
) -> Result<TickReport> {
    let (report, statuses, now) = tokio::task::spawn_blocking(move || -> Result<_> {
        let now = SystemClock.now();
        let report = orch.tick(now).context("Scheduler pass failed")?;
        let statuses = orch
            .heartbeats(&heartbeat)
            .context("Heartbeat evaluation failed")?;
        Ok((report, statuses, now))
    })
    .await
    .context("Scheduler task panicked")??;

    for (vault_id, reason) in &report.failures {
        log::error!("[{}] not advanced: {}", vault_id, reason);
    }
    for status in &statuses {
        if let Some(line) = describe(status, now) {
            match status.action {
                HeartbeatAction::CheckInRecommended => log::info!("{}", line),
                _ => log::warn!("{}", line),
            }
        }
    }

    Ok(report)
}

/// Log line for a vault that needs attention; `None` when healthy.
fn describe(status: &HeartbeatStatus, now: Timestamp) -> Option<String> {
    let line = match status.action {
        HeartbeatAction::Healthy => return None,
        HeartbeatAction::CheckInRecommended | HeartbeatAction::CheckInRequired => format!(
            "[{}] {:?}: {:.0}% of interval elapsed, check-in due {}",
            status.vault_id,
            status.action,
            status.elapsed_fraction * 100.0,
            format_time(now.saturating_add(status.secs_remaining))
        ),
        HeartbeatAction::InGrace => format!(
            "[{}] In grace: recovery opens {}",
            status.vault_id,
            format_time(now.saturating_add(status.grace_secs_remaining))
        ),
        HeartbeatAction::Overdue => format!(
            "[{}] Overdue ({}): recovery may proceed",
            status.vault_id, status.status
        ),
    };
    Some(line)
}

fn format_time(ts: Timestamp) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
