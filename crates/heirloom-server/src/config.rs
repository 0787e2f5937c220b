//! Server configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use heirloom_core::{AesGcmFragmentCipher, ReplayWindow};
use heirloom_recovery::RecoveryConfig;
use heirloom_vault::HeartbeatConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,

    /// Recovery settings; the fragment key has no default
    pub recovery: RecoverySection,

    #[serde(default)]
    pub heartbeat: HeartbeatSection,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Data directory (SQLite database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Scheduler interval in seconds (default: 15 minutes)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tick_interval_secs: default_tick_interval(),
            log_level: default_log_level(),
        }
    }
}

/// Recovery attempt and attestation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySection {
    /// Deployment name mixed into every attestation signing domain
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// Hard expiry for recovery attempts (default: 7 days)
    #[serde(default = "default_attempt_ttl")]
    pub attempt_ttl_secs: u64,

    /// Oldest accepted attestation timestamp, relative to now
    #[serde(default = "default_replay_window")]
    pub replay_window_secs: u64,

    /// Accepted clock skew for attestation timestamps
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    /// 32-byte AES-256-GCM key (hex) sealing fragments at rest
    pub fragment_key: String,
}

/// Owner reminder thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSection {
    #[serde(default = "default_checkin_threshold")]
    pub checkin_threshold: f64,

    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            checkin_threshold: default_checkin_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_tick_interval() -> u64 {
    900 // 15 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_deployment() -> String {
    "production".to_string()
}

fn default_attempt_ttl() -> u64 {
    7 * 86_400
}

fn default_replay_window() -> u64 {
    ReplayWindow::default().window_secs
}

fn default_clock_skew() -> u64 {
    ReplayWindow::default().clock_skew_secs
}

fn default_checkin_threshold() -> f64 {
    HeartbeatConfig::default().checkin_threshold
}

fn default_critical_threshold() -> f64 {
    HeartbeatConfig::default().critical_threshold
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `HEIRLOOM_DATA_DIR`
    /// - `HEIRLOOM_TICK_INTERVAL`
    /// - `HEIRLOOM_LOG_LEVEL`
    /// - `HEIRLOOM_DEPLOYMENT`
    /// - `HEIRLOOM_ATTEMPT_TTL`
    /// - `HEIRLOOM_FRAGMENT_KEY`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HEIRLOOM_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("HEIRLOOM_TICK_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.tick_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("HEIRLOOM_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("HEIRLOOM_DEPLOYMENT") {
            self.recovery.deployment = v;
        }
        if let Ok(v) = std::env::var("HEIRLOOM_ATTEMPT_TTL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.recovery.attempt_ttl_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("HEIRLOOM_FRAGMENT_KEY") {
            self.recovery.fragment_key = v;
        }
    }

    /// Path of the SQLite database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join("heirloom.db")
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            deployment: self.recovery.deployment.clone(),
            attempt_ttl_secs: self.recovery.attempt_ttl_secs,
            replay_window: ReplayWindow {
                window_secs: self.recovery.replay_window_secs,
                clock_skew_secs: self.recovery.clock_skew_secs,
            },
        }
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            checkin_threshold: self.heartbeat.checkin_threshold,
            critical_threshold: self.heartbeat.critical_threshold,
        }
    }

    pub fn fragment_cipher(&self) -> Result<AesGcmFragmentCipher> {
        AesGcmFragmentCipher::from_hex(&self.recovery.fragment_key)
            .context("recovery.fragment_key is not a valid 32-byte hex key")
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.server.tick_interval_secs >= 60,
            "server.tick_interval_secs must be >= 60"
        );
        anyhow::ensure!(
            !self.recovery.deployment.is_empty(),
            "recovery.deployment must not be empty"
        );
        anyhow::ensure!(
            self.recovery.attempt_ttl_secs > 0,
            "recovery.attempt_ttl_secs must be > 0"
        );
        anyhow::ensure!(
            self.recovery.replay_window_secs > 0,
            "recovery.replay_window_secs must be > 0"
        );
        anyhow::ensure!(
            !self.recovery.fragment_key.is_empty(),
            "recovery.fragment_key must not be empty"
        );
        self.fragment_cipher()?;
        self.heartbeat_config()
            .validate()
            .context("invalid [heartbeat] thresholds")?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
