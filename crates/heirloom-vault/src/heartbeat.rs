//! Check-in heartbeat for vault owners.
//!
//! Pure logic, no I/O. Takes a vault and the current time, returns how much
//! of the check-in interval has elapsed and what the owner should do:
//!
//! ```text
//! |--- Healthy ---|--- CheckInRecommended ---|--- CheckInRequired ---|--- InGrace ---|--- Overdue
//! 0%             50%                        90%                    100%         deadline + grace
//! ```
//!
//! Thresholds are configurable.

use heirloom_core::{Timestamp, Vault, VaultId, VaultStatus};
use serde::{Deserialize, Serialize};

/// When to nudge the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Fraction of the interval elapsed before recommending a check-in
    /// (0.0–1.0). Default: 0.5.
    pub checkin_threshold: f64,

    /// Fraction of the interval elapsed before a check-in is critical
    /// (0.0–1.0). Default: 0.9.
    pub critical_threshold: f64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            checkin_threshold: 0.5,
            critical_threshold: 0.9,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<(), HeartbeatError> {
        if self.checkin_threshold <= 0.0 || self.checkin_threshold >= 1.0 {
            return Err(HeartbeatError::InvalidThreshold(
                "checkin_threshold must be between 0.0 and 1.0 exclusive".into(),
            ));
        }
        if self.critical_threshold <= self.checkin_threshold || self.critical_threshold >= 1.0 {
            return Err(HeartbeatError::InvalidThreshold(
                "critical_threshold must be between checkin_threshold and 1.0 exclusive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatAction {
    /// Far from the deadline
    Healthy,
    /// Past the check-in threshold
    CheckInRecommended,
    /// Past the critical threshold
    CheckInRequired,
    /// Deadline missed; a check-in still averts recovery
    InGrace,
    /// Grace lapsed; recovery may proceed
    Overdue,
}

impl HeartbeatAction {
    fn priority(self) -> u8 {
        match self {
            HeartbeatAction::Overdue => 0,
            HeartbeatAction::InGrace => 1,
            HeartbeatAction::CheckInRequired => 2,
            HeartbeatAction::CheckInRecommended => 3,
            HeartbeatAction::Healthy => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub vault_id: VaultId,
    pub status: VaultStatus,
    /// Fraction of the check-in interval elapsed (0.0–1.0+)
    pub elapsed_fraction: f64,
    /// Seconds until the check-in deadline (0 once passed)
    pub secs_remaining: u64,
    /// Seconds until grace runs out (0 once passed)
    pub grace_secs_remaining: u64,
    pub action: HeartbeatAction,
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Heartbeat for one vault. `None` for terminal vaults.
pub fn heartbeat(vault: &Vault, now: Timestamp, config: &HeartbeatConfig) -> Option<HeartbeatStatus> {
    if vault.is_terminal() {
        return None;
    }

    let elapsed = now.saturating_sub(vault.last_check_in_at);
    let elapsed_fraction = if vault.check_in_interval_secs == 0 {
        1.0
    } else {
        elapsed as f64 / vault.check_in_interval_secs as f64
    };
    let grace_expires_at = vault.grace_expires_at();

    let action = if matches!(vault.status, VaultStatus::Triggered | VaultStatus::Recovering)
        || now >= grace_expires_at
    {
        HeartbeatAction::Overdue
    } else if now >= vault.next_check_in_due_at {
        HeartbeatAction::InGrace
    } else if elapsed_fraction >= config.critical_threshold {
        HeartbeatAction::CheckInRequired
    } else if elapsed_fraction >= config.checkin_threshold {
        HeartbeatAction::CheckInRecommended
    } else {
        HeartbeatAction::Healthy
    };

    Some(HeartbeatStatus {
        vault_id: vault.id.clone(),
        status: vault.status,
        elapsed_fraction,
        secs_remaining: vault.next_check_in_due_at.saturating_sub(now),
        grace_secs_remaining: grace_expires_at.saturating_sub(now),
        action,
    })
}

/// Heartbeats for many vaults, most urgent first.
pub fn evaluate_batch(
    vaults: &[Vault],
    now: Timestamp,
    config: &HeartbeatConfig,
) -> Vec<HeartbeatStatus> {
    let mut statuses: Vec<HeartbeatStatus> = vaults
        .iter()
        .filter_map(|vault| heartbeat(vault, now, config))
        .collect();

    statuses.sort_by(|a, b| {
        a.action.priority().cmp(&b.action.priority()).then(
            a.elapsed_fraction
                .partial_cmp(&b.elapsed_fraction)
                .unwrap_or(std::cmp::Ordering::Equal)
                .reverse(),
        )
    });

    statuses
}
