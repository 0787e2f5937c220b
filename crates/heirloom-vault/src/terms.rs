//! Vault creation terms

use crate::VaultError;
use heirloom_core::{SignerId, Timestamp, Vault, VaultId, VaultStatus};
use heirloom_shamir::SchemeConfig;
use serde::{Deserialize, Serialize};

/// One day, the default check-in interval.
pub const DEFAULT_CHECK_IN_INTERVAL_SECS: u64 = 86_400;
/// One week, the default grace period.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 7 * 86_400;

/// Timing and threshold parameters chosen when a vault is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTerms {
    pub check_in_interval_secs: u64,
    pub grace_period_secs: u64,
    pub scheme: SchemeConfig,
}

impl Default for VaultTerms {
    fn default() -> Self {
        Self {
            check_in_interval_secs: DEFAULT_CHECK_IN_INTERVAL_SECS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            scheme: SchemeConfig::two_of_three(),
        }
    }
}

impl VaultTerms {
    pub fn new(check_in_interval_secs: u64, grace_period_secs: u64, scheme: SchemeConfig) -> Self {
        Self {
            check_in_interval_secs,
            grace_period_secs,
            scheme,
        }
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        if self.check_in_interval_secs == 0 {
            return Err(VaultError::InvalidTerms(
                "check-in interval must be positive".into(),
            ));
        }
        if self.grace_period_secs == 0 {
            return Err(VaultError::InvalidTerms(
                "grace period must be positive".into(),
            ));
        }
        self.scheme
            .validate()
            .map_err(|e| VaultError::InvalidTerms(e.to_string()))
    }
}

/// Build a fresh Active vault whose first deadline is `now + interval`.
pub fn open_vault(
    id: VaultId,
    owner_id: impl Into<String>,
    owner_identity: SignerId,
    terms: &VaultTerms,
    now: Timestamp,
) -> Result<Vault, VaultError> {
    terms.validate()?;
    Ok(Vault {
        id,
        owner_id: owner_id.into(),
        owner_identity,
        status: VaultStatus::Active,
        check_in_interval_secs: terms.check_in_interval_secs,
        grace_period_secs: terms.grace_period_secs,
        last_check_in_at: now,
        next_check_in_due_at: now.saturating_add(terms.check_in_interval_secs),
        last_check_in_sequence: 0,
        recovery_threshold: terms.scheme.threshold,
        total_fragments: terms.scheme.total,
        active_recovery: None,
        created_at: now,
        cancelled_at: None,
    })
}
