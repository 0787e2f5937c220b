//! Recovery outcome metrics
//!
//! Built from persisted [`RecoveryOutcome`] records plus an active-owner
//! count queried from storage. Nothing is accumulated in process memory.

use heirloom_core::RecoveryOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemeStats {
    pub attempts: u64,
    pub successes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    /// 0.0 when there are no outcomes yet
    pub success_rate: f64,
    pub average_fragments_provided: f64,
    /// Distinct owners with a non-terminal vault
    pub active_vault_owners: u64,
    /// Keyed by scheme shape, e.g. "2-of-3"
    pub by_scheme: BTreeMap<String, SchemeStats>,
}

impl RecoveryMetrics {
    pub fn from_outcomes(outcomes: &[RecoveryOutcome], active_vault_owners: u64) -> Self {
        let total_attempts = outcomes.len() as u64;
        let successful = outcomes.iter().filter(|o| o.success).count() as u64;

        let mut by_scheme: BTreeMap<String, SchemeStats> = BTreeMap::new();
        for outcome in outcomes {
            let stats = by_scheme
                .entry(format!("{}-of-{}", outcome.threshold, outcome.total))
                .or_default();
            stats.attempts += 1;
            if outcome.success {
                stats.successes += 1;
            }
        }

        let (success_rate, average_fragments_provided) = if total_attempts == 0 {
            (0.0, 0.0)
        } else {
            let fragments: u64 = outcomes.iter().map(|o| o.fragments_provided as u64).sum();
            (
                successful as f64 / total_attempts as f64,
                fragments as f64 / total_attempts as f64,
            )
        };

        Self {
            total_attempts,
            successful,
            failed: total_attempts - successful,
            success_rate,
            average_fragments_provided,
            active_vault_owners,
            by_scheme,
        }
    }
}
