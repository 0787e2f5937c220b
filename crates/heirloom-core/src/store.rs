//! Storage capability
//!
//! The core never owns process-lifetime state. Every read and write goes
//! through [`VaultStore::transaction`], which gives the closure exclusive,
//! all-or-nothing access: if the closure returns `Err`, nothing it wrote is
//! kept. Implementations must serialize writers (single-writer boundary);
//! that is what makes check-ins, scheduler transitions and quorum updates on
//! the same vault race-free.

use crate::types::{
    AttemptId, AttemptStatus, Attestation, Fragment, FragmentId, Party, PartyId, RecoveryAttempt,
    RecoveryOutcome, Vault, VaultId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record conflict: {0}")]
    Conflict(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Operations available inside a transaction.
pub trait StoreTx {
    fn vault(&self, id: &VaultId) -> Result<Option<Vault>, StoreError>;
    fn put_vault(&mut self, vault: &Vault) -> Result<(), StoreError>;
    /// Ids of every vault not in a terminal status.
    fn live_vault_ids(&self) -> Result<Vec<VaultId>, StoreError>;

    fn parties(&self, vault_id: &VaultId) -> Result<Vec<Party>, StoreError>;
    fn put_party(&mut self, party: &Party) -> Result<(), StoreError>;

    fn fragments(&self, vault_id: &VaultId) -> Result<Vec<Fragment>, StoreError>;
    /// Fragments are write-once: inserting an existing id is a conflict.
    fn insert_fragment(&mut self, fragment: &Fragment) -> Result<(), StoreError>;

    fn attempt(&self, id: &AttemptId) -> Result<Option<RecoveryAttempt>, StoreError>;
    fn open_attempt(&self, vault_id: &VaultId) -> Result<Option<RecoveryAttempt>, StoreError>;
    /// Insert or update. Storing a second `Open` attempt for a vault is a
    /// conflict.
    fn put_attempt(&mut self, attempt: &RecoveryAttempt) -> Result<(), StoreError>;

    fn attestations(&self, attempt_id: &AttemptId) -> Result<Vec<Attestation>, StoreError>;
    /// Replace any previous attestation by the same guardian for the attempt.
    fn upsert_attestation(&mut self, attestation: &Attestation) -> Result<(), StoreError>;

    fn nonce_seen(
        &self,
        attempt_id: &AttemptId,
        guardian_id: &PartyId,
        nonce: u64,
    ) -> Result<bool, StoreError>;
    fn record_nonce(
        &mut self,
        attempt_id: &AttemptId,
        guardian_id: &PartyId,
        nonce: u64,
    ) -> Result<(), StoreError>;

    fn record_outcome(&mut self, outcome: &RecoveryOutcome) -> Result<(), StoreError>;
    fn outcomes(&self) -> Result<Vec<RecoveryOutcome>, StoreError>;

    /// Distinct owners with at least one non-terminal vault.
    fn count_active_owners(&self) -> Result<u64, StoreError>;
}

/// Transactional persistence capability.
pub trait VaultStore: Send + Sync {
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryState {
    vaults: BTreeMap<VaultId, Vault>,
    parties: BTreeMap<PartyId, Party>,
    fragments: BTreeMap<FragmentId, Fragment>,
    attempts: BTreeMap<AttemptId, RecoveryAttempt>,
    attestations: BTreeMap<(AttemptId, PartyId), Attestation>,
    nonces: BTreeSet<(AttemptId, PartyId, u64)>,
    outcomes: Vec<RecoveryOutcome>,
}

/// Mutex-guarded store with copy-on-commit transactions.
///
/// Every transaction clones the entire state under the lock and swaps the
/// copy back in on success, so each call costs O(stored data) and all
/// transactions are serialized. Meant for tests and small single-process
/// embeddings; use the SQLite store for anything larger.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryStore {
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        let mut working = guard.clone();
        let result = f(&mut working)?;
        *guard = working;
        Ok(result)
    }
}

impl StoreTx for MemoryState {
    fn vault(&self, id: &VaultId) -> Result<Option<Vault>, StoreError> {
        Ok(self.vaults.get(id).cloned())
    }

    fn put_vault(&mut self, vault: &Vault) -> Result<(), StoreError> {
        self.vaults.insert(vault.id.clone(), vault.clone());
        Ok(())
    }

    fn live_vault_ids(&self) -> Result<Vec<VaultId>, StoreError> {
        Ok(self
            .vaults
            .values()
            .filter(|v| !v.is_terminal())
            .map(|v| v.id.clone())
            .collect())
    }

    fn parties(&self, vault_id: &VaultId) -> Result<Vec<Party>, StoreError> {
        Ok(self
            .parties
            .values()
            .filter(|p| &p.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn put_party(&mut self, party: &Party) -> Result<(), StoreError> {
        self.parties.insert(party.id.clone(), party.clone());
        Ok(())
    }

    fn fragments(&self, vault_id: &VaultId) -> Result<Vec<Fragment>, StoreError> {
        let mut out: Vec<Fragment> = self
            .fragments
            .values()
            .filter(|f| &f.vault_id == vault_id)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.share_index);
        Ok(out)
    }

    fn insert_fragment(&mut self, fragment: &Fragment) -> Result<(), StoreError> {
        if self.fragments.contains_key(&fragment.id) {
            return Err(StoreError::Conflict(format!(
                "fragment {} already issued",
                fragment.id
            )));
        }
        if self
            .fragments
            .values()
            .any(|f| f.vault_id == fragment.vault_id && f.share_index == fragment.share_index)
        {
            return Err(StoreError::Conflict(format!(
                "share index {} already issued for vault {}",
                fragment.share_index, fragment.vault_id
            )));
        }
        self.fragments.insert(fragment.id.clone(), fragment.clone());
        Ok(())
    }

    fn attempt(&self, id: &AttemptId) -> Result<Option<RecoveryAttempt>, StoreError> {
        Ok(self.attempts.get(id).cloned())
    }

    fn open_attempt(&self, vault_id: &VaultId) -> Result<Option<RecoveryAttempt>, StoreError> {
        Ok(self
            .attempts
            .values()
            .find(|a| &a.vault_id == vault_id && a.status == AttemptStatus::Open)
            .cloned())
    }

    fn put_attempt(&mut self, attempt: &RecoveryAttempt) -> Result<(), StoreError> {
        if attempt.is_open() {
            if let Some(existing) = self.open_attempt(&attempt.vault_id)? {
                if existing.id != attempt.id {
                    return Err(StoreError::Conflict(format!(
                        "vault {} already has open attempt {}",
                        attempt.vault_id, existing.id
                    )));
                }
            }
        }
        self.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    fn attestations(&self, attempt_id: &AttemptId) -> Result<Vec<Attestation>, StoreError> {
        Ok(self
            .attestations
            .values()
            .filter(|a| &a.recovery_attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    fn upsert_attestation(&mut self, attestation: &Attestation) -> Result<(), StoreError> {
        self.attestations.insert(
            (
                attestation.recovery_attempt_id.clone(),
                attestation.guardian_id.clone(),
            ),
            attestation.clone(),
        );
        Ok(())
    }

    fn nonce_seen(
        &self,
        attempt_id: &AttemptId,
        guardian_id: &PartyId,
        nonce: u64,
    ) -> Result<bool, StoreError> {
        Ok(self
            .nonces
            .contains(&(attempt_id.clone(), guardian_id.clone(), nonce)))
    }

    fn record_nonce(
        &mut self,
        attempt_id: &AttemptId,
        guardian_id: &PartyId,
        nonce: u64,
    ) -> Result<(), StoreError> {
        self.nonces
            .insert((attempt_id.clone(), guardian_id.clone(), nonce));
        Ok(())
    }

    fn record_outcome(&mut self, outcome: &RecoveryOutcome) -> Result<(), StoreError> {
        self.outcomes.push(outcome.clone());
        Ok(())
    }

    fn outcomes(&self) -> Result<Vec<RecoveryOutcome>, StoreError> {
        Ok(self.outcomes.clone())
    }

    fn count_active_owners(&self) -> Result<u64, StoreError> {
        let owners: BTreeSet<&str> = self
            .vaults
            .values()
            .filter(|v| !v.is_terminal())
            .map(|v| v.owner_id.as_str())
            .collect();
        Ok(owners.len() as u64)
    }
}
