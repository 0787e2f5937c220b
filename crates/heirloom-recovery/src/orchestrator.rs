//! Recovery orchestration
//!
//! [`RecoveryOrchestrator`] is the only place vault records change. Each
//! operation runs inside one store transaction, so check-ins, scheduler
//! passes, recovery initiation and quorum updates on a vault are serialized
//! by the store's single writer. Events are dispatched after commit.

use crate::attestation::{AttestationCollector, AttestationRejection, AttestationSubmission};
use crate::metrics::RecoveryMetrics;
use crate::notify::{Notifier, VaultEvent};
use heirloom_core::{
    AttemptId, AttemptStatus, Attestation, Clock, CryptoError, Fragment, FragmentCipher,
    FragmentId, OwnerMessage, Party, PartyId, PartyRole, RecoveryAttempt, RecoveryOutcome,
    ReplayWindow, SignerId, StoreError, StoreTx, Timestamp, Vault, VaultId, VaultStatus,
    VaultStore,
};
use heirloom_shamir::{reconstruct_secret, split_secret, verify_split, ShamirError, Share};
use heirloom_vault::{
    heartbeat::{evaluate_batch, HeartbeatConfig, HeartbeatStatus},
    machine::{self, CheckInReceipt, Transition},
    open_vault, VaultError, VaultTerms,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Vault not found: {0}")]
    VaultNotFound(VaultId),
    #[error("Recovery attempt not found: {0}")]
    AttemptNotFound(AttemptId),
    #[error("Invalid vault setup: {0}")]
    InvalidSetup(String),
    #[error("Vault is {0}; recovery requires a triggered vault")]
    VaultNotTriggered(VaultStatus),
    #[error("Recovery attempt {0} is already open")]
    RecoveryAlreadyOpen(AttemptId),
    #[error("{0} is not a beneficiary of this vault")]
    UnknownBeneficiary(PartyId),
    #[error("Attestation rejected: {0}")]
    Attestation(#[from] AttestationRejection),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Shamir(#[from] ShamirError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Deployment tag bound into every attestation domain
    pub deployment: String,
    /// How long an attempt stays open (seconds)
    pub attempt_ttl_secs: u64,
    pub replay_window: ReplayWindow,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            deployment: "production".to_string(),
            attempt_ttl_secs: 7 * 86_400,
            replay_window: ReplayWindow::default(),
        }
    }
}

/// A party to register at vault creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    pub public_identity: SignerId,
    pub contact_handle: String,
}

impl NewParty {
    pub fn new(public_identity: SignerId, contact_handle: impl Into<String>) -> Self {
        Self {
            public_identity,
            contact_handle: contact_handle.into(),
        }
    }
}

/// Everything needed to open a vault.
#[derive(Debug, Clone)]
pub struct VaultSetup {
    pub owner_id: String,
    pub owner_identity: SignerId,
    pub terms: VaultTerms,
    /// Exactly `terms.scheme.total` entries, one fragment each
    pub guardians: Vec<NewParty>,
    pub beneficiaries: Vec<NewParty>,
    pub attestors: Vec<NewParty>,
}

#[derive(Debug, Clone)]
pub struct CreatedVault {
    pub vault: Vault,
    pub guardians: Vec<Party>,
    pub beneficiaries: Vec<Party>,
    pub attestors: Vec<Party>,
}

/// Result of an accepted attestation.
pub enum SubmissionOutcome {
    /// Counted; quorum not reached yet
    Pending { collected: usize, required: u8 },
    /// Quorum reached and the secret reconstructed
    Recovered {
        beneficiary_id: PartyId,
        secret: Zeroizing<Vec<u8>>,
    },
    /// Quorum reached but reconstruction failed; the vault is Triggered again
    Aborted { reason: String },
}

impl fmt::Debug for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionOutcome::Pending {
                collected,
                required,
            } => f
                .debug_struct("Pending")
                .field("collected", collected)
                .field("required", required)
                .finish(),
            SubmissionOutcome::Recovered {
                beneficiary_id,
                secret,
            } => f
                .debug_struct("Recovered")
                .field("beneficiary_id", beneficiary_id)
                .field("secret_len", &secret.len())
                .finish(),
            SubmissionOutcome::Aborted { reason } => {
                f.debug_struct("Aborted").field("reason", reason).finish()
            }
        }
    }
}

/// What one scheduler pass did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub evaluated: usize,
    pub transitions: Vec<(VaultId, Transition)>,
    pub attempts_expired: Vec<AttemptId>,
    /// Vaults whose pass failed and was rolled back
    pub failures: Vec<(VaultId, String)>,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.transitions.is_empty() && self.failures.is_empty()
    }
}

#[derive(Error, Debug)]
enum ReconstructionFailure {
    #[error("fragment {0} could not be opened: {1}")]
    Fragment(FragmentId, CryptoError),
    #[error("{0}")]
    Shares(ShamirError),
}

fn load_vault(tx: &dyn StoreTx, vault_id: &VaultId) -> Result<Vault, RecoveryError> {
    tx.vault(vault_id)?
        .ok_or_else(|| RecoveryError::VaultNotFound(vault_id.clone()))
}

fn outcome_for(
    attempt: &RecoveryAttempt,
    vault: &Vault,
    success: bool,
    reason: Option<String>,
    now: Timestamp,
) -> RecoveryOutcome {
    RecoveryOutcome {
        attempt_id: attempt.id.clone(),
        vault_id: vault.id.clone(),
        success,
        fragments_provided: u8::try_from(attempt.quorum_count()).unwrap_or(u8::MAX),
        threshold: vault.recovery_threshold,
        total: vault.total_fragments,
        reason,
        recorded_at: now,
    }
}

/// Resolve an open attempt and record the failed outcome.
fn close_attempt(
    tx: &mut dyn StoreTx,
    attempt: &mut RecoveryAttempt,
    vault: &Vault,
    status: AttemptStatus,
    reason: &str,
    now: Timestamp,
) -> Result<(), RecoveryError> {
    attempt.resolve(status, now);
    tx.put_attempt(attempt)?;
    tx.record_outcome(&outcome_for(attempt, vault, false, Some(reason.to_string()), now))?;
    Ok(())
}

pub struct RecoveryOrchestrator<S, K, C, N> {
    store: S,
    cipher: K,
    clock: C,
    notifier: N,
    collector: AttestationCollector,
    config: RecoveryConfig,
}

impl<S, K, C, N> RecoveryOrchestrator<S, K, C, N>
where
    S: VaultStore,
    K: FragmentCipher,
    C: Clock,
    N: Notifier,
{
    pub fn new(store: S, cipher: K, clock: C, notifier: N, config: RecoveryConfig) -> Self {
        let collector = AttestationCollector::new(config.deployment.clone(), config.replay_window);
        Self {
            store,
            cipher,
            clock,
            notifier,
            collector,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn collector(&self) -> &AttestationCollector {
        &self.collector
    }

    fn dispatch(&self, events: &[VaultEvent]) {
        for event in events {
            self.notifier.notify(event);
        }
    }

    // ========================================================================
    // Vault setup
    // ========================================================================

    /// Split `secret`, seal one fragment per guardian, and persist the vault,
    /// its parties and fragments together.
    pub fn create_vault(
        &self,
        setup: &VaultSetup,
        secret: &[u8],
    ) -> Result<CreatedVault, RecoveryError> {
        let now = self.clock.now();
        let scheme = setup.terms.scheme;

        if setup.guardians.len() != scheme.total as usize {
            return Err(RecoveryError::InvalidSetup(format!(
                "{} requires exactly {} guardians, got {}",
                scheme,
                scheme.total,
                setup.guardians.len()
            )));
        }
        if setup.beneficiaries.is_empty() {
            return Err(RecoveryError::InvalidSetup(
                "at least one beneficiary is required".into(),
            ));
        }
        let distinct: BTreeSet<&SignerId> =
            setup.guardians.iter().map(|g| &g.public_identity).collect();
        if distinct.len() != setup.guardians.len() {
            return Err(RecoveryError::InvalidSetup(
                "guardian identities must be distinct".into(),
            ));
        }

        let vault = open_vault(
            VaultId::generate(),
            setup.owner_id.clone(),
            setup.owner_identity.clone(),
            &setup.terms,
            now,
        )?;

        let shares: Vec<Share> = split_secret(secret, scheme.total, scheme.threshold)?;
        verify_split(&shares, scheme.threshold)?;

        let register = |drafts: &[NewParty], role: PartyRole| -> Vec<Party> {
            drafts
                .iter()
                .map(|draft| Party {
                    id: PartyId::generate(),
                    vault_id: vault.id.clone(),
                    role,
                    public_identity: draft.public_identity.clone(),
                    contact_handle: draft.contact_handle.clone(),
                })
                .collect()
        };
        let guardians = register(&setup.guardians, PartyRole::Guardian);
        let beneficiaries = register(&setup.beneficiaries, PartyRole::Beneficiary);
        let attestors = register(&setup.attestors, PartyRole::Attestor);

        let mut fragments = Vec::with_capacity(shares.len());
        for (guardian, share) in guardians.iter().zip(shares.iter()) {
            fragments.push(Fragment {
                id: FragmentId::generate(),
                vault_id: vault.id.clone(),
                holder_party_id: guardian.id.clone(),
                share_index: share.index,
                scheme_threshold: scheme.threshold,
                scheme_total: scheme.total,
                encrypted_share_blob: self.cipher.seal(&vault.id, share)?,
            });
        }

        self.store.transaction(|tx| -> Result<(), RecoveryError> {
            tx.put_vault(&vault)?;
            for party in guardians.iter().chain(&beneficiaries).chain(&attestors) {
                tx.put_party(party)?;
            }
            for fragment in &fragments {
                tx.insert_fragment(fragment)?;
            }
            Ok(())
        })?;

        log::info!("Created vault {} ({})", vault.id, scheme);
        self.dispatch(&[VaultEvent::VaultCreated {
            vault_id: vault.id.clone(),
            threshold: scheme.threshold,
            total: scheme.total,
        }]);

        Ok(CreatedVault {
            vault,
            guardians,
            beneficiaries,
            attestors,
        })
    }

    // ========================================================================
    // Owner actions
    // ========================================================================

    pub fn check_in(
        &self,
        vault_id: &VaultId,
        message: &OwnerMessage,
        signature: &[u8],
    ) -> Result<CheckInReceipt, RecoveryError> {
        let now = self.clock.now();
        let result = self.store.transaction(|tx| -> Result<_, RecoveryError> {
            let mut vault = load_vault(tx, vault_id)?;
            let receipt = machine::check_in(&mut vault, message, signature, now)?;
            tx.put_vault(&vault)?;

            let mut events = vec![VaultEvent::CheckedIn {
                vault_id: vault.id.clone(),
                next_check_in_due_at: receipt.next_check_in_due_at,
            }];
            if receipt.previous_status != VaultStatus::Active {
                events.push(VaultEvent::StatusChanged {
                    vault_id: vault.id.clone(),
                    from: receipt.previous_status,
                    to: VaultStatus::Active,
                });
            }
            Ok((receipt, events))
        });

        match result {
            Ok((receipt, events)) => {
                self.dispatch(&events);
                Ok(receipt)
            }
            Err(e) => {
                log::warn!("Check-in for vault {} refused: {}", vault_id, e);
                Err(e)
            }
        }
    }

    /// Owner cancellation. Aborts any open attempt. Returns the status the
    /// vault was in.
    pub fn cancel(
        &self,
        vault_id: &VaultId,
        message: &OwnerMessage,
        signature: &[u8],
    ) -> Result<VaultStatus, RecoveryError> {
        let now = self.clock.now();
        let (previous, events) = self.store.transaction(|tx| -> Result<_, RecoveryError> {
            let mut vault = load_vault(tx, vault_id)?;
            let previous = machine::cancel(&mut vault, message, signature, now)?;

            if let Some(mut attempt) = tx.open_attempt(vault_id)? {
                close_attempt(
                    tx,
                    &mut attempt,
                    &vault,
                    AttemptStatus::Aborted,
                    "cancelled by owner",
                    now,
                )?;
            }
            tx.put_vault(&vault)?;

            let events = vec![
                VaultEvent::StatusChanged {
                    vault_id: vault.id.clone(),
                    from: previous,
                    to: VaultStatus::Cancelled,
                },
                VaultEvent::VaultCancelled {
                    vault_id: vault.id.clone(),
                },
            ];
            Ok((previous, events))
        })?;

        log::info!("Vault {} cancelled by owner (was {})", vault_id, previous);
        self.dispatch(&events);
        Ok(previous)
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Apply every due time-driven transition to `vault`, expiring the
    /// attempt it was waiting on if needed.
    fn advance(
        &self,
        tx: &mut dyn StoreTx,
        vault: &mut Vault,
        now: Timestamp,
        events: &mut Vec<VaultEvent>,
    ) -> Result<Vec<Transition>, RecoveryError> {
        let mut applied = Vec::new();
        while let Some(transition) = machine::evaluate(vault, now) {
            let from = vault.status;
            machine::apply(vault, &transition);

            if let Transition::ExpireRecovery { attempt_id } = &transition {
                if let Some(mut attempt) = tx.attempt(attempt_id)? {
                    if attempt.is_open() {
                        close_attempt(tx, &mut attempt, vault, AttemptStatus::Expired, "expired", now)?;
                        events.push(VaultEvent::RecoveryExpired {
                            vault_id: vault.id.clone(),
                            attempt_id: attempt_id.clone(),
                        });
                    }
                }
            }

            events.push(VaultEvent::StatusChanged {
                vault_id: vault.id.clone(),
                from,
                to: vault.status,
            });
            applied.push(transition);
        }
        Ok(applied)
    }

    /// One scheduler pass over every non-terminal vault. Each vault is
    /// advanced in its own transaction; a failure is reported and the pass
    /// continues.
    pub fn tick(&self, now: Timestamp) -> Result<TickReport, RecoveryError> {
        let ids = self
            .store
            .transaction(|tx| -> Result<_, RecoveryError> { Ok(tx.live_vault_ids()?) })?;

        let mut report = TickReport {
            evaluated: ids.len(),
            ..TickReport::default()
        };

        for id in ids {
            let result = self.store.transaction(|tx| -> Result<_, RecoveryError> {
                let mut events = Vec::new();
                let Some(mut vault) = tx.vault(&id)? else {
                    return Ok((Vec::new(), events));
                };
                let applied = self.advance(tx, &mut vault, now, &mut events)?;
                if !applied.is_empty() {
                    tx.put_vault(&vault)?;
                }
                Ok((applied, events))
            });

            match result {
                Ok((applied, events)) => {
                    for transition in applied {
                        if let Transition::ExpireRecovery { attempt_id } = &transition {
                            report.attempts_expired.push(attempt_id.clone());
                        }
                        report.transitions.push((id.clone(), transition));
                    }
                    self.dispatch(&events);
                }
                Err(e) => {
                    log::error!("Scheduler pass failed for vault {}: {}", id, e);
                    report.failures.push((id.clone(), e.to_string()));
                }
            }
        }

        if !report.is_quiet() {
            log::info!(
                "Tick: {} vaults, {} transitions, {} attempts expired, {} failures",
                report.evaluated,
                report.transitions.len(),
                report.attempts_expired.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Open a recovery attempt for a beneficiary of a Triggered vault.
    pub fn initiate_recovery(
        &self,
        vault_id: &VaultId,
        beneficiary_id: &PartyId,
    ) -> Result<RecoveryAttempt, RecoveryError> {
        let now = self.clock.now();
        let (attempt, events) = self.store.transaction(|tx| -> Result<_, RecoveryError> {
            let mut vault = load_vault(tx, vault_id)?;
            let mut events = Vec::new();
            self.advance(tx, &mut vault, now, &mut events)?;

            if let Some(open) = tx.open_attempt(vault_id)? {
                return Err(RecoveryError::RecoveryAlreadyOpen(open.id));
            }
            if vault.status != VaultStatus::Triggered {
                return Err(RecoveryError::VaultNotTriggered(vault.status));
            }

            let is_beneficiary = tx
                .parties(vault_id)?
                .iter()
                .any(|p| &p.id == beneficiary_id && p.role == PartyRole::Beneficiary);
            if !is_beneficiary {
                return Err(RecoveryError::UnknownBeneficiary(beneficiary_id.clone()));
            }

            let attempt = RecoveryAttempt {
                id: AttemptId::generate(),
                vault_id: vault.id.clone(),
                beneficiary_id: beneficiary_id.clone(),
                initiated_at: now,
                expires_at: now.saturating_add(self.config.attempt_ttl_secs),
                required_threshold: vault.recovery_threshold,
                collected_attestations: BTreeSet::new(),
                status: AttemptStatus::Open,
                resolved_at: None,
            };
            tx.put_attempt(&attempt)?;
            machine::begin_recovery(&mut vault, attempt.id.clone(), attempt.expires_at)?;
            tx.put_vault(&vault)?;

            events.push(VaultEvent::StatusChanged {
                vault_id: vault.id.clone(),
                from: VaultStatus::Triggered,
                to: VaultStatus::Recovering,
            });
            events.push(VaultEvent::RecoveryInitiated {
                vault_id: vault.id.clone(),
                attempt_id: attempt.id.clone(),
                beneficiary_id: beneficiary_id.clone(),
                expires_at: attempt.expires_at,
            });
            Ok((attempt, events))
        })?;

        log::info!(
            "Recovery {} opened for vault {} (needs {} attestations)",
            attempt.id,
            vault_id,
            attempt.required_threshold
        );
        self.dispatch(&events);
        Ok(attempt)
    }

    fn reconstruct(
        &self,
        fragments: &[Fragment],
    ) -> Result<Zeroizing<Vec<u8>>, ReconstructionFailure> {
        let mut shares = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let share = self
                .cipher
                .open(fragment)
                .map_err(|e| ReconstructionFailure::Fragment(fragment.id.clone(), e))?;
            shares.push(share);
        }
        reconstruct_secret(&shares).map_err(ReconstructionFailure::Shares)
    }

    /// Verify and count one guardian attestation. The submission that
    /// crosses the threshold reconstructs the secret in the same
    /// transaction.
    pub fn submit_attestation(
        &self,
        attempt_id: &AttemptId,
        submission: &AttestationSubmission,
    ) -> Result<SubmissionOutcome, RecoveryError> {
        let now = self.clock.now();
        let result = self.store.transaction(|tx| -> Result<_, RecoveryError> {
            let mut attempt = tx
                .attempt(attempt_id)?
                .ok_or_else(|| RecoveryError::AttemptNotFound(attempt_id.clone()))?;
            let mut vault = load_vault(tx, &attempt.vault_id)?;
            let parties = tx.parties(&vault.id)?;
            let beneficiary = parties
                .iter()
                .find(|p| p.id == attempt.beneficiary_id)
                .ok_or_else(|| RecoveryError::UnknownBeneficiary(attempt.beneficiary_id.clone()))?;

            let nonce_seen = tx.nonce_seen(attempt_id, &submission.guardian_id, submission.nonce)?;
            let progress = self.collector.submit(
                &mut attempt,
                &parties,
                &beneficiary.public_identity,
                submission,
                nonce_seen,
                now,
            )?;

            tx.record_nonce(attempt_id, &submission.guardian_id, submission.nonce)?;
            let record: Attestation = submission.to_record(attempt_id);
            tx.upsert_attestation(&record)?;

            let mut events = vec![VaultEvent::AttestationAccepted {
                vault_id: vault.id.clone(),
                attempt_id: attempt_id.clone(),
                guardian_id: submission.guardian_id.clone(),
                collected: progress.collected,
                required: progress.required,
            }];

            if !progress.is_satisfied() {
                tx.put_attempt(&attempt)?;
                return Ok((
                    SubmissionOutcome::Pending {
                        collected: progress.collected,
                        required: progress.required,
                    },
                    events,
                ));
            }

            let fragments: Vec<Fragment> = tx
                .fragments(&vault.id)?
                .into_iter()
                .filter(|f| attempt.collected_attestations.contains(&f.holder_party_id))
                .collect();

            match self.reconstruct(&fragments) {
                Ok(secret) => {
                    attempt.resolve(AttemptStatus::Satisfied, now);
                    machine::complete_recovery(&mut vault)?;
                    tx.put_attempt(&attempt)?;
                    tx.put_vault(&vault)?;
                    tx.record_outcome(&outcome_for(&attempt, &vault, true, None, now))?;

                    events.push(VaultEvent::StatusChanged {
                        vault_id: vault.id.clone(),
                        from: VaultStatus::Recovering,
                        to: VaultStatus::Recovered,
                    });
                    events.push(VaultEvent::RecoveryCompleted {
                        vault_id: vault.id.clone(),
                        attempt_id: attempt.id.clone(),
                        beneficiary_id: attempt.beneficiary_id.clone(),
                    });
                    Ok((
                        SubmissionOutcome::Recovered {
                            beneficiary_id: attempt.beneficiary_id.clone(),
                            secret,
                        },
                        events,
                    ))
                }
                Err(failure) => {
                    let reason = failure.to_string();
                    machine::abort_recovery(&mut vault)?;
                    close_attempt(tx, &mut attempt, &vault, AttemptStatus::Aborted, &reason, now)?;
                    tx.put_vault(&vault)?;

                    events.push(VaultEvent::StatusChanged {
                        vault_id: vault.id.clone(),
                        from: VaultStatus::Recovering,
                        to: VaultStatus::Triggered,
                    });
                    events.push(VaultEvent::OperatorAlert {
                        vault_id: vault.id.clone(),
                        attempt_id: Some(attempt.id.clone()),
                        message: format!("reconstruction failed: {}", reason),
                    });
                    Ok((SubmissionOutcome::Aborted { reason }, events))
                }
            }
        });

        match result {
            Ok((outcome, events)) => {
                match &outcome {
                    SubmissionOutcome::Recovered { .. } => {
                        log::info!("Recovery {} satisfied; secret reconstructed", attempt_id)
                    }
                    SubmissionOutcome::Aborted { reason } => {
                        log::error!("Recovery {} aborted: {}", attempt_id, reason)
                    }
                    SubmissionOutcome::Pending { .. } => {}
                }
                self.dispatch(&events);
                Ok(outcome)
            }
            Err(RecoveryError::Attestation(rejection)) => {
                log::warn!("Attestation for {} rejected: {}", attempt_id, rejection);
                self.dispatch(&[VaultEvent::AttestationRejected {
                    attempt_id: attempt_id.clone(),
                    guardian_id: rejection.guardian_id().cloned(),
                    reason: rejection.to_string(),
                }]);
                Err(RecoveryError::Attestation(rejection))
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn vault(&self, vault_id: &VaultId) -> Result<Option<Vault>, RecoveryError> {
        Ok(self.store.transaction(|tx| tx.vault(vault_id))?)
    }

    pub fn parties(&self, vault_id: &VaultId) -> Result<Vec<Party>, RecoveryError> {
        Ok(self.store.transaction(|tx| tx.parties(vault_id))?)
    }

    pub fn attempt(&self, attempt_id: &AttemptId) -> Result<Option<RecoveryAttempt>, RecoveryError> {
        Ok(self.store.transaction(|tx| tx.attempt(attempt_id))?)
    }

    pub fn attestations(&self, attempt_id: &AttemptId) -> Result<Vec<Attestation>, RecoveryError> {
        Ok(self.store.transaction(|tx| tx.attestations(attempt_id))?)
    }

    /// Heartbeats for every live vault, most urgent first.
    pub fn heartbeats(&self, config: &HeartbeatConfig) -> Result<Vec<HeartbeatStatus>, RecoveryError> {
        let now = self.clock.now();
        let vaults = self.store.transaction(|tx| -> Result<_, StoreError> {
            let mut vaults = Vec::new();
            for id in tx.live_vault_ids()? {
                if let Some(vault) = tx.vault(&id)? {
                    vaults.push(vault);
                }
            }
            Ok(vaults)
        })?;
        Ok(evaluate_batch(&vaults, now, config))
    }

    pub fn metrics(&self) -> Result<RecoveryMetrics, RecoveryError> {
        let (outcomes, owners) = self.store.transaction(|tx| -> Result<_, StoreError> {
            Ok((tx.outcomes()?, tx.count_active_owners()?))
        })?;
        Ok(RecoveryMetrics::from_outcomes(&outcomes, owners))
    }
}
