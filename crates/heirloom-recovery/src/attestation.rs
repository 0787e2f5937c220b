//! Guardian attestation collection
//!
//! The collector decides whether one guardian submission counts toward an
//! attempt's quorum. It rebuilds the signed payload itself from the attempt
//! and the registered guardian, so a guardian can only ever approve the
//! exact attempt, beneficiary and vault it was shown.

use heirloom_core::{
    verify_typed, AttemptId, Attestation, AttestationPayload, Domain, Party, PartyId,
    RecoveryAttempt, ReplayRejection, ReplayWindow, SignerId, Timestamp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a submission did not count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationRejection {
    #[error("Attempt {attempt_id} is not accepting attestations")]
    AttemptClosed { attempt_id: AttemptId },
    #[error("{guardian_id} is not a guardian of this vault")]
    UnknownGuardian { guardian_id: PartyId },
    #[error("Signature from guardian {guardian_id} did not verify")]
    InvalidSignature { guardian_id: PartyId },
    #[error("Nonce from guardian {guardian_id} was already used")]
    ReplayDetected { guardian_id: PartyId },
    #[error("Timestamp from guardian {guardian_id} is outside the accepted window")]
    ExpiredWindow { guardian_id: PartyId },
}

impl AttestationRejection {
    /// Guardian named by the rejection, if any.
    pub fn guardian_id(&self) -> Option<&PartyId> {
        match self {
            AttestationRejection::AttemptClosed { .. } => None,
            AttestationRejection::UnknownGuardian { guardian_id }
            | AttestationRejection::InvalidSignature { guardian_id }
            | AttestationRejection::ReplayDetected { guardian_id }
            | AttestationRejection::ExpiredWindow { guardian_id } => Some(guardian_id),
        }
    }
}

/// What a guardian sends to approve an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSubmission {
    pub guardian_id: PartyId,
    pub signature: Vec<u8>,
    pub nonce: u64,
    pub signed_at: Timestamp,
}

impl AttestationSubmission {
    pub fn to_record(&self, attempt_id: &AttemptId) -> Attestation {
        Attestation {
            recovery_attempt_id: attempt_id.clone(),
            guardian_id: self.guardian_id.clone(),
            signature: self.signature.clone(),
            nonce: self.nonce,
            signed_at: self.signed_at,
        }
    }
}

/// Quorum state after an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationProgress {
    pub collected: usize,
    pub required: u8,
    /// False when the guardian had already been counted
    pub newly_counted: bool,
}

impl AttestationProgress {
    pub fn is_satisfied(&self) -> bool {
        self.collected >= self.required as usize
    }
}

/// Quorum reached for this attempt?
pub fn is_satisfied(attempt: &RecoveryAttempt) -> bool {
    attempt.quorum_count() >= attempt.required_threshold as usize
}

/// Payload a guardian signs for `attempt`.
pub fn attestation_payload(
    attempt: &RecoveryAttempt,
    beneficiary_identity: &SignerId,
    guardian_identity: &SignerId,
    nonce: u64,
    signed_at: Timestamp,
) -> AttestationPayload {
    AttestationPayload {
        recovery_attempt_id: attempt.id.clone(),
        beneficiary_identity: beneficiary_identity.clone(),
        guardian_identity: guardian_identity.clone(),
        signed_at,
        nonce,
    }
}

#[derive(Debug, Clone)]
pub struct AttestationCollector {
    deployment: String,
    window: ReplayWindow,
}

impl AttestationCollector {
    pub fn new(deployment: impl Into<String>, window: ReplayWindow) -> Self {
        Self {
            deployment: deployment.into(),
            window,
        }
    }

    /// Signing domain for attestations on `attempt`'s vault.
    pub fn domain_for(&self, attempt: &RecoveryAttempt) -> Domain {
        Domain::new(self.deployment.clone(), attempt.vault_id.clone())
    }

    /// Check one submission and, if it is valid, add the guardian to the
    /// attempt's collected set.
    ///
    /// `parties` are the vault's registered parties. `nonce_seen` is the
    /// caller's lookup for `(attempt, guardian, nonce)`. The attempt is only
    /// modified on success.
    pub fn submit(
        &self,
        attempt: &mut RecoveryAttempt,
        parties: &[Party],
        beneficiary_identity: &SignerId,
        submission: &AttestationSubmission,
        nonce_seen: bool,
        now: Timestamp,
    ) -> Result<AttestationProgress, AttestationRejection> {
        if !attempt.accepts_attestations(now) {
            return Err(AttestationRejection::AttemptClosed {
                attempt_id: attempt.id.clone(),
            });
        }

        let guardian_id = &submission.guardian_id;
        let guardian = parties
            .iter()
            .find(|p| &p.id == guardian_id && p.vault_id == attempt.vault_id && p.is_guardian())
            .ok_or_else(|| AttestationRejection::UnknownGuardian {
                guardian_id: guardian_id.clone(),
            })?;

        let payload = attestation_payload(
            attempt,
            beneficiary_identity,
            &guardian.public_identity,
            submission.nonce,
            submission.signed_at,
        );
        if !verify_typed(
            &self.domain_for(attempt),
            &payload,
            &submission.signature,
            &guardian.public_identity,
        ) {
            return Err(AttestationRejection::InvalidSignature {
                guardian_id: guardian_id.clone(),
            });
        }

        self.window
            .check(submission.signed_at, now, nonce_seen)
            .map_err(|rejection| match rejection {
                ReplayRejection::ReplayDetected => AttestationRejection::ReplayDetected {
                    guardian_id: guardian_id.clone(),
                },
                ReplayRejection::ExpiredWindow => AttestationRejection::ExpiredWindow {
                    guardian_id: guardian_id.clone(),
                },
            })?;

        let newly_counted = attempt.collected_attestations.insert(guardian_id.clone());
        Ok(AttestationProgress {
            collected: attempt.quorum_count(),
            required: attempt.required_threshold,
            newly_counted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::{AttemptStatus, PartyRole, SigningKey, VaultId};
    use std::collections::BTreeSet;

    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        collector: AttestationCollector,
        attempt: RecoveryAttempt,
        parties: Vec<Party>,
        keys: Vec<SigningKey>,
        beneficiary: SignerId,
    }

    fn party(id: &str, vault: &str, role: PartyRole, key: &SigningKey) -> Party {
        Party {
            id: PartyId::new(id),
            vault_id: VaultId::new(vault),
            role,
            public_identity: key.identity(),
            contact_handle: format!("{}@example.com", id),
        }
    }

    fn fixture() -> Fixture {
        let keys: Vec<SigningKey> = (0..3).map(|_| SigningKey::generate()).collect();
        let beneficiary_key = SigningKey::generate();
        let mut parties: Vec<Party> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| party(&format!("g{}", i + 1), "vault_1", PartyRole::Guardian, k))
            .collect();
        parties.push(party("b1", "vault_1", PartyRole::Beneficiary, &beneficiary_key));

        let attempt = RecoveryAttempt {
            id: AttemptId::new("attempt_a"),
            vault_id: VaultId::new("vault_1"),
            beneficiary_id: PartyId::new("b1"),
            initiated_at: NOW - 100,
            expires_at: NOW + 86_400,
            required_threshold: 2,
            collected_attestations: BTreeSet::new(),
            status: AttemptStatus::Open,
            resolved_at: None,
        };

        Fixture {
            collector: AttestationCollector::new("test", ReplayWindow::default()),
            attempt,
            parties,
            keys,
            beneficiary: beneficiary_key.identity(),
        }
    }

    fn sign(fx: &Fixture, guardian: usize, nonce: u64, signed_at: Timestamp) -> AttestationSubmission {
        let key = &fx.keys[guardian];
        let payload = attestation_payload(
            &fx.attempt,
            &fx.beneficiary,
            &key.identity(),
            nonce,
            signed_at,
        );
        AttestationSubmission {
            guardian_id: PartyId::new(format!("g{}", guardian + 1)),
            signature: key.sign_typed(&fx.collector.domain_for(&fx.attempt), &payload),
            nonce,
            signed_at,
        }
    }

    fn submit(
        fx: &mut Fixture,
        sub: &AttestationSubmission,
        nonce_seen: bool,
    ) -> Result<AttestationProgress, AttestationRejection> {
        let Fixture {
            collector,
            attempt,
            parties,
            beneficiary,
            ..
        } = fx;
        collector.submit(attempt, parties, beneficiary, sub, nonce_seen, NOW)
    }

    #[test]
    fn test_two_of_three_quorum() {
        let mut fx = fixture();
        let first = sign(&fx, 0, 1, NOW);
        let second = sign(&fx, 1, 1, NOW);

        let progress = submit(&mut fx, &first, false).unwrap();
        assert_eq!(progress.collected, 1);
        assert!(!progress.is_satisfied());

        let progress = submit(&mut fx, &second, false).unwrap();
        assert!(progress.is_satisfied());
        assert!(is_satisfied(&fx.attempt));
    }

    #[test]
    fn test_same_guardian_twice_never_satisfies() {
        let mut fx = fixture();
        let a = sign(&fx, 0, 1, NOW);
        let b = sign(&fx, 0, 2, NOW);

        submit(&mut fx, &a, false).unwrap();
        let progress = submit(&mut fx, &b, false).unwrap();
        assert!(!progress.newly_counted);
        assert_eq!(progress.collected, 1);
        assert!(!is_satisfied(&fx.attempt));
    }

    #[test]
    fn test_unknown_guardian() {
        let mut fx = fixture();
        let mut sub = sign(&fx, 0, 1, NOW);
        sub.guardian_id = PartyId::new("g9");
        assert_eq!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::UnknownGuardian {
                guardian_id: PartyId::new("g9")
            })
        );

        // A beneficiary is a party but not a guardian.
        sub.guardian_id = PartyId::new("b1");
        assert!(matches!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::UnknownGuardian { .. })
        ));
    }

    #[test]
    fn test_signature_for_other_guardian_rejected() {
        let mut fx = fixture();
        let mut sub = sign(&fx, 0, 1, NOW);
        sub.guardian_id = PartyId::new("g2");
        assert_eq!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::InvalidSignature {
                guardian_id: PartyId::new("g2")
            })
        );
        assert_eq!(fx.attempt.quorum_count(), 0);
    }

    #[test]
    fn test_attestation_bound_to_attempt() {
        let mut fx = fixture();
        let sub = sign(&fx, 0, 1, NOW);
        fx.attempt.id = AttemptId::new("attempt_b");
        assert!(matches!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_tampered_nonce_or_timestamp_fails_signature() {
        let mut fx = fixture();
        let mut sub = sign(&fx, 0, 1, NOW);
        sub.nonce = 2;
        assert!(matches!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_replay_and_window() {
        let mut fx = fixture();
        let sub = sign(&fx, 0, 1, NOW);
        assert_eq!(
            submit(&mut fx, &sub, true),
            Err(AttestationRejection::ReplayDetected {
                guardian_id: PartyId::new("g1")
            })
        );

        let stale = sign(&fx, 0, 2, NOW - 3_600);
        assert_eq!(
            submit(&mut fx, &stale, false),
            Err(AttestationRejection::ExpiredWindow {
                guardian_id: PartyId::new("g1")
            })
        );
        assert_eq!(fx.attempt.quorum_count(), 0);
    }

    #[test]
    fn test_closed_attempt() {
        let mut fx = fixture();
        let sub = sign(&fx, 0, 1, NOW);
        fx.attempt.status = AttemptStatus::Expired;
        assert!(matches!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::AttemptClosed { .. })
        ));

        fx.attempt.status = AttemptStatus::Open;
        fx.attempt.expires_at = NOW;
        assert!(matches!(
            submit(&mut fx, &sub, false),
            Err(AttestationRejection::AttemptClosed { .. })
        ));
    }

    #[test]
    fn test_rejection_names_guardian() {
        let rejection = AttestationRejection::ReplayDetected {
            guardian_id: PartyId::new("g1"),
        };
        assert_eq!(rejection.guardian_id(), Some(&PartyId::new("g1")));
        assert!(rejection.to_string().contains("g1"));
    }
}
