//! Security-specific tests.
//!
//! These tests verify:
//! 1. Signature verification rejects malformed and forged inputs without panicking
//! 2. Signatures never verify outside the domain or action they were made for
//! 3. Share parsing and reconstruction reject corruption
//! 4. Fragment blobs are bound to their vault and share index
//! 5. The orchestrator rejects attestations signed for another deployment or
//!    re-encoded as high-S signatures

use heirloom_core::{
    recover_signer, verify_detached, verify_typed, AesGcmFragmentCipher, AttemptId,
    AttestationPayload, Domain, Fragment, FragmentCipher, FragmentId, ManualClock, MemoryStore,
    OwnerMessage, PartyId, SignerId, SigningKey, VaultId, VaultStatus,
};
use heirloom_recovery::{
    attestation_payload, AttestationRejection, AttestationSubmission, CreatedVault, MemoryNotifier,
    NewParty,
    RecoveryConfig, RecoveryError, RecoveryOrchestrator, VaultSetup,
};
use heirloom_shamir::{reconstruct_secret, split_secret, SchemeConfig, ShamirError, Share};
use heirloom_vault::VaultTerms;
use rand::{Rng, RngCore};
use std::sync::Arc;
use zeroize::Zeroize;

// ============================================================================
// 1. Signature parsing
// ============================================================================

#[test]
fn test_random_signatures_never_panic() {
    let mut rng = rand::thread_rng();
    let digest = [7u8; 32];
    for _ in 0..500 {
        let len = rng.gen_range(0..100);
        let mut sig = vec![0u8; len];
        rng.fill_bytes(&mut sig);
        let _ = recover_signer(&digest, &sig);
    }
}

#[test]
fn test_bad_recovery_byte_rejected() {
    let key = SigningKey::generate();
    let mut sig = key.sign_detached(b"hello");
    for v in [4u8, 26, 31, 0xff] {
        sig[64] = v;
        assert!(!verify_detached(b"hello", &sig, &key.identity()));
    }
}

#[test]
fn test_wrong_signer_rejected() {
    let key = SigningKey::generate();
    let other = SigningKey::generate();
    let sig = key.sign_detached(b"proof of life");
    assert!(verify_detached(b"proof of life", &sig, &key.identity()));
    assert!(!verify_detached(b"proof of life", &sig, &other.identity()));
}

#[test]
fn test_signature_bit_flips_rejected() {
    let key = SigningKey::generate();
    let sig = key.sign_detached(b"message");
    for i in 0..64 {
        let mut tampered = sig.clone();
        tampered[i] ^= 0x01;
        assert!(
            !verify_detached(b"message", &tampered, &key.identity()),
            "flip at byte {} verified",
            i
        );
    }
}

/// Same `(r, s)` pair re-encoded as `(r, n - s)` with the parity bit flipped.
fn malleate(sig: &[u8]) -> Vec<u8> {
    let order = secp256k1::constants::CURVE_ORDER;
    let mut out = sig.to_vec();
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = order[i] as i16 - sig[32 + i] as i16 - borrow;
        borrow = 0;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        }
        out[32 + i] = diff as u8;
    }
    out[64] = ((sig[64] - 27) ^ 1) + 27;
    out
}

#[test]
fn test_malleated_signature_rejected() {
    let key = SigningKey::generate();
    for _ in 0..20 {
        let msg: [u8; 16] = rand::thread_rng().gen();
        let sig = key.sign_detached(&msg);
        assert!(verify_detached(&msg, &sig, &key.identity()));
        assert!(!verify_detached(&msg, &malleate(&sig), &key.identity()));
    }
}

#[test]
fn test_malformed_signer_ids_rejected() {
    let zeros = "0".repeat(66);
    let not_hex = "g".repeat(66);
    for input in ["", "zz", "02", zeros.as_str(), not_hex.as_str()] {
        assert!(input.parse::<SignerId>().is_err(), "accepted {:?}", input);
    }
}

// ============================================================================
// 2. Domain and action separation
// ============================================================================

fn payload(attempt: &str, heir: &SigningKey, guardian: &SigningKey) -> AttestationPayload {
    AttestationPayload {
        recovery_attempt_id: AttemptId::new(attempt),
        beneficiary_identity: heir.identity(),
        guardian_identity: guardian.identity(),
        signed_at: 1_700_000_000,
        nonce: 1,
    }
}

#[test]
fn test_attestation_bound_to_deployment_vault_and_attempt() {
    let guardian = SigningKey::generate();
    let heir = SigningKey::generate();
    let domain = Domain::new("production", VaultId::new("vault_a"));
    let value = payload("attempt_1", &heir, &guardian);
    let sig = guardian.sign_typed(&domain, &value);

    assert!(verify_typed(&domain, &value, &sig, &guardian.identity()));

    let staging = Domain::new("staging", VaultId::new("vault_a"));
    assert!(!verify_typed(&staging, &value, &sig, &guardian.identity()));

    let other_vault = Domain::new("production", VaultId::new("vault_b"));
    assert!(!verify_typed(&other_vault, &value, &sig, &guardian.identity()));

    let other_attempt = payload("attempt_2", &heir, &guardian);
    assert!(!verify_typed(&domain, &other_attempt, &sig, &guardian.identity()));

    let other_heir = payload("attempt_1", &SigningKey::generate(), &guardian);
    assert!(!verify_typed(&domain, &other_heir, &sig, &guardian.identity()));
}

#[test]
fn test_check_in_signature_is_not_a_cancellation() {
    let owner = SigningKey::generate();
    let vault = VaultId::new("vault_a");
    let check_in = OwnerMessage::check_in(vault.clone(), 5, None);
    let sig = owner.sign_detached(&check_in.to_bytes());

    let cancel = OwnerMessage::cancel(vault, 5);
    assert!(!verify_detached(&cancel.to_bytes(), &sig, &owner.identity()));
}

#[test]
fn test_detached_signature_is_not_a_structured_one() {
    let guardian = SigningKey::generate();
    let heir = SigningKey::generate();
    let domain = Domain::new("production", VaultId::new("vault_a"));
    let value = payload("attempt_1", &heir, &guardian);
    let typed_sig = guardian.sign_typed(&domain, &value);

    let owner_msg = OwnerMessage::check_in(VaultId::new("vault_a"), 1, None);
    assert!(!verify_detached(&owner_msg.to_bytes(), &typed_sig, &guardian.identity()));
}

// ============================================================================
// 3. Shares
// ============================================================================

#[test]
fn test_share_parse_garbage_never_panics() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let len = rng.gen_range(0..64);
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        if let Ok(share) = Share::from_bytes(&bytes) {
            assert_ne!(share.index, 0);
            let _ = reconstruct_secret(&[share]);
        }
    }
}

#[test]
fn test_share_index_zero_rejected() {
    assert!(Share::from_bytes(&[0u8; 40]).is_err());
}

#[test]
fn test_below_threshold_is_detected() {
    let secret = b"seed words go here";
    let shares = split_secret(secret, 5, 3).unwrap();
    assert_eq!(
        reconstruct_secret(&shares[..2]).unwrap_err(),
        ShamirError::CorruptShare
    );
    assert_eq!(reconstruct_secret(&shares[2..]).unwrap().as_slice(), secret);
}

#[test]
fn test_corrupted_share_is_detected() {
    let secret = b"seed words go here";
    let mut shares = split_secret(secret, 3, 2).unwrap();
    shares[0].value[3] ^= 0x80;
    assert_eq!(
        reconstruct_secret(&shares[..2]).unwrap_err(),
        ShamirError::CorruptShare
    );
}

#[test]
fn test_mismatched_share_sets_rejected() {
    let a = split_secret(b"first secret", 3, 2).unwrap();
    let b = split_secret(b"other secret", 3, 2).unwrap();
    let mixed = vec![a[0].clone(), b[1].clone()];
    assert!(reconstruct_secret(&mixed).is_err());
}

#[test]
fn test_share_zeroize() {
    let mut share = split_secret(b"zeroize me", 2, 2).unwrap().remove(0);
    share.zeroize();
    assert_eq!(share.index, 0);
    assert!(share.value.is_empty());
}

// ============================================================================
// 4. Fragment blobs
// ============================================================================

fn sealed_fragment(cipher: &AesGcmFragmentCipher, vault: &str, share: &Share) -> Fragment {
    let vault_id = VaultId::new(vault);
    Fragment {
        id: FragmentId::generate(),
        vault_id: vault_id.clone(),
        holder_party_id: PartyId::new("guardian"),
        share_index: share.index,
        scheme_threshold: 2,
        scheme_total: 3,
        encrypted_share_blob: cipher.seal(&vault_id, share).unwrap(),
    }
}

#[test]
fn test_fragment_moved_to_other_vault_fails() {
    let cipher = AesGcmFragmentCipher::generate();
    let share = split_secret(b"secret", 3, 2).unwrap().remove(0);
    let mut fragment = sealed_fragment(&cipher, "vault_a", &share);
    assert_eq!(cipher.open(&fragment).unwrap(), share);

    fragment.vault_id = VaultId::new("vault_b");
    assert!(cipher.open(&fragment).is_err());
}

#[test]
fn test_fragment_relabelled_index_fails() {
    let cipher = AesGcmFragmentCipher::generate();
    let share = split_secret(b"secret", 3, 2).unwrap().remove(0);
    let mut fragment = sealed_fragment(&cipher, "vault_a", &share);
    fragment.share_index = 2;
    assert!(cipher.open(&fragment).is_err());
}

#[test]
fn test_fragment_wrong_key_and_truncation_fail() {
    let cipher = AesGcmFragmentCipher::generate();
    let share = split_secret(b"secret", 3, 2).unwrap().remove(0);
    let fragment = sealed_fragment(&cipher, "vault_a", &share);

    assert!(AesGcmFragmentCipher::generate().open(&fragment).is_err());

    for len in [0, 5, 12, 20, fragment.encrypted_share_blob.len() - 1] {
        let mut truncated = fragment.clone();
        truncated.encrypted_share_blob.truncate(len);
        assert!(cipher.open(&truncated).is_err());
    }
}

// ============================================================================
// 5. Orchestrator-level forgery
// ============================================================================

struct Triggered {
    orch: RecoveryOrchestrator<MemoryStore, AesGcmFragmentCipher, Arc<ManualClock>, Arc<MemoryNotifier>>,
    guardians: Vec<SigningKey>,
    heir: SigningKey,
    created: CreatedVault,
}

fn triggered_vault() -> Triggered {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let orch = RecoveryOrchestrator::new(
        MemoryStore::new(),
        AesGcmFragmentCipher::generate(),
        Arc::clone(&clock),
        Arc::new(MemoryNotifier::new()),
        RecoveryConfig::default(),
    );

    let owner = SigningKey::generate();
    let guardians: Vec<SigningKey> = (0..3).map(|_| SigningKey::generate()).collect();
    let heir = SigningKey::generate();
    let created = orch
        .create_vault(
            &VaultSetup {
                owner_id: "owner".into(),
                owner_identity: owner.identity(),
                terms: VaultTerms::new(100, 100, SchemeConfig::two_of_three()),
                guardians: guardians
                    .iter()
                    .map(|k| NewParty::new(k.identity(), "guardian"))
                    .collect(),
                beneficiaries: vec![NewParty::new(heir.identity(), "heir")],
                attestors: vec![],
            },
            b"secret",
        )
        .unwrap();

    clock.advance(300);
    orch.tick(1_700_000_300).unwrap();
    assert_eq!(
        orch.vault(&created.vault.id).unwrap().unwrap().status,
        VaultStatus::Triggered
    );
    Triggered {
        orch,
        guardians,
        heir,
        created,
    }
}

#[test]
fn test_attestation_signed_for_other_deployment_rejected() {
    let Triggered {
        orch,
        guardians,
        heir,
        created,
    } = triggered_vault();

    let attempt = orch
        .initiate_recovery(&created.vault.id, &created.beneficiaries[0].id)
        .unwrap();
    let signed_at = 1_700_000_300;
    let value = attestation_payload(&attempt, &heir.identity(), &guardians[0].identity(), 9, signed_at);
    let staging = Domain::new("staging", created.vault.id.clone());
    let submission = AttestationSubmission {
        guardian_id: created.guardians[0].id.clone(),
        signature: guardians[0].sign_typed(&staging, &value),
        nonce: 9,
        signed_at,
    };

    let err = orch.submit_attestation(&attempt.id, &submission).unwrap_err();
    assert!(matches!(
        err,
        RecoveryError::Attestation(AttestationRejection::InvalidSignature { .. })
    ));
    assert!(orch.attempt(&attempt.id).unwrap().unwrap().is_open());
    assert!(orch.attestations(&attempt.id).unwrap().is_empty());
}

#[test]
fn test_malleated_attestation_rejected() {
    let Triggered {
        orch,
        guardians,
        heir,
        created,
    } = triggered_vault();

    let attempt = orch
        .initiate_recovery(&created.vault.id, &created.beneficiaries[0].id)
        .unwrap();
    let signed_at = 1_700_000_300;
    let value = attestation_payload(&attempt, &heir.identity(), &guardians[0].identity(), 4, signed_at);
    let domain = Domain::new(RecoveryConfig::default().deployment, created.vault.id.clone());
    let signature = guardians[0].sign_typed(&domain, &value);

    let malleated = AttestationSubmission {
        guardian_id: created.guardians[0].id.clone(),
        signature: malleate(&signature),
        nonce: 4,
        signed_at,
    };
    let err = orch.submit_attestation(&attempt.id, &malleated).unwrap_err();
    assert!(matches!(
        err,
        RecoveryError::Attestation(AttestationRejection::InvalidSignature { .. })
    ));
    assert!(orch.attestations(&attempt.id).unwrap().is_empty());

    let genuine = AttestationSubmission {
        signature,
        ..malleated
    };
    orch.submit_attestation(&attempt.id, &genuine).unwrap();
    assert_eq!(orch.attestations(&attempt.id).unwrap().len(), 1);
}
