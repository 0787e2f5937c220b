//! Orchestrator running on the SQLite store: lifecycle, restart, and at-rest tampering.

use heirloom_core::{
    AesGcmFragmentCipher, AttemptId, AttemptStatus, Clock, ManualClock, OwnerMessage,
    RecoveryAttempt, ReplayWindow, SigningKey, StoreError, Timestamp, VaultStatus, VaultStore,
};
use heirloom_recovery::{
    attestation_payload, AttestationSubmission, CreatedVault, MemoryNotifier, NewParty,
    RecoveryConfig, RecoveryError, RecoveryOrchestrator, SubmissionOutcome, VaultSetup,
};
use heirloom_shamir::SchemeConfig;
use heirloom_store::SqliteStore;
use heirloom_vault::VaultTerms;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

const T0: Timestamp = 1_700_000_000;
const DAY: u64 = 86_400;
const KEY: [u8; 32] = [0x42; 32];
const SECRET: &[u8] = b"correct horse battery staple";

type Orchestrator =
    RecoveryOrchestrator<SqliteStore, AesGcmFragmentCipher, Arc<ManualClock>, Arc<MemoryNotifier>>;

struct Keys {
    owner: SigningKey,
    guardians: Vec<SigningKey>,
    heir: SigningKey,
}

impl Keys {
    fn new() -> Self {
        Self {
            owner: SigningKey::generate(),
            guardians: (0..3).map(|_| SigningKey::generate()).collect(),
            heir: SigningKey::generate(),
        }
    }
}

fn orchestrator(path: &Path, clock: &Arc<ManualClock>, notifier: &Arc<MemoryNotifier>) -> Orchestrator {
    RecoveryOrchestrator::new(
        SqliteStore::open(path).unwrap(),
        AesGcmFragmentCipher::new(KEY),
        Arc::clone(clock),
        Arc::clone(notifier),
        RecoveryConfig {
            deployment: "sqlite-test".into(),
            attempt_ttl_secs: 3 * DAY,
            replay_window: ReplayWindow::default(),
        },
    )
}

fn create_vault(orch: &Orchestrator, keys: &Keys) -> CreatedVault {
    let setup = VaultSetup {
        owner_id: "owner-1".into(),
        owner_identity: keys.owner.identity(),
        terms: VaultTerms::new(DAY, DAY, SchemeConfig::two_of_three()),
        guardians: keys
            .guardians
            .iter()
            .enumerate()
            .map(|(i, k)| NewParty::new(k.identity(), format!("guardian-{}@example.com", i)))
            .collect(),
        beneficiaries: vec![NewParty::new(keys.heir.identity(), "heir@example.com")],
        attestors: vec![],
    };
    orch.create_vault(&setup, SECRET).unwrap()
}

fn attest(
    orch: &Orchestrator,
    keys: &Keys,
    created: &CreatedVault,
    attempt: &RecoveryAttempt,
    guardian: usize,
    now: Timestamp,
) -> AttestationSubmission {
    let key = &keys.guardians[guardian];
    let nonce = 1_000 + guardian as u64;
    let payload = attestation_payload(attempt, &keys.heir.identity(), &key.identity(), nonce, now);
    AttestationSubmission {
        guardian_id: created.guardians[guardian].id.clone(),
        signature: key.sign_typed(&orch.collector().domain_for(attempt), &payload),
        nonce,
        signed_at: now,
    }
}

fn trigger(orch: &Orchestrator, clock: &ManualClock) {
    for _ in 0..3 {
        clock.advance(DAY);
        orch.tick(clock.now()).unwrap();
    }
}

#[test]
fn test_recovery_survives_restart() {
    let db = NamedTempFile::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let notifier = Arc::new(MemoryNotifier::new());
    let keys = Keys::new();

    let (created, attempt) = {
        let orch = orchestrator(db.path(), &clock, &notifier);
        let created = create_vault(&orch, &keys);

        let msg = OwnerMessage::check_in(created.vault.id.clone(), 1, None);
        let sig = keys.owner.sign_detached(&msg.to_bytes());
        orch.check_in(&created.vault.id, &msg, &sig).unwrap();

        trigger(&orch, &clock);
        let attempt = orch
            .initiate_recovery(&created.vault.id, &created.beneficiaries[0].id)
            .unwrap();
        let first = orch
            .submit_attestation(&attempt.id, &attest(&orch, &keys, &created, &attempt, 0, clock.now()))
            .unwrap();
        assert!(matches!(first, SubmissionOutcome::Pending { collected: 1, .. }));
        (created, attempt)
    };

    // Process restarts; same database, same fragment key.
    let orch = orchestrator(db.path(), &clock, &notifier);
    let vault = orch.vault(&created.vault.id).unwrap().unwrap();
    assert_eq!(vault.status, VaultStatus::Recovering);
    assert_eq!(vault.last_check_in_sequence, 1);
    assert_eq!(orch.attestations(&attempt.id).unwrap().len(), 1);

    let second = orch
        .submit_attestation(&attempt.id, &attest(&orch, &keys, &created, &attempt, 2, clock.now()))
        .unwrap();
    match second {
        SubmissionOutcome::Recovered { secret, .. } => assert_eq!(secret.as_slice(), SECRET),
        other => panic!("expected recovery, got {:?}", other),
    }

    let metrics = orch.metrics().unwrap();
    assert_eq!(metrics.total_attempts, 1);
    assert_eq!(metrics.successful, 1);
    assert_eq!(metrics.active_vault_owners, 0);
}

#[test]
fn test_tampered_fragment_aborts_and_alerts() {
    let db = NamedTempFile::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let notifier = Arc::new(MemoryNotifier::new());
    let keys = Keys::new();
    let orch = orchestrator(db.path(), &clock, &notifier);
    let created = create_vault(&orch, &keys);

    // Flip one byte of every stored blob behind the store's back.
    {
        let conn = Connection::open(db.path()).unwrap();
        let blobs: Vec<(String, Vec<u8>)> = {
            let mut stmt = conn.prepare("SELECT id, blob FROM fragments").unwrap();
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .unwrap();
            rows.map(|r| r.unwrap()).collect()
        };
        assert_eq!(blobs.len(), 3);
        for (id, mut blob) in blobs {
            let last = blob.len() - 1;
            blob[last] ^= 0xff;
            conn.execute("UPDATE fragments SET blob = ?1 WHERE id = ?2", params![blob, id])
                .unwrap();
        }
    }

    trigger(&orch, &clock);
    let attempt = orch
        .initiate_recovery(&created.vault.id, &created.beneficiaries[0].id)
        .unwrap();
    orch.submit_attestation(&attempt.id, &attest(&orch, &keys, &created, &attempt, 0, clock.now()))
        .unwrap();
    let outcome = orch
        .submit_attestation(&attempt.id, &attest(&orch, &keys, &created, &attempt, 1, clock.now()))
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Aborted { .. }));

    let vault = orch.vault(&created.vault.id).unwrap().unwrap();
    assert_eq!(vault.status, VaultStatus::Triggered);
    assert!(vault.active_recovery.is_none());
    assert_eq!(
        orch.attempt(&attempt.id).unwrap().unwrap().status,
        AttemptStatus::Aborted
    );
    assert_eq!(notifier.alerts().len(), 1);

    let metrics = orch.metrics().unwrap();
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.successful, 0);
}

#[test]
fn test_second_open_attempt_is_rejected() {
    let db = NamedTempFile::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let notifier = Arc::new(MemoryNotifier::new());
    let keys = Keys::new();
    let orch = orchestrator(db.path(), &clock, &notifier);
    let created = create_vault(&orch, &keys);
    trigger(&orch, &clock);

    let first = orch
        .initiate_recovery(&created.vault.id, &created.beneficiaries[0].id)
        .unwrap();
    let again = orch.initiate_recovery(&created.vault.id, &created.beneficiaries[0].id);
    assert!(matches!(again, Err(RecoveryError::RecoveryAlreadyOpen(ref id)) if *id == first.id));

    // A writer that skips the orchestrator still hits the unique index.
    let mut rogue = first.clone();
    rogue.id = AttemptId::new("attempt_rogue");
    let raw = orch.store().transaction(|tx| tx.put_attempt(&rogue));
    assert!(matches!(raw, Err(StoreError::Conflict(_))));
}
