//! Multi-vault scenario driven the way the daemon drives it: periodic ticks
//! against an on-disk store.
//!
//! - Vault A: owner checks in every few days and stays Active
//! - Vault B: owner goes silent, recovery opens and expires unattended
//! - Vault C: owner cancels before the deadline

use heirloom_core::{
    AesGcmFragmentCipher, AttemptStatus, Clock, ManualClock, OwnerMessage, SigningKey, Timestamp,
    VaultId, VaultStatus,
};
use heirloom_recovery::{
    CreatedVault, MemoryNotifier, NewParty, RecoveryConfig, RecoveryOrchestrator, VaultEvent,
    VaultSetup,
};
use heirloom_shamir::SchemeConfig;
use heirloom_store::SqliteStore;
use heirloom_vault::{HeartbeatAction, HeartbeatConfig, VaultTerms};
use std::sync::Arc;
use tempfile::NamedTempFile;

const T0: Timestamp = 1_700_000_000;
const HOUR: u64 = 3_600;
const DAY: u64 = 86_400;

type Orchestrator =
    RecoveryOrchestrator<SqliteStore, AesGcmFragmentCipher, Arc<ManualClock>, Arc<MemoryNotifier>>;

fn create(orch: &Orchestrator, owner_id: &str, owner: &SigningKey) -> CreatedVault {
    let setup = VaultSetup {
        owner_id: owner_id.into(),
        owner_identity: owner.identity(),
        terms: VaultTerms::new(7 * DAY, 2 * DAY, SchemeConfig::three_of_five()),
        guardians: (0..5)
            .map(|i| NewParty::new(SigningKey::generate().identity(), format!("g{}", i)))
            .collect(),
        beneficiaries: vec![NewParty::new(SigningKey::generate().identity(), "heir")],
        attestors: vec![NewParty::new(SigningKey::generate().identity(), "notary")],
    };
    orch.create_vault(&setup, owner_id.as_bytes()).unwrap()
}

fn status(orch: &Orchestrator, id: &VaultId) -> VaultStatus {
    orch.vault(id).unwrap().unwrap().status
}

#[test]
fn test_three_vaults_over_a_month() {
    let db = NamedTempFile::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let notifier = Arc::new(MemoryNotifier::new());
    let orch: Orchestrator = RecoveryOrchestrator::new(
        SqliteStore::open(db.path()).unwrap(),
        AesGcmFragmentCipher::generate(),
        Arc::clone(&clock),
        Arc::clone(&notifier),
        RecoveryConfig {
            deployment: "scenario".into(),
            attempt_ttl_secs: 3 * DAY,
            ..RecoveryConfig::default()
        },
    );

    let (alice, bob, carol) = (
        SigningKey::generate(),
        SigningKey::generate(),
        SigningKey::generate(),
    );
    let a = create(&orch, "alice", &alice);
    let b = create(&orch, "bob", &bob);
    let c = create(&orch, "carol", &carol);
    assert_eq!(orch.metrics().unwrap().active_vault_owners, 3);

    // Carol changes her mind on day one.
    clock.advance(DAY);
    let cancel = OwnerMessage::cancel(c.vault.id.clone(), 1);
    orch.cancel(&c.vault.id, &cancel, &carol.sign_detached(&cancel.to_bytes()))
        .unwrap();

    let mut attempt_id = None;
    let mut alice_seq = 0;
    // Hourly ticks for 30 days; Alice checks in every 5 days.
    for hour in 1..=(30 * 24) {
        clock.advance(HOUR);
        let now = clock.now();

        if hour % (5 * 24) == 0 {
            alice_seq += 1;
            let msg = OwnerMessage::check_in(a.vault.id.clone(), alice_seq, None);
            orch.check_in(&a.vault.id, &msg, &alice.sign_detached(&msg.to_bytes()))
                .unwrap();
        }

        let report = orch.tick(now).unwrap();
        assert!(report.failures.is_empty());
        assert!(
            report.transitions.iter().all(|(id, _)| *id != c.vault.id),
            "cancelled vault was advanced"
        );

        if attempt_id.is_none() && status(&orch, &b.vault.id) == VaultStatus::Triggered {
            let attempt = orch
                .initiate_recovery(&b.vault.id, &b.beneficiaries[0].id)
                .unwrap();
            attempt_id = Some(attempt.id);
        }
    }

    assert_eq!(status(&orch, &a.vault.id), VaultStatus::Active);
    assert_eq!(status(&orch, &c.vault.id), VaultStatus::Cancelled);

    // Nobody attested, so the attempt hard-expired and Bob's vault went back
    // to Triggered.
    let attempt_id = attempt_id.expect("bob's vault never triggered");
    assert_eq!(
        orch.attempt(&attempt_id).unwrap().unwrap().status,
        AttemptStatus::Expired
    );
    assert_eq!(status(&orch, &b.vault.id), VaultStatus::Triggered);

    let events = notifier.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, VaultEvent::RecoveryExpired { attempt_id: id, .. } if *id == attempt_id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, VaultEvent::VaultCancelled { vault_id, .. } if *vault_id == c.vault.id)));

    let metrics = orch.metrics().unwrap();
    assert_eq!(metrics.total_attempts, 1);
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.active_vault_owners, 2);
    assert_eq!(metrics.by_scheme["3-of-5"].attempts, 1);

    // Heartbeats: Bob's vault is the most urgent, Carol's is not reported.
    let heartbeats = orch.heartbeats(&HeartbeatConfig::default()).unwrap();
    assert_eq!(heartbeats.len(), 2);
    assert_eq!(heartbeats[0].vault_id, b.vault.id);
    assert_eq!(heartbeats[0].action, HeartbeatAction::Overdue);
    assert_eq!(heartbeats[1].vault_id, a.vault.id);
}
