//! Heirloom Recovery
//!
//! Turns a Triggered vault back into its secret, for its beneficiary, once
//! enough guardians agree.
//!
//! # Flow
//!
//! 1. The scheduler ([`RecoveryOrchestrator::tick`]) moves overdue vaults to
//!    Triggered.
//! 2. A beneficiary opens an attempt ([`RecoveryOrchestrator::initiate_recovery`]).
//!    At most one attempt per vault is ever open.
//! 3. Guardians sign an attestation bound to the attempt, the beneficiary and
//!    the vault's domain, and submit it
//!    ([`RecoveryOrchestrator::submit_attestation`]).
//! 4. The submission that reaches the threshold decrypts the attesting
//!    guardians' fragments and reconstructs the secret in the same
//!    transaction. A corrupt share aborts the attempt and alerts an operator.
//!
//! Storage, fragment decryption, time and notification delivery are all
//! injected.

pub mod attestation;
pub mod metrics;
pub mod notify;
pub mod orchestrator;

pub use attestation::{
    attestation_payload, is_satisfied, AttestationCollector, AttestationProgress,
    AttestationRejection, AttestationSubmission,
};
pub use metrics::{RecoveryMetrics, SchemeStats};
pub use notify::{LogNotifier, MemoryNotifier, NotificationLevel, Notifier, VaultEvent};
pub use orchestrator::{
    CreatedVault, NewParty, RecoveryConfig, RecoveryError, RecoveryOrchestrator,
    SubmissionOutcome, TickReport, VaultSetup,
};
