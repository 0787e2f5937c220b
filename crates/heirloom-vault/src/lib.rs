//! Heirloom Vault Module
//!
//! The vault lifecycle: check-in deadlines, grace escalation, and the
//! transitions into and out of recovery.
//!
//! # Concepts
//!
//! - **Deadline**: `last_check_in_at + check_in_interval_secs`. Missing it
//!   moves the vault to Grace.
//! - **Grace**: the owner may still check in. Once it runs out the vault is
//!   Triggered and a beneficiary may start recovery.
//! - **Evaluation**: [`evaluate`] is a pure function of the vault record and
//!   `now`, so the scheduler can run at any cadence.
//!
//! Everything here works on in-memory [`Vault`](heirloom_core::Vault) values.
//! Persisting them, and serializing concurrent writers, is the caller's job.

pub mod heartbeat;
pub mod machine;
pub mod terms;

pub use heartbeat::{
    evaluate_batch, heartbeat, HeartbeatAction, HeartbeatConfig, HeartbeatError, HeartbeatStatus,
};
pub use machine::{
    abort_recovery, apply, begin_recovery, cancel, check_in, complete_recovery, evaluate, settle,
    CheckInReceipt, Transition,
};
pub use terms::{open_vault, VaultTerms};

use heirloom_core::{OwnerAction, VaultId, VaultStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid vault terms: {0}")]
    InvalidTerms(String),
    #[error("Vault is {0} and can no longer change")]
    VaultTerminal(VaultStatus),
    #[error("Message is for vault {got}, not {expected}")]
    VaultMismatch { expected: VaultId, got: VaultId },
    #[error("Unexpected owner action: {0:?}")]
    UnexpectedAction(OwnerAction),
    #[error("Owner signature did not verify")]
    InvalidOwnerSignature,
    #[error("Stale sequence {got} (last accepted {last})")]
    StaleSequence { last: u64, got: u64 },
    #[error("Check-in window closed (vault is {0})")]
    CheckInClosed(VaultStatus),
    #[error("Vault is {0}, not triggered")]
    NotTriggered(VaultStatus),
    #[error("Vault is {0}, not recovering")]
    NotRecovering(VaultStatus),
}
