//! Vault lifecycle transitions
//!
//! ```text
//!            check-in
//!           ┌────────┐
//!           ▼        │
//!        Active ─────┘ ──deadline──▶ Grace ──grace expiry──▶ Triggered
//!           ▲                          │                      │     ▲
//!           └───────check-in───────────┘              initiate│     │attempt expired
//!                                                             ▼     │
//!                                                          Recovering ──quorum──▶ Recovered
//!
//!  any non-terminal ──owner cancel──▶ Cancelled
//! ```
//!
//! Time-driven transitions come from [`evaluate`], which is pure. Event-driven
//! ones ([`check_in`], [`cancel`], [`begin_recovery`], …) mutate the vault in
//! place and leave persistence to the caller.

use crate::VaultError;
use heirloom_core::{
    verify_detached, ActiveRecovery, AttemptId, OwnerAction, OwnerMessage, Timestamp, Vault,
    VaultStatus,
};
use serde::{Deserialize, Serialize};

/// A time-driven transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Active → Grace: the check-in deadline passed
    EnterGrace,
    /// Grace → Triggered: the grace period ran out
    Trigger,
    /// Recovering → Triggered: the open attempt hit its hard expiry
    ExpireRecovery { attempt_id: AttemptId },
}

impl Transition {
    pub fn target(&self) -> VaultStatus {
        match self {
            Transition::EnterGrace => VaultStatus::Grace,
            Transition::Trigger | Transition::ExpireRecovery { .. } => VaultStatus::Triggered,
        }
    }
}

/// What the vault should do next at `now`, if anything.
pub fn evaluate(vault: &Vault, now: Timestamp) -> Option<Transition> {
    match vault.status {
        VaultStatus::Active if now >= vault.next_check_in_due_at => Some(Transition::EnterGrace),
        VaultStatus::Grace if now >= vault.grace_expires_at() => Some(Transition::Trigger),
        VaultStatus::Recovering => match &vault.active_recovery {
            Some(active) if now >= active.expires_at => Some(Transition::ExpireRecovery {
                attempt_id: active.attempt_id.clone(),
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Apply a transition returned by [`evaluate`].
pub fn apply(vault: &mut Vault, transition: &Transition) {
    log::debug!(
        "vault {}: {} -> {}",
        vault.id,
        vault.status,
        transition.target()
    );
    if let Transition::ExpireRecovery { .. } = transition {
        vault.active_recovery = None;
    }
    vault.status = transition.target();
}

/// Evaluate and apply until stable. A vault several deadlines overdue lands in
/// the right status in one pass.
pub fn settle(vault: &mut Vault, now: Timestamp) -> Vec<Transition> {
    let mut applied = Vec::new();
    while let Some(transition) = evaluate(vault, now) {
        apply(vault, &transition);
        applied.push(transition);
    }
    applied
}

/// Accepted check-in summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInReceipt {
    pub previous_status: VaultStatus,
    pub next_check_in_due_at: Timestamp,
}

fn verify_owner_message(
    vault: &Vault,
    message: &OwnerMessage,
    signature: &[u8],
    action: OwnerAction,
) -> Result<(), VaultError> {
    if vault.is_terminal() {
        return Err(VaultError::VaultTerminal(vault.status));
    }
    if message.vault_id != vault.id {
        return Err(VaultError::VaultMismatch {
            expected: vault.id.clone(),
            got: message.vault_id.clone(),
        });
    }
    if message.action != action {
        return Err(VaultError::UnexpectedAction(message.action));
    }
    if !verify_detached(&message.to_bytes(), signature, &vault.owner_identity) {
        return Err(VaultError::InvalidOwnerSignature);
    }
    if message.sequence <= vault.last_check_in_sequence {
        return Err(VaultError::StaleSequence {
            last: vault.last_check_in_sequence,
            got: message.sequence,
        });
    }
    Ok(())
}

/// Owner proof of life.
///
/// Accepted while Active, or in Grace before the grace period runs out
/// (measured against `now`, not the last applied status). Resets the
/// deadline to `now + interval`.
pub fn check_in(
    vault: &mut Vault,
    message: &OwnerMessage,
    signature: &[u8],
    now: Timestamp,
) -> Result<CheckInReceipt, VaultError> {
    verify_owner_message(vault, message, signature, OwnerAction::CheckIn)?;

    let lapsed = now >= vault.grace_expires_at();
    if matches!(vault.status, VaultStatus::Triggered | VaultStatus::Recovering) || lapsed {
        return Err(VaultError::CheckInClosed(vault.status));
    }

    let previous_status = vault.status;
    vault.status = VaultStatus::Active;
    vault.last_check_in_at = now;
    vault.next_check_in_due_at = now.saturating_add(vault.check_in_interval_secs);
    vault.last_check_in_sequence = message.sequence;

    Ok(CheckInReceipt {
        previous_status,
        next_check_in_due_at: vault.next_check_in_due_at,
    })
}

/// Owner cancellation. Any non-terminal vault becomes Cancelled.
///
/// Returns the status the vault was in, so the caller can abort an open
/// recovery attempt.
pub fn cancel(
    vault: &mut Vault,
    message: &OwnerMessage,
    signature: &[u8],
    now: Timestamp,
) -> Result<VaultStatus, VaultError> {
    verify_owner_message(vault, message, signature, OwnerAction::Cancel)?;

    let previous = vault.status;
    vault.status = VaultStatus::Cancelled;
    vault.cancelled_at = Some(now);
    vault.last_check_in_sequence = message.sequence;
    vault.active_recovery = None;
    Ok(previous)
}

/// Triggered → Recovering for the given attempt.
pub fn begin_recovery(
    vault: &mut Vault,
    attempt_id: AttemptId,
    expires_at: Timestamp,
) -> Result<(), VaultError> {
    if vault.status != VaultStatus::Triggered {
        return Err(VaultError::NotTriggered(vault.status));
    }
    vault.status = VaultStatus::Recovering;
    vault.active_recovery = Some(ActiveRecovery {
        attempt_id,
        expires_at,
    });
    Ok(())
}

/// Recovering → Recovered (terminal).
pub fn complete_recovery(vault: &mut Vault) -> Result<(), VaultError> {
    if vault.status != VaultStatus::Recovering {
        return Err(VaultError::NotRecovering(vault.status));
    }
    vault.status = VaultStatus::Recovered;
    vault.active_recovery = None;
    Ok(())
}

/// Recovering → Triggered after a failed reconstruction.
pub fn abort_recovery(vault: &mut Vault) -> Result<(), VaultError> {
    if vault.status != VaultStatus::Recovering {
        return Err(VaultError::NotRecovering(vault.status));
    }
    vault.status = VaultStatus::Triggered;
    vault.active_recovery = None;
    Ok(())
}
