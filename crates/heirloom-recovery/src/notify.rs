//! Vault events and the notification capability
//!
//! Every committed state change produces a [`VaultEvent`]. Delivery is
//! fire-and-forget: a notifier that fails must not undo the change, so
//! [`Notifier::notify`] has no error path.

use heirloom_core::{AttemptId, PartyId, Timestamp, VaultId, VaultStatus};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info = 1,
    Warning = 2,
    /// Needs an operator
    Critical = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    VaultCreated {
        vault_id: VaultId,
        threshold: u8,
        total: u8,
    },
    CheckedIn {
        vault_id: VaultId,
        next_check_in_due_at: Timestamp,
    },
    StatusChanged {
        vault_id: VaultId,
        from: VaultStatus,
        to: VaultStatus,
    },
    RecoveryInitiated {
        vault_id: VaultId,
        attempt_id: AttemptId,
        beneficiary_id: PartyId,
        expires_at: Timestamp,
    },
    AttestationAccepted {
        vault_id: VaultId,
        attempt_id: AttemptId,
        guardian_id: PartyId,
        collected: usize,
        required: u8,
    },
    AttestationRejected {
        attempt_id: AttemptId,
        guardian_id: Option<PartyId>,
        reason: String,
    },
    RecoveryCompleted {
        vault_id: VaultId,
        attempt_id: AttemptId,
        beneficiary_id: PartyId,
    },
    RecoveryExpired {
        vault_id: VaultId,
        attempt_id: AttemptId,
    },
    VaultCancelled {
        vault_id: VaultId,
    },
    /// Fatal condition; never retried automatically
    OperatorAlert {
        vault_id: VaultId,
        attempt_id: Option<AttemptId>,
        message: String,
    },
}

impl VaultEvent {
    /// The vault this event concerns, if known.
    pub fn vault_id(&self) -> Option<&VaultId> {
        match self {
            VaultEvent::VaultCreated { vault_id, .. }
            | VaultEvent::CheckedIn { vault_id, .. }
            | VaultEvent::StatusChanged { vault_id, .. }
            | VaultEvent::RecoveryInitiated { vault_id, .. }
            | VaultEvent::AttestationAccepted { vault_id, .. }
            | VaultEvent::RecoveryCompleted { vault_id, .. }
            | VaultEvent::RecoveryExpired { vault_id, .. }
            | VaultEvent::VaultCancelled { vault_id }
            | VaultEvent::OperatorAlert { vault_id, .. } => Some(vault_id),
            VaultEvent::AttestationRejected { .. } => None,
        }
    }

    pub fn level(&self) -> NotificationLevel {
        match self {
            VaultEvent::OperatorAlert { .. } => NotificationLevel::Critical,
            VaultEvent::StatusChanged {
                to: VaultStatus::Grace | VaultStatus::Triggered,
                ..
            }
            | VaultEvent::RecoveryInitiated { .. }
            | VaultEvent::AttestationRejected { .. }
            | VaultEvent::RecoveryExpired { .. } => NotificationLevel::Warning,
            _ => NotificationLevel::Info,
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, VaultEvent::OperatorAlert { .. })
    }

    /// One-line summary for logs and plain-text channels.
    pub fn summary(&self) -> String {
        match self {
            VaultEvent::VaultCreated {
                vault_id,
                threshold,
                total,
            } => format!("vault {} created ({}-of-{})", vault_id, threshold, total),
            VaultEvent::CheckedIn {
                vault_id,
                next_check_in_due_at,
            } => format!(
                "vault {} checked in, next due at {}",
                vault_id, next_check_in_due_at
            ),
            VaultEvent::StatusChanged { vault_id, from, to } => {
                format!("vault {}: {} -> {}", vault_id, from, to)
            }
            VaultEvent::RecoveryInitiated {
                vault_id,
                attempt_id,
                beneficiary_id,
                expires_at,
            } => format!(
                "vault {}: recovery {} opened for {} (expires {})",
                vault_id, attempt_id, beneficiary_id, expires_at
            ),
            VaultEvent::AttestationAccepted {
                vault_id,
                attempt_id,
                guardian_id,
                collected,
                required,
            } => format!(
                "vault {}: attempt {} attested by {} ({}/{})",
                vault_id, attempt_id, guardian_id, collected, required
            ),
            VaultEvent::AttestationRejected {
                attempt_id,
                guardian_id,
                reason,
            } => match guardian_id {
                Some(guardian) => format!(
                    "attempt {}: attestation from {} rejected: {}",
                    attempt_id, guardian, reason
                ),
                None => format!("attempt {}: attestation rejected: {}", attempt_id, reason),
            },
            VaultEvent::RecoveryCompleted {
                vault_id,
                attempt_id,
                beneficiary_id,
            } => format!(
                "vault {}: attempt {} recovered for {}",
                vault_id, attempt_id, beneficiary_id
            ),
            VaultEvent::RecoveryExpired {
                vault_id,
                attempt_id,
            } => format!("vault {}: attempt {} expired", vault_id, attempt_id),
            VaultEvent::VaultCancelled { vault_id } => format!("vault {} cancelled", vault_id),
            VaultEvent::OperatorAlert {
                vault_id,
                attempt_id,
                message,
            } => match attempt_id {
                Some(attempt) => format!("ALERT vault {} attempt {}: {}", vault_id, attempt, message),
                None => format!("ALERT vault {}: {}", vault_id, message),
            },
        }
    }
}

/// Notification delivery capability.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &VaultEvent);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, event: &VaultEvent) {
        (**self).notify(event)
    }
}

/// Writes events to the log at their level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &VaultEvent) {
        match event.level() {
            NotificationLevel::Info => log::info!("{}", event.summary()),
            NotificationLevel::Warning => log::warn!("{}", event.summary()),
            NotificationLevel::Critical => log::error!("{}", event.summary()),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<VaultEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<VaultEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<VaultEvent> {
        self.events().into_iter().filter(|e| e.is_alert()).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, event: &VaultEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
