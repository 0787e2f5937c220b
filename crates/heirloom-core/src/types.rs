//! Persisted records: vaults, parties, fragments, recovery attempts.

use crate::signature::SignerId;
use heirloom_shamir::SchemeConfig;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unix time in seconds.
pub type Timestamp = u64;

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Macro for string-backed identifier newtypes
macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Random identifier with a type prefix, e.g. `vault_3f9a…`.
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, random_hex(12)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(VaultId, "vault");
string_id!(PartyId, "party");
string_id!(FragmentId, "frag");
string_id!(AttemptId, "attempt");

/// Vault lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Owner is checking in on time
    Active,
    /// Deadline missed; owner can still check in
    Grace,
    /// Grace expired; recovery may be initiated
    Triggered,
    /// A recovery attempt is open
    Recovering,
    /// Secret reconstructed for the beneficiary (terminal)
    Recovered,
    /// Owner cancelled the vault (terminal)
    Cancelled,
}

impl VaultStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VaultStatus::Recovered | VaultStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VaultStatus::Active => "active",
            VaultStatus::Grace => "grace",
            VaultStatus::Triggered => "triggered",
            VaultStatus::Recovering => "recovering",
            VaultStatus::Recovered => "recovered",
            VaultStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(VaultStatus::Active),
            "grace" => Some(VaultStatus::Grace),
            "triggered" => Some(VaultStatus::Triggered),
            "recovering" => Some(VaultStatus::Recovering),
            "recovered" => Some(VaultStatus::Recovered),
            "cancelled" => Some(VaultStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The attempt a Recovering vault is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRecovery {
    pub attempt_id: AttemptId,
    pub expires_at: Timestamp,
}

/// A dead-man's-switch vault.
///
/// `next_check_in_due_at` is always `last_check_in_at + check_in_interval_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    /// External account id of the owner
    pub owner_id: String,
    /// Key the owner signs check-ins and cancellations with
    pub owner_identity: SignerId,
    pub status: VaultStatus,
    pub check_in_interval_secs: u64,
    pub grace_period_secs: u64,
    pub last_check_in_at: Timestamp,
    pub next_check_in_due_at: Timestamp,
    /// Highest check-in sequence accepted so far
    pub last_check_in_sequence: u64,
    /// t
    pub recovery_threshold: u8,
    /// n
    pub total_fragments: u8,
    /// Set while `status == Recovering`
    pub active_recovery: Option<ActiveRecovery>,
    pub created_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
}

impl Vault {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// When the grace period following the current deadline runs out.
    pub fn grace_expires_at(&self) -> Timestamp {
        self.next_check_in_due_at
            .saturating_add(self.grace_period_secs)
    }

    pub fn scheme(&self) -> SchemeConfig {
        SchemeConfig::new(self.recovery_threshold, self.total_fragments)
    }
}

/// Role a party plays for a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyRole {
    /// Holds a fragment and attests to recovery
    Guardian,
    /// Receives the reconstructed secret
    Beneficiary,
    /// Witness with no fragment
    Attestor,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Guardian => "guardian",
            PartyRole::Beneficiary => "beneficiary",
            PartyRole::Attestor => "attestor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guardian" => Some(PartyRole::Guardian),
            "beneficiary" => Some(PartyRole::Beneficiary),
            "attestor" => Some(PartyRole::Attestor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub vault_id: VaultId,
    pub role: PartyRole,
    pub public_identity: SignerId,
    /// Opaque handle for the notification collaborator (email, npub, …)
    pub contact_handle: String,
}

impl Party {
    pub fn is_guardian(&self) -> bool {
        self.role == PartyRole::Guardian
    }
}

/// An encrypted share held on behalf of one guardian. Immutable once issued.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub vault_id: VaultId,
    pub holder_party_id: PartyId,
    /// 1..=n
    pub share_index: u8,
    pub scheme_threshold: u8,
    pub scheme_total: u8,
    /// Opaque to the core; only the fragment cipher can open it
    pub encrypted_share_blob: Vec<u8>,
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.id)
            .field("vault_id", &self.vault_id)
            .field("holder_party_id", &self.holder_party_id)
            .field("share_index", &self.share_index)
            .field("scheme", &format_args!("{}-of-{}", self.scheme_threshold, self.scheme_total))
            .field("blob_len", &self.encrypted_share_blob.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptStatus {
    Open,
    Satisfied,
    Expired,
    Aborted,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Open => "open",
            AttemptStatus::Satisfied => "satisfied",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AttemptStatus::Open),
            "satisfied" => Some(AttemptStatus::Satisfied),
            "expired" => Some(AttemptStatus::Expired),
            "aborted" => Some(AttemptStatus::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: AttemptId,
    pub vault_id: VaultId,
    pub beneficiary_id: PartyId,
    pub initiated_at: Timestamp,
    pub expires_at: Timestamp,
    pub required_threshold: u8,
    /// Distinct guardians whose attestations verified
    pub collected_attestations: BTreeSet<PartyId>,
    pub status: AttemptStatus,
    pub resolved_at: Option<Timestamp>,
}

impl RecoveryAttempt {
    pub fn is_open(&self) -> bool {
        self.status == AttemptStatus::Open
    }

    /// Open and not yet past its hard expiry.
    pub fn accepts_attestations(&self, now: Timestamp) -> bool {
        self.is_open() && now < self.expires_at
    }

    pub fn quorum_count(&self) -> usize {
        self.collected_attestations.len()
    }

    pub fn resolve(&mut self, status: AttemptStatus, now: Timestamp) {
        self.status = status;
        self.resolved_at = Some(now);
    }
}

/// A verified guardian attestation. One per `(recovery_attempt_id, guardian_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub recovery_attempt_id: AttemptId,
    pub guardian_id: PartyId,
    pub signature: Vec<u8>,
    pub nonce: u64,
    pub signed_at: Timestamp,
}

/// Audit/metrics record written when an attempt resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub attempt_id: AttemptId,
    pub vault_id: VaultId,
    pub success: bool,
    pub fragments_provided: u8,
    pub threshold: u8,
    pub total: u8,
    /// Failure reason, if any
    pub reason: Option<String>,
    pub recorded_at: Timestamp,
}
