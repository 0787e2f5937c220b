//! Signed message formats
//!
//! - Owner messages (check-in, cancel) are detached signatures over a
//!   length-prefixed byte encoding.
//! - Guardian attestations are typed values signed under a [`Domain`] that
//!   names the deployment and the vault.

use crate::signature::SignerId;
use crate::types::{AttemptId, Timestamp, VaultId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const DOMAIN_TYPE: &str =
    "HeirloomDomain(string name,string version,string deployment,string vaultId)";

/// Domain name every deployment signs under.
pub const DOMAIN_NAME: &str = "Heirloom";
/// Version of the attestation format.
pub const DOMAIN_VERSION: &str = "1";

fn hash_str(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn word_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Signing context for structured messages: deployment + vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub version: String,
    /// Deployment tag, e.g. "production" or "staging"
    pub deployment: String,
    pub vault_id: VaultId,
}

impl Domain {
    pub fn new(deployment: impl Into<String>, vault_id: VaultId) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            deployment: deployment.into(),
            vault_id,
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(hash_str(DOMAIN_TYPE));
        hasher.update(hash_str(&self.name));
        hasher.update(hash_str(&self.version));
        hasher.update(hash_str(&self.deployment));
        hasher.update(hash_str(self.vault_id.as_str()));
        hasher.finalize().into()
    }
}

/// A value with a type descriptor and a canonical field encoding.
pub trait TypedValue {
    fn type_descriptor(&self) -> &'static str;
    fn encode_fields(&self) -> Vec<u8>;
}

/// What a guardian signs to approve a recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationPayload {
    pub recovery_attempt_id: AttemptId,
    pub beneficiary_identity: SignerId,
    pub guardian_identity: SignerId,
    pub signed_at: Timestamp,
    pub nonce: u64,
}

impl TypedValue for AttestationPayload {
    fn type_descriptor(&self) -> &'static str {
        "RecoveryAttestation(string recoveryAttemptId,string beneficiary,string guardian,uint64 timestamp,uint64 nonce)"
    }

    fn encode_fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 * 5);
        out.extend_from_slice(&hash_str(self.recovery_attempt_id.as_str()));
        out.extend_from_slice(&hash_str(self.beneficiary_identity.as_str()));
        out.extend_from_slice(&hash_str(self.guardian_identity.as_str()));
        out.extend_from_slice(&word_u64(self.signed_at));
        out.extend_from_slice(&word_u64(self.nonce));
        out
    }
}

/// Owner-only actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerAction {
    CheckIn,
    Cancel,
}

impl OwnerAction {
    fn tag(self) -> &'static [u8] {
        match self {
            OwnerAction::CheckIn => b"heirloom/check-in/v1",
            OwnerAction::Cancel => b"heirloom/cancel/v1",
        }
    }
}

/// Owner-signed proof of life (or cancellation).
///
/// `sequence` must strictly increase across accepted messages for a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerMessage {
    pub action: OwnerAction,
    pub vault_id: VaultId,
    pub sequence: u64,
    pub memo: Option<String>,
}

impl OwnerMessage {
    pub fn check_in(vault_id: VaultId, sequence: u64, memo: Option<String>) -> Self {
        Self {
            action: OwnerAction::CheckIn,
            vault_id,
            sequence,
            memo,
        }
    }

    pub fn cancel(vault_id: VaultId, sequence: u64) -> Self {
        Self {
            action: OwnerAction::Cancel,
            vault_id,
            sequence,
            memo: None,
        }
    }

    /// Canonical bytes: every variable-length field is length-prefixed so no
    /// two messages share an encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        fn push_field(out: &mut Vec<u8>, field: &[u8]) {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field);
        }

        let mut out = Vec::new();
        push_field(&mut out, self.action.tag());
        push_field(&mut out, self.vault_id.as_str().as_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        match &self.memo {
            Some(memo) => {
                out.push(1);
                push_field(&mut out, memo.as_bytes());
            }
            None => out.push(0),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_separator_binds_every_field() {
        let base = Domain::new("production", VaultId::new("vault_1"));
        let mut seps = vec![base.separator()];

        seps.push(Domain::new("staging", VaultId::new("vault_1")).separator());
        seps.push(Domain::new("production", VaultId::new("vault_2")).separator());
        let mut versioned = base.clone();
        versioned.version = "2".into();
        seps.push(versioned.separator());

        for i in 0..seps.len() {
            for j in (i + 1)..seps.len() {
                assert_ne!(seps[i], seps[j]);
            }
        }
    }

    #[test]
    fn test_owner_actions_never_share_bytes() {
        let vault = VaultId::new("vault_1");
        let check_in = OwnerMessage::check_in(vault.clone(), 5, None);
        let cancel = OwnerMessage::cancel(vault, 5);
        assert_ne!(check_in.to_bytes(), cancel.to_bytes());
    }

    #[test]
    fn test_memo_is_length_prefixed() {
        let a = OwnerMessage::check_in(VaultId::new("v"), 1, Some("ab".into()));
        let b = OwnerMessage::check_in(VaultId::new("v"), 1, Some("a".into()));
        let none = OwnerMessage::check_in(VaultId::new("v"), 1, None);
        let empty = OwnerMessage::check_in(VaultId::new("v"), 1, Some(String::new()));
        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_ne!(none.to_bytes(), empty.to_bytes());
    }

    #[test]
    fn test_word_u64_is_right_aligned() {
        let w = word_u64(0x0102);
        assert_eq!(&w[..30], &[0u8; 30]);
        assert_eq!(&w[30..], &[0x01, 0x02]);
    }
}
