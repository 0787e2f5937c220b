//! Signature verification for owner check-ins and guardian attestations
//!
//! Pure functions over already-fetched bytes. Nothing here touches storage or
//! the network; key lookups and nonce bookkeeping belong to the caller.
//!
//! # Scheme
//!
//! secp256k1 recoverable ECDSA. Signatures are 65 bytes, `r || s || v`, with
//! `v` in `0..=3` or `27..=30`. A signer's identity is its 33-byte compressed
//! public key, hex encoded.
//!
//! - Detached: `SHA-256("\x19Heirloom Signed Message:\n" || len || message)`
//! - Structured: `SHA-256(0x19 0x01 || domain_separator || struct_hash)`
//!   with `struct_hash = SHA-256(SHA-256(type_descriptor) || encoded_fields)`

use crate::messages::{Domain, TypedValue};
use crate::types::Timestamp;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DETACHED_PREFIX: &[u8] = b"\x19Heirloom Signed Message:\n";

/// Length of a recoverable signature, `r || s || v`.
pub const SIGNATURE_LEN: usize = 65;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signer identity: {0}")]
    InvalidIdentity(String),
    #[error("Invalid secret key")]
    InvalidSecretKey,
}

/// Compressed secp256k1 public key, lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignerId(String);

impl SignerId {
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self(hex::encode(pk.serialize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SignerId {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SignatureError::InvalidIdentity(e.to_string()))?;
        let pk = PublicKey::from_slice(&bytes)
            .map_err(|e| SignatureError::InvalidIdentity(e.to_string()))?;
        Ok(Self::from_public_key(&pk))
    }
}

impl TryFrom<String> for SignerId {
    type Error = SignatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SignerId> for String {
    fn from(value: SignerId) -> Self {
        value.0
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest signed for a detached (free-form) message.
pub fn detached_digest(message: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DETACHED_PREFIX);
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Digest signed for a typed value bound to a domain.
pub fn structured_digest(domain: &Domain, type_descriptor: &str, encoded_fields: &[u8]) -> [u8; 32] {
    let type_hash: [u8; 32] = Sha256::digest(type_descriptor.as_bytes()).into();
    let mut struct_hasher = Sha256::new();
    struct_hasher.update(type_hash);
    struct_hasher.update(encoded_fields);
    let struct_hash: [u8; 32] = struct_hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update([0x19, 0x01]);
    hasher.update(domain.separator());
    hasher.update(struct_hash);
    hasher.finalize().into()
}

/// Recover the signer of a 32-byte digest. `None` for any malformed input.
///
/// Only low-S signatures are accepted, so each signature has a single
/// encoding.
pub fn recover_signer(digest: &[u8; 32], signature: &[u8]) -> Option<SignerId> {
    if signature.len() != SIGNATURE_LEN {
        return None;
    }
    let v = match signature[64] {
        v @ 0..=3 => v,
        v @ 27..=30 => v - 27,
        _ => return None,
    };
    let recid = RecoveryId::from_i32(v as i32).ok()?;
    let sig = RecoverableSignature::from_compact(&signature[..64], recid).ok()?;
    let standard = sig.to_standard();
    let mut normalized = standard;
    normalized.normalize_s();
    if normalized != standard {
        log::debug!("Rejected high-S signature");
        return None;
    }
    let secp = Secp256k1::verification_only();
    let pk = secp
        .recover_ecdsa(&Message::from_digest(*digest), &sig)
        .ok()?;
    Some(SignerId::from_public_key(&pk))
}

/// Verify a detached message signature against the claimed signer.
pub fn verify_detached(message: &[u8], signature: &[u8], claimed_signer: &SignerId) -> bool {
    recover_signer(&detached_digest(message), signature).as_ref() == Some(claimed_signer)
}

/// Verify a structured, domain-separated signature.
pub fn verify_structured(
    domain: &Domain,
    type_descriptor: &str,
    encoded_fields: &[u8],
    signature: &[u8],
    claimed_signer: &SignerId,
) -> bool {
    let digest = structured_digest(domain, type_descriptor, encoded_fields);
    recover_signer(&digest, signature).as_ref() == Some(claimed_signer)
}

/// [`verify_structured`] for a [`TypedValue`].
pub fn verify_typed<V: TypedValue>(
    domain: &Domain,
    value: &V,
    signature: &[u8],
    claimed_signer: &SignerId,
) -> bool {
    verify_structured(
        domain,
        value.type_descriptor(),
        &value.encode_fields(),
        signature,
        claimed_signer,
    )
}

/// Owner or guardian signing key.
///
/// The core only verifies; signing lives here so wallets, tests and tools
/// produce exactly the digests the verifier expects.
pub struct SigningKey {
    secret: SecretKey,
}

impl SigningKey {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::new(&mut rand::thread_rng()),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        SecretKey::from_slice(bytes)
            .map(|secret| Self { secret })
            .map_err(|_| SignatureError::InvalidSecretKey)
    }

    pub fn identity(&self) -> SignerId {
        let secp = Secp256k1::signing_only();
        SignerId::from_public_key(&self.secret.public_key(&secp))
    }

    fn sign_digest(&self, digest: [u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::signing_only();
        let sig = secp.sign_ecdsa_recoverable(&Message::from_digest(digest), &self.secret);
        let (recid, compact) = sig.serialize_compact();
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&compact);
        out.push(27 + recid.to_i32() as u8);
        out
    }

    pub fn sign_detached(&self, message: &[u8]) -> Vec<u8> {
        self.sign_digest(detached_digest(message))
    }

    pub fn sign_typed<V: TypedValue>(&self, domain: &Domain, value: &V) -> Vec<u8> {
        self.sign_digest(structured_digest(
            domain,
            value.type_descriptor(),
            &value.encode_fields(),
        ))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

/// Why a signed timestamp/nonce pair was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayRejection {
    #[error("Nonce already used")]
    ReplayDetected,
    #[error("Timestamp outside the accepted window")]
    ExpiredWindow,
}

/// Accepted age and clock skew for signed timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayWindow {
    /// How far in the past `signed_at` may be (seconds)
    pub window_secs: u64,
    /// How far in the future `signed_at` may be (seconds)
    pub clock_skew_secs: u64,
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            clock_skew_secs: 60,
        }
    }
}

impl ReplayWindow {
    /// Accept `signed_at` in `[now - window, now + skew]` with an unseen nonce.
    ///
    /// `nonce_seen` is looked up by the caller for the
    /// `(guardian_id, recovery_attempt_id)` pair.
    pub fn check(
        &self,
        signed_at: Timestamp,
        now: Timestamp,
        nonce_seen: bool,
    ) -> Result<(), ReplayRejection> {
        let earliest = now.saturating_sub(self.window_secs);
        let latest = now.saturating_add(self.clock_skew_secs);
        if signed_at < earliest || signed_at > latest {
            log::warn!(
                "Signed timestamp {} outside [{}, {}]",
                signed_at,
                earliest,
                latest
            );
            return Err(ReplayRejection::ExpiredWindow);
        }
        if nonce_seen {
            log::warn!("Replayed nonce for message signed at {}", signed_at);
            return Err(ReplayRejection::ReplayDetected);
        }
        Ok(())
    }
}

/// Boolean form of [`ReplayWindow::check`].
pub fn check_replay(
    nonce_seen: bool,
    signed_at: Timestamp,
    now: Timestamp,
    window: &ReplayWindow,
) -> bool {
    window.check(signed_at, now, nonce_seen).is_ok()
}
