//! Split and reconstruct tagged secrets
//!
//! The secret is never shared directly. It is first wrapped as
//!
//! ```text
//! [version (1)] [secret (len)] [tag (16)]
//! ```
//!
//! where `tag = SHA-256(TAG_DOMAIN || len_be32 || secret)[..16]`. Every byte of
//! that payload is shared with its own random polynomial of degree `t - 1`.
//! Interpolating from fewer than `t` shares (or from a corrupt share) lands on
//! a pseudo-random payload whose tag does not verify, so reconstruction fails
//! loudly instead of returning a wrong secret.

use crate::gf256;
use crate::{SchemeConfig, ShamirError, MAX_SHARES};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const PAYLOAD_VERSION: u8 = 1;
const TAG_LEN: usize = 16;
const TAG_DOMAIN: &[u8] = b"heirloom/share-tag/v1";

/// Bytes added around the secret by the payload encoding.
pub const PAYLOAD_OVERHEAD: usize = 1 + TAG_LEN;

/// One share of a tagged secret payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    /// x-coordinate, 1..=255 (never 0)
    pub index: u8,
    /// y-values, one per payload byte
    pub value: Vec<u8>,
}

impl Share {
    pub fn new(index: u8, value: Vec<u8>) -> Self {
        Self { index, value }
    }

    /// Length of the secret this share encodes.
    pub fn secret_len(&self) -> usize {
        self.value.len().saturating_sub(PAYLOAD_OVERHEAD)
    }

    /// Serialize as `index || value`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.value.len());
        out.push(self.index);
        out.extend_from_slice(&self.value);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShamirError> {
        match bytes.split_first() {
            Some((&0, _)) => Err(ShamirError::InvalidShare("share index 0".into())),
            Some((&index, value)) if value.len() > PAYLOAD_OVERHEAD => {
                Ok(Self::new(index, value.to_vec()))
            }
            _ => Err(ShamirError::InvalidShare("share too short".into())),
        }
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("len", &self.value.len())
            .finish()
    }
}

fn tag(secret: &[u8]) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(TAG_DOMAIN);
    hasher.update((secret.len() as u32).to_be_bytes());
    hasher.update(secret);
    let digest = hasher.finalize();
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&digest[..TAG_LEN]);
    out
}

fn encode_payload(secret: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut payload = Zeroizing::new(Vec::with_capacity(secret.len() + PAYLOAD_OVERHEAD));
    payload.push(PAYLOAD_VERSION);
    payload.extend_from_slice(secret);
    payload.extend_from_slice(&tag(secret));
    payload
}

fn decode_payload(payload: &[u8]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    if payload.len() <= PAYLOAD_OVERHEAD || payload[0] != PAYLOAD_VERSION {
        return Err(ShamirError::CorruptShare);
    }
    let (body, stored_tag) = payload[1..].split_at(payload.len() - PAYLOAD_OVERHEAD);
    let expected = tag(body);
    let diff = expected
        .iter()
        .zip(stored_tag)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    if diff != 0 {
        return Err(ShamirError::CorruptShare);
    }
    Ok(Zeroizing::new(body.to_vec()))
}

/// Split `secret` into `total` shares, any `threshold` of which reconstruct it.
pub fn split_secret(secret: &[u8], total: u8, threshold: u8) -> Result<Vec<Share>, ShamirError> {
    SchemeConfig { threshold, total }.validate()?;
    if secret.is_empty() {
        return Err(ShamirError::InvalidParameters("secret is empty".into()));
    }
    if secret.len() > u32::MAX as usize - PAYLOAD_OVERHEAD {
        return Err(ShamirError::InvalidParameters("secret too large".into()));
    }

    let payload = encode_payload(secret);
    let mut rng = rand::thread_rng();
    let mut coefficients = Zeroizing::new(vec![0u8; threshold as usize]);
    let mut shares: Vec<Share> = (1..=total)
        .map(|x| Share::new(x, Vec::with_capacity(payload.len())))
        .collect();

    for &byte in payload.iter() {
        coefficients[0] = byte;
        rng.fill_bytes(&mut coefficients[1..]);
        for share in &mut shares {
            share.value.push(gf256::eval_poly(&coefficients, share.index));
        }
    }

    Ok(shares)
}

/// Reconstruct a secret from a set of shares.
///
/// The threshold is not needed: interpolation runs over every supplied share
/// and the embedded tag decides whether the result is the real secret.
pub fn reconstruct_secret(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    let Some(first) = shares.first() else {
        return Err(ShamirError::InsufficientShares);
    };
    if shares.len() > MAX_SHARES as usize {
        return Err(ShamirError::InvalidShare("more shares than the field allows".into()));
    }

    let payload_len = first.value.len();
    if payload_len <= PAYLOAD_OVERHEAD {
        return Err(ShamirError::InvalidShare("share too short".into()));
    }
    if shares.iter().any(|s| s.value.len() != payload_len) {
        return Err(ShamirError::InvalidShare("shares have different lengths".into()));
    }
    if shares.iter().any(|s| s.index == 0) {
        return Err(ShamirError::InvalidShare("share index 0".into()));
    }

    let mut xs: Vec<u8> = shares.iter().map(|s| s.index).collect();
    xs.sort_unstable();
    xs.dedup();
    if xs.len() != shares.len() {
        return Err(ShamirError::InvalidShare("duplicate share indices".into()));
    }

    let xs: Vec<u8> = shares.iter().map(|s| s.index).collect();
    let weights = gf256::basis_at_zero(&xs);

    let mut payload = Zeroizing::new(Vec::with_capacity(payload_len));
    for pos in 0..payload_len {
        payload.push(gf256::interpolate_with(
            &weights,
            shares.iter().map(|s| s.value[pos]),
        ));
    }

    decode_payload(&payload)
}

/// Check that a freshly generated share set reconstructs from both its first
/// and its last `threshold` shares.
pub fn verify_split(shares: &[Share], threshold: u8) -> Result<(), ShamirError> {
    let t = threshold as usize;
    if t == 0 || shares.len() < t {
        return Err(ShamirError::InsufficientShares);
    }
    let head = reconstruct_secret(&shares[..t])?;
    let tail = reconstruct_secret(&shares[shares.len() - t..])?;
    if head != tail {
        return Err(ShamirError::CorruptShare);
    }
    Ok(())
}
