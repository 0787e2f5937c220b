//! Fragment encryption at rest
//!
//! Shares are never persisted in the clear. The core only depends on the
//! [`FragmentCipher`] capability; [`AesGcmFragmentCipher`] is the default
//! implementation.
//!
//! # Blob format
//!
//! ```text
//! [nonce (12 bytes)][AES-256-GCM(index || share value) + tag (16 bytes)]
//! ```
//!
//! The vault id and share index are bound as associated data, so a blob moved
//! to another vault or slot fails authentication.

use crate::types::{Fragment, VaultId};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use heirloom_shamir::Share;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const AAD_DOMAIN: &[u8] = b"heirloom/fragment/v1";

/// Length of a fragment key.
pub const FRAGMENT_KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Invalid ciphertext format")]
    InvalidFormat,
}

/// Seals shares into fragment blobs and opens them again.
pub trait FragmentCipher: Send + Sync {
    fn seal(&self, vault_id: &VaultId, share: &Share) -> Result<Vec<u8>, CryptoError>;
    fn open(&self, fragment: &Fragment) -> Result<Share, CryptoError>;
}

fn associated_data(vault_id: &VaultId, share_index: u8) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + vault_id.as_str().len() + 1);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.extend_from_slice(vault_id.as_str().as_bytes());
    aad.push(share_index);
    aad
}

/// AES-256-GCM with a single deployment key.
pub struct AesGcmFragmentCipher {
    key: Zeroizing<[u8; FRAGMENT_KEY_LEN]>,
}

impl AesGcmFragmentCipher {
    pub fn new(key: [u8; FRAGMENT_KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Fresh random key (tests, first-run provisioning).
    pub fn generate() -> Self {
        let mut key = [0u8; FRAGMENT_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_key.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        if bytes.len() != FRAGMENT_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                FRAGMENT_KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = [0u8; FRAGMENT_KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }
}

impl FragmentCipher for AesGcmFragmentCipher {
    fn seal(&self, vault_id: &VaultId, share: &Share) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let plaintext = Zeroizing::new(share.to_bytes());
        let aad = associated_data(vault_id, share.index);

        let ciphertext = self
            .cipher()
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_slice(),
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn open(&self, fragment: &Fragment) -> Result<Share, CryptoError> {
        let blob = &fragment.encrypted_share_blob;
        if blob.len() < NONCE_LEN + GCM_TAG_LEN + 2 {
            return Err(CryptoError::InvalidFormat);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let aad = associated_data(&fragment.vault_id, fragment.share_index);

        let plaintext = Zeroizing::new(
            self.cipher()
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: &aad,
                    },
                )
                .map_err(|_| {
                    CryptoError::DecryptionFailed("wrong key or tampered fragment".to_string())
                })?,
        );

        let share = Share::from_bytes(&plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        if share.index != fragment.share_index {
            return Err(CryptoError::DecryptionFailed(format!(
                "share index {} does not match fragment slot {}",
                share.index, fragment.share_index
            )));
        }
        Ok(share)
    }
}
