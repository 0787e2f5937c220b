//! Heirloom Shamir Module
//!
//! Threshold secret sharing for vault secrets (seed phrases, key material).
//!
//! A secret is wrapped in a tagged payload and split byte-wise over GF(256).
//! Any `t` of the `n` shares reconstruct it. Fewer than `t` shares, or a
//! corrupted share, produce a payload whose tag does not verify, which
//! surfaces as [`ShamirError::CorruptShare`] rather than a silently wrong
//! secret.
//!
//! # Example
//!
//! ```
//! use heirloom_shamir::{reconstruct_secret, split_secret};
//!
//! let secret = b"legal winner thank year wave sausage worth useful legal winner thank yellow";
//!
//! // 2-of-3
//! let shares = split_secret(secret, 3, 2).unwrap();
//!
//! let recovered = reconstruct_secret(&shares[1..3]).unwrap();
//! assert_eq!(recovered.as_slice(), secret);
//! ```

pub mod gf256;
pub mod scheme;

pub use scheme::{reconstruct_secret, split_secret, verify_split, Share, PAYLOAD_OVERHEAD};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest share count GF(256) supports (x = 1..=255).
pub const MAX_SHARES: u8 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShamirError {
    #[error("Invalid scheme parameters: {0}")]
    InvalidParameters(String),
    #[error("Not enough shares to reconstruct")]
    InsufficientShares,
    #[error("Reconstructed secret failed its integrity tag")]
    CorruptShare,
    #[error("Invalid share: {0}")]
    InvalidShare(String),
}

/// Shape of a t-of-n split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeConfig {
    /// Minimum shares needed to reconstruct (t)
    pub threshold: u8,
    /// Total shares to generate (n)
    pub total: u8,
}

impl SchemeConfig {
    pub fn new(threshold: u8, total: u8) -> Self {
        Self { threshold, total }
    }

    pub fn two_of_three() -> Self {
        Self::new(2, 3)
    }

    pub fn three_of_five() -> Self {
        Self::new(3, 5)
    }

    /// Reject `t < 1` and `t > n`. `n` is a `u8`, so it can never exceed
    /// [`MAX_SHARES`].
    pub fn validate(&self) -> Result<(), ShamirError> {
        if self.threshold < 1 {
            return Err(ShamirError::InvalidParameters(
                "threshold must be at least 1".into(),
            ));
        }
        if self.threshold > self.total {
            return Err(ShamirError::InvalidParameters(format!(
                "threshold {} exceeds share count {}",
                self.threshold, self.total
            )));
        }
        Ok(())
    }

    /// Build from wider integers, rejecting counts the field cannot hold.
    pub fn from_counts(threshold: usize, total: usize) -> Result<Self, ShamirError> {
        let bound = MAX_SHARES as usize;
        if total > bound || threshold > bound {
            return Err(ShamirError::InvalidParameters(format!(
                "share count {} exceeds field bound {}",
                total, bound
            )));
        }
        let config = Self::new(threshold as u8, total as u8);
        config.validate()?;
        Ok(config)
    }
}

impl std::fmt::Display for SchemeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-of-{}", self.threshold, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_validation() {
        assert!(SchemeConfig::two_of_three().validate().is_ok());
        assert!(SchemeConfig::three_of_five().validate().is_ok());
        assert!(SchemeConfig::new(1, 1).validate().is_ok());
        assert!(SchemeConfig::new(255, 255).validate().is_ok());

        assert!(SchemeConfig::new(0, 3).validate().is_err());
        assert!(SchemeConfig::new(4, 3).validate().is_err());
        assert!(SchemeConfig::new(0, 0).validate().is_err());
    }

    #[test]
    fn test_from_counts_field_bound() {
        assert_eq!(
            SchemeConfig::from_counts(2, 3).unwrap(),
            SchemeConfig::two_of_three()
        );
        assert!(SchemeConfig::from_counts(2, 256).is_err());
        assert!(SchemeConfig::from_counts(300, 300).is_err());
        assert!(SchemeConfig::from_counts(4, 3).is_err());
    }

    #[test]
    fn test_scheme_display() {
        assert_eq!(SchemeConfig::three_of_five().to_string(), "3-of-5");
    }
}
