//! Heirloom Core
//!
//! Shared records, signed message formats and the capabilities the rest of
//! the system is written against.
//!
//! # Capabilities
//!
//! - [`store::VaultStore`]: transactional persistence
//! - [`crypto::FragmentCipher`]: fragment encryption at rest
//! - [`clock::Clock`]: current time
//!
//! Nothing in this crate holds process-wide state; callers inject
//! implementations.
//!
//! # Signatures
//!
//! Owners sign detached [`messages::OwnerMessage`]s. Guardians sign
//! [`messages::AttestationPayload`]s under a [`messages::Domain`] bound to the
//! deployment and vault, so an attestation never verifies anywhere else.

pub mod clock;
pub mod crypto;
pub mod messages;
pub mod signature;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{AesGcmFragmentCipher, CryptoError, FragmentCipher};
pub use messages::{AttestationPayload, Domain, OwnerAction, OwnerMessage, TypedValue};
pub use signature::{
    check_replay, recover_signer, verify_detached, verify_structured, verify_typed,
    ReplayRejection, ReplayWindow, SignatureError, SignerId, SigningKey,
};
pub use store::{MemoryStore, StoreError, StoreTx, VaultStore};
pub use types::*;
