//! # Keygate Core
//!
//! Pure primitives for Keygate: key handles, principals, encryption context,
//! data keys and the committing key schedule.
//!
//! This crate contains no I/O and no remote calls. It is pure computation
//! over the values that cross the key-service boundary.
//!
//! ## Key Types
//!
//! - [`KeyHandle`] - Identifier of a remote key-encryption key
//! - [`Principal`] - The identity asking for an operation
//! - [`EncryptionContext`] - Authenticated, non-secret message metadata
//! - [`DataKey`] - A per-message symmetric key, zeroized on drop
//! - [`AlgorithmSuite`] - The single committing suite Keygate speaks
//!
//! ## Canonicalization
//!
//! Encryption contexts and message headers are encoded using deterministic
//! CBOR. See [`canonical`] module.

pub mod canonical;
pub mod context;
pub mod crypto;
pub mod error;
pub mod suite;
pub mod types;

pub use canonical::{canonical_encode, decode_canonical};
pub use context::EncryptionContext;
pub use crypto::{
    derive_message_keys, Commitment, ContentKey, DataKey, EncryptionNonce, MessageDigest, MessageId,
    DATA_KEY_LEN, NONCE_LEN, TAG_LEN,
};
pub use error::{CoreError, Result};
pub use suite::AlgorithmSuite;
pub use types::{KeyHandle, KeyResource, Principal};
