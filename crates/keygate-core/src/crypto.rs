//! Cryptographic primitives for Keygate.
//!
//! Data keys, the ChaCha20-Poly1305 content key, and the BLAKE3 key schedule
//! that derives a content key and a key commitment from one data key.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

/// Length of a data key in bytes.
pub const DATA_KEY_LEN: usize = 32;

/// Length of a ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Length of the Poly1305 tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Domain-separation strings for the key schedule.
mod domains {
    pub const CONTENT_KEY: &str = "keygate/v1 content encryption";
    pub const COMMITMENT: &str = "keygate/v1 key commitment";
    pub const MESSAGE_DIGEST: &str = "keygate/v1 message digest";
}

/// A per-message symmetric data key in plaintext form.
///
/// Lives for exactly one encrypt or decrypt call and is zeroized when
/// dropped, on every exit path. Never serialized, never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; DATA_KEY_LEN]);

impl DataKey {
    /// Generate a fresh random data key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; DATA_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Copy key material out of a buffer, e.g. a key-service response.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DATA_KEY_LEN {
            return Err(CoreError::InvalidKeyLength {
                expected: DATA_KEY_LEN,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; DATA_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Borrow the raw key material.
    pub fn as_bytes(&self) -> &[u8; DATA_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// A 256-bit ChaCha20-Poly1305 key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce, aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::EncryptionFailed(e.to_string()))?;

        cipher
            .encrypt(Nonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
            .map_err(|e| CoreError::EncryptionFailed(e.to_string()))
    }

    /// Verify and decrypt. Nothing is returned unless the tag verifies.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce, aad: &[u8]) -> Result<Vec<u8>> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CoreError::DecryptionFailed)?;

        cipher
            .decrypt(Nonce::from_slice(&nonce.0), Payload { msg: ciphertext, aad })
            .map_err(|_| CoreError::DecryptionFailed)
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey([REDACTED])")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; NONCE_LEN]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Random per-message identifier, mixed into the key schedule.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub [u8; 32]);

impl MessageId {
    /// Generate a new random message id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", &self.to_hex()[..16])
    }
}

/// Key commitment: binds a ciphertext to exactly one data key.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Constant-time comparison against an expected commitment.
    pub fn verify(&self, expected: &Commitment) -> Result<()> {
        if blake3::Hash::from(self.0) == blake3::Hash::from(expected.0) {
            Ok(())
        } else {
            Err(CoreError::CommitmentMismatch)
        }
    }
}

impl PartialEq for Commitment {
    fn eq(&self, other: &Self) -> bool {
        self.verify(other).is_ok()
    }
}

impl Eq for Commitment {}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", &hex::encode(self.0)[..16])
    }
}

/// Unkeyed digest over a serialized message body.
///
/// Catches corruption at parse time, before any remote call. It is not a
/// substitute for the commitment and tag: anyone can recompute it.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct MessageDigest(pub [u8; 32]);

impl MessageDigest {
    /// Digest `body`.
    pub fn compute(body: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(domains::MESSAGE_DIGEST);
        hasher.update(body);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check `body` hashes to this digest.
    pub fn verify(&self, body: &[u8]) -> bool {
        blake3::Hash::from(self.0) == blake3::Hash::from(Self::compute(body).0)
    }
}

impl fmt::Debug for MessageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageDigest({})", &hex::encode(self.0)[..16])
    }
}

/// Derive the content key and key commitment for one message.
///
/// Both outputs come from the same data key and message id under different
/// BLAKE3 derive-key contexts, so the commitment reveals nothing about the
/// content key and a message id is never reused with the same key stream.
pub fn derive_message_keys(data_key: &DataKey, message_id: &MessageId) -> (ContentKey, Commitment) {
    let mut content = blake3::Hasher::new_derive_key(domains::CONTENT_KEY);
    content.update(data_key.as_bytes());
    content.update(message_id.as_bytes());

    let mut commit = blake3::Hasher::new_derive_key(domains::COMMITMENT);
    commit.update(data_key.as_bytes());
    commit.update(message_id.as_bytes());

    (
        ContentKey(*content.finalize().as_bytes()),
        Commitment(*commit.finalize().as_bytes()),
    )
}
