//! The algorithm suite carried by every message.
//!
//! Keygate speaks exactly one suite and it is key-committing. The suite id
//! is written into each message so a reader never needs a side channel to
//! pick it, but there is no negotiation: an unknown id is a parse error.

use serde::{Deserialize, Serialize};

use crate::crypto::{DATA_KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{CoreError, Result};

/// Supported algorithm suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum AlgorithmSuite {
    /// ChaCha20-Poly1305 content encryption, BLAKE3 key derivation and
    /// BLAKE3 key commitment.
    ChaCha20Poly1305Blake3Commit = 0x0001,
}

impl AlgorithmSuite {
    /// The suite used for every new message.
    pub const COMMITTING: Self = Self::ChaCha20Poly1305Blake3Commit;

    /// Numeric id written to the wire.
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Resolve a wire id.
    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            0x0001 => Ok(Self::ChaCha20Poly1305Blake3Commit),
            other => Err(CoreError::UnsupportedSuite(other)),
        }
    }

    /// Whether ciphertexts under this suite commit to their key.
    pub const fn is_committing(self) -> bool {
        match self {
            Self::ChaCha20Poly1305Blake3Commit => true,
        }
    }

    /// Data key length in bytes.
    pub const fn data_key_len(self) -> usize {
        DATA_KEY_LEN
    }

    /// Nonce length in bytes.
    pub const fn nonce_len(self) -> usize {
        NONCE_LEN
    }

    /// Authentication tag length in bytes.
    pub const fn tag_len(self) -> usize {
        TAG_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_id_roundtrip() {
        let suite = AlgorithmSuite::COMMITTING;
        assert_eq!(AlgorithmSuite::from_id(suite.id()).unwrap(), suite);
    }

    #[test]
    fn test_default_suite_commits() {
        assert!(AlgorithmSuite::COMMITTING.is_committing());
    }

    #[test]
    fn test_unknown_suite_rejected() {
        assert!(matches!(
            AlgorithmSuite::from_id(0x0014),
            Err(CoreError::UnsupportedSuite(0x0014))
        ));
        assert!(AlgorithmSuite::from_id(0).is_err());
    }
}
