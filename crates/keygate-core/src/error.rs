//! Error types for Keygate Core.

use thiserror::Error;

/// Core errors raised while building or parsing primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key handle: {0}")]
    InvalidKeyHandle(String),

    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("invalid encryption context: {0}")]
    InvalidContext(String),

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("unsupported algorithm suite: {0:#06x}")]
    UnsupportedSuite(u16),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD tag verification failed. The underlying error is opaque.
    #[error("authenticated decryption failed")]
    DecryptionFailed,

    #[error("key commitment does not match")]
    CommitmentMismatch,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
