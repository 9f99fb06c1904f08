//! Error types for the gateway.
//!
//! Every failure a caller can see is one of the [`ErrorKind`]s. Local
//! failures are raised before any remote call; remote failures are
//! classified once, in `From<KeyServiceError>`, and never reclassified.

use std::fmt;

use keygate_core::CoreError;
use keygate_kms::KeyServiceError;
use thiserror::Error;

/// Discriminant of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    AuthorizationDenied,
    Transport,
    InvalidKeyHandle,
    Integrity,
    ContextMismatch,
    EncryptionFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors that can occur during gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad local configuration: malformed key handle, invalid context,
    /// unreadable config file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The key service refused the caller.
    #[error("authorization denied ({code}): {message}")]
    AuthorizationDenied { code: &'static str, message: String },

    /// The key service could not be reached or failed transiently.
    #[error("transport error ({code}): {message}")]
    Transport { code: &'static str, message: String },

    /// The key does not exist, is in another region, or is not usable.
    #[error("invalid key handle: {0}")]
    InvalidKeyHandle(String),

    /// The message, wrapped key or commitment failed verification.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// The supplied encryption context differs from the one in the message.
    #[error("encryption context mismatch on keys {keys:?}")]
    ContextMismatch { keys: Vec<String> },

    /// Encryption could not produce a valid message.
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),
}

impl GatewayError {
    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Configuration(_) => ErrorKind::Configuration,
            GatewayError::AuthorizationDenied { .. } => ErrorKind::AuthorizationDenied,
            GatewayError::Transport { .. } => ErrorKind::Transport,
            GatewayError::InvalidKeyHandle(_) => ErrorKind::InvalidKeyHandle,
            GatewayError::Integrity(_) => ErrorKind::Integrity,
            GatewayError::ContextMismatch { .. } => ErrorKind::ContextMismatch,
            GatewayError::EncryptionFailure(_) => ErrorKind::EncryptionFailure,
        }
    }

    /// The remote error code, for errors that came from the key service.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            GatewayError::AuthorizationDenied { code, .. } | GatewayError::Transport { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// Only transport faults are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport { .. })
    }
}

impl From<KeyServiceError> for GatewayError {
    fn from(err: KeyServiceError) -> Self {
        let code = err.code();
        match err {
            KeyServiceError::AccessDenied(message) | KeyServiceError::ExpiredToken(message) => {
                GatewayError::AuthorizationDenied { code, message }
            }
            KeyServiceError::Throttling(message)
            | KeyServiceError::Internal(message)
            | KeyServiceError::DependencyTimeout(message) => GatewayError::Transport { code, message },
            KeyServiceError::NotFound(message) | KeyServiceError::Disabled(message) => {
                GatewayError::InvalidKeyHandle(format!("{code}: {message}"))
            }
            KeyServiceError::InvalidCiphertext(message) | KeyServiceError::IncorrectKey(message) => {
                GatewayError::Integrity(format!("{code}: {message}"))
            }
            KeyServiceError::Validation(message) => {
                GatewayError::Configuration(format!("{code}: {message}"))
            }
        }
    }
}

impl From<CoreError> for GatewayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidKeyHandle(_)
            | CoreError::InvalidPrincipal(_)
            | CoreError::InvalidContext(_) => GatewayError::Configuration(err.to_string()),
            CoreError::EncryptionFailed(_) | CoreError::EncodingError(_) => {
                GatewayError::EncryptionFailure(err.to_string())
            }
            CoreError::InvalidKeyLength { .. }
            | CoreError::UnsupportedSuite(_)
            | CoreError::DecryptionFailed
            | CoreError::CommitmentMismatch
            | CoreError::DecodingError(_) => GatewayError::Integrity(err.to_string()),
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_are_not_transport() {
        let denied: GatewayError = KeyServiceError::AccessDenied("no".into()).into();
        assert_eq!(denied.kind(), ErrorKind::AuthorizationDenied);
        assert_eq!(denied.code(), Some("AccessDeniedException"));
        assert!(!denied.is_retryable());

        let expired: GatewayError = KeyServiceError::ExpiredToken("old".into()).into();
        assert_eq!(expired.kind(), ErrorKind::AuthorizationDenied);
        assert_eq!(expired.code(), Some("ExpiredTokenException"));
    }

    #[test]
    fn test_transport_faults_retryable() {
        for err in [
            KeyServiceError::Throttling("a".into()),
            KeyServiceError::Internal("b".into()),
            KeyServiceError::DependencyTimeout("c".into()),
        ] {
            let gw: GatewayError = err.into();
            assert_eq!(gw.kind(), ErrorKind::Transport);
            assert!(gw.is_retryable());
        }
    }

    #[test]
    fn test_remote_classification() {
        let cases = [
            (KeyServiceError::NotFound("x".into()), ErrorKind::InvalidKeyHandle),
            (KeyServiceError::Disabled("x".into()), ErrorKind::InvalidKeyHandle),
            (KeyServiceError::InvalidCiphertext("x".into()), ErrorKind::Integrity),
            (KeyServiceError::IncorrectKey("x".into()), ErrorKind::Integrity),
            (KeyServiceError::Validation("x".into()), ErrorKind::Configuration),
        ];
        for (err, kind) in cases {
            assert_eq!(GatewayError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_core_classification() {
        assert_eq!(
            GatewayError::from(CoreError::CommitmentMismatch).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            GatewayError::from(CoreError::InvalidContext("k".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            GatewayError::from(CoreError::EncryptionFailed("x".into())).kind(),
            ErrorKind::EncryptionFailure
        );
    }
}
