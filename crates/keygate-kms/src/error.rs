//! Error types for the key service boundary.
//!
//! Variants mirror the error classes a remote key service reports. Each has
//! a stable [`code`](KeyServiceError::code) so callers can classify a failure
//! without parsing messages.

use thiserror::Error;

/// Errors returned by a [`KeyService`](crate::KeyService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyServiceError {
    /// The caller's policy does not allow the action.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The key, alias or role does not exist (in this region).
    #[error("not found: {0}")]
    NotFound(String),

    /// The key is disabled or pending deletion.
    #[error("key disabled: {0}")]
    Disabled(String),

    /// The ciphertext blob failed verification.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// The ciphertext blob was produced under a different key.
    #[error("incorrect key: {0}")]
    IncorrectKey(String),

    /// The caller's temporary credentials have expired.
    #[error("expired token: {0}")]
    ExpiredToken(String),

    /// Request rate exceeded.
    #[error("throttled: {0}")]
    Throttling(String),

    /// Internal service fault.
    #[error("internal error: {0}")]
    Internal(String),

    /// The service did not respond in time.
    #[error("dependency timeout: {0}")]
    DependencyTimeout(String),

    /// The request was malformed.
    #[error("validation error: {0}")]
    Validation(String),
}

impl KeyServiceError {
    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            KeyServiceError::AccessDenied(_) => "AccessDeniedException",
            KeyServiceError::NotFound(_) => "NotFoundException",
            KeyServiceError::Disabled(_) => "DisabledException",
            KeyServiceError::InvalidCiphertext(_) => "InvalidCiphertextException",
            KeyServiceError::IncorrectKey(_) => "IncorrectKeyException",
            KeyServiceError::ExpiredToken(_) => "ExpiredTokenException",
            KeyServiceError::Throttling(_) => "ThrottlingException",
            KeyServiceError::Internal(_) => "KMSInternalException",
            KeyServiceError::DependencyTimeout(_) => "DependencyTimeoutException",
            KeyServiceError::Validation(_) => "ValidationException",
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        match self {
            KeyServiceError::AccessDenied(m)
            | KeyServiceError::NotFound(m)
            | KeyServiceError::Disabled(m)
            | KeyServiceError::InvalidCiphertext(m)
            | KeyServiceError::IncorrectKey(m)
            | KeyServiceError::ExpiredToken(m)
            | KeyServiceError::Throttling(m)
            | KeyServiceError::Internal(m)
            | KeyServiceError::DependencyTimeout(m)
            | KeyServiceError::Validation(m) => m,
        }
    }

    /// Whether a later identical request may succeed.
    ///
    /// Only transport-class faults qualify. Denials and integrity failures
    /// never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeyServiceError::Throttling(_)
                | KeyServiceError::Internal(_)
                | KeyServiceError::DependencyTimeout(_)
        )
    }
}

/// Result type for key service operations.
pub type Result<T> = std::result::Result<T, KeyServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            KeyServiceError::AccessDenied(String::new()),
            KeyServiceError::NotFound(String::new()),
            KeyServiceError::Disabled(String::new()),
            KeyServiceError::InvalidCiphertext(String::new()),
            KeyServiceError::IncorrectKey(String::new()),
            KeyServiceError::ExpiredToken(String::new()),
            KeyServiceError::Throttling(String::new()),
            KeyServiceError::Internal(String::new()),
            KeyServiceError::DependencyTimeout(String::new()),
            KeyServiceError::Validation(String::new()),
        ];
        let mut codes: Vec<_> = all.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_only_transport_faults_retry() {
        assert!(KeyServiceError::Throttling("slow down".into()).is_retryable());
        assert!(KeyServiceError::Internal("oops".into()).is_retryable());
        assert!(KeyServiceError::DependencyTimeout("late".into()).is_retryable());

        assert!(!KeyServiceError::AccessDenied("no".into()).is_retryable());
        assert!(!KeyServiceError::ExpiredToken("old".into()).is_retryable());
        assert!(!KeyServiceError::InvalidCiphertext("bad".into()).is_retryable());
    }

    #[test]
    fn test_message_accessor() {
        let err = KeyServiceError::AccessDenied("User: x is not authorized".into());
        assert_eq!(err.message(), "User: x is not authorized");
        assert_eq!(err.code(), "AccessDeniedException");
    }
}
