//! Temporary credentials and role assumption.
//!
//! A caller assumes a role to obtain short-lived credentials, then builds a
//! key service client acting as that role. Credentials are a scoped resource:
//! they expire, and the secret half is zeroized on drop.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use tokio::time::Instant;
use zeroize::{Zeroize, ZeroizeOnDrop};

use keygate_core::Principal;

use crate::error::Result;

/// Default lifetime of assumed-role credentials.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);

/// Secret access key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(String);

impl SecretKey {
    /// Generate a random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 30];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);
        bytes.zeroize();
        Self(secret)
    }

    /// Expose the secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Temporary credentials for an assumed role.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// The role these credentials act as.
    pub principal: Principal,
    /// Session name recorded by the service.
    pub session_name: String,
    pub access_key_id: String,
    pub secret_access_key: SecretKey,
    pub session_token: String,
    /// When the credentials stop working.
    pub expires_at: Instant,
}

impl Credentials {
    /// Whether the credentials have expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Session name used when `caller` assumes a role.
///
/// The resource part of the caller's identifier: `role/ci-runner` becomes
/// `ci-runner`.
pub fn session_name_for(caller: &Principal) -> String {
    caller.name().to_string()
}

/// Issues temporary credentials for roles.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The identity asking to assume roles.
    fn caller(&self) -> &Principal;

    /// Assume `role` for `duration`.
    ///
    /// Fails with `AccessDenied` unless the caller is one of the role's
    /// trusted principals, and `NotFound` if the role does not exist.
    async fn assume_role_for(&self, role: &Principal, duration: Duration) -> Result<Credentials>;

    /// Assume `role` for the default session duration.
    async fn assume_role(&self, role: &Principal) -> Result<Credentials> {
        self.assume_role_for(role, DEFAULT_SESSION_DURATION).await
    }
}
