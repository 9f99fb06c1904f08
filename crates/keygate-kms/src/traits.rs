//! KeyService trait: the abstract interface to a remote key-management service.
//!
//! The gateway only ever talks to this trait. [`MemoryKms`](crate::MemoryKms)
//! implements it in-process; a network client would implement it over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use keygate_core::{DataKey, EncryptionContext, KeyHandle};

use crate::credentials::Credentials;
use crate::error::Result;

/// Lifecycle state of a key-encryption key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    Enabled,
    Disabled,
    PendingDeletion,
}

/// Response to `GenerateDataKey`.
#[derive(Debug)]
pub struct GeneratedDataKey {
    /// Full ARN of the key that wrapped the data key.
    pub key_id: KeyHandle,
    /// The plaintext data key. Zeroized on drop.
    pub plaintext: DataKey,
    /// The data key wrapped under the key-encryption key.
    pub ciphertext_blob: Bytes,
}

/// Response to `Encrypt`.
#[derive(Debug, Clone)]
pub struct EncryptedKey {
    /// Full ARN of the key that wrapped the data key.
    pub key_id: KeyHandle,
    /// The wrapped data key.
    pub ciphertext_blob: Bytes,
}

/// Response to `Decrypt`.
#[derive(Debug)]
pub struct DecryptedKey {
    /// Full ARN of the key that unwrapped the data key.
    pub key_id: KeyHandle,
    /// The plaintext data key. Zeroized on drop.
    pub plaintext: DataKey,
}

/// Response to `DescribeKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub key_id: String,
    pub arn: KeyHandle,
    pub region: String,
    pub state: KeyState,
    pub description: String,
}

/// A client of a remote key-management service, acting as one principal in
/// one region.
///
/// Every call is a suspension point. Dropping a returned future abandons the
/// request.
#[async_trait]
pub trait KeyService: Send + Sync {
    /// The region this client targets.
    fn region(&self) -> &str;

    /// Generate a fresh data key and return it in plaintext and wrapped form.
    ///
    /// The context is bound as additional authenticated data to the wrapped
    /// form and must be presented again to decrypt it.
    async fn generate_data_key(
        &self,
        key: &KeyHandle,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey>;

    /// Wrap caller-supplied key material under the key-encryption key.
    async fn encrypt(
        &self,
        key: &KeyHandle,
        plaintext: &DataKey,
        context: &EncryptionContext,
    ) -> Result<EncryptedKey>;

    /// Unwrap a data key previously wrapped under `key`.
    async fn decrypt(
        &self,
        key: &KeyHandle,
        ciphertext_blob: &[u8],
        context: &EncryptionContext,
    ) -> Result<DecryptedKey>;

    /// Look up a key's metadata.
    async fn describe_key(&self, key: &KeyHandle) -> Result<KeyMetadata>;
}

/// Builds key service clients that act with temporary credentials.
pub trait KeyServiceConnector: Send + Sync {
    /// A client acting as the credentials' principal in `region`.
    fn connect(&self, credentials: &Credentials, region: &str) -> Result<Arc<dyn KeyService>>;
}
