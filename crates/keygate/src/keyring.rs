//! Keyrings: protect one data key per message with a remote key.
//!
//! A keyring holds an immutable key handle and a key service client. It
//! never caches plaintext data keys; every message gets a fresh one.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use keygate_core::{DataKey, EncryptionContext, KeyHandle};
use keygate_kms::KeyService;

use crate::error::{ErrorKind, GatewayError, Result};
use crate::retry::RetryPolicy;

/// Provider id recorded for data keys wrapped by a key service.
pub const PROVIDER_ID: &str = "kms";

/// A data key in wrapped form, as stored in a message.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedDataKey {
    /// Which kind of keyring wrapped the key.
    pub provider_id: String,
    /// Full identifier of the wrapping key, as reported by the service.
    pub key_id: String,
    /// The wrapped key.
    pub blob: Bytes,
}

impl fmt::Debug for EncryptedDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedDataKey")
            .field("provider_id", &self.provider_id)
            .field("key_id", &self.key_id)
            .field("blob_len", &self.blob.len())
            .finish()
    }
}

/// Produces and recovers per-message data keys.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// The key-encryption key this keyring uses.
    fn key_handle(&self) -> &KeyHandle;

    /// Generate a fresh data key, returning it in plaintext and wrapped form.
    async fn generate_and_wrap(
        &self,
        context: &EncryptionContext,
    ) -> Result<(DataKey, EncryptedDataKey)>;

    /// Recover the plaintext data key from its wrapped form.
    async fn unwrap_data_key(
        &self,
        encrypted: &EncryptedDataKey,
        context: &EncryptionContext,
    ) -> Result<DataKey>;
}

/// A keyring backed by a remote key service.
///
/// Shareable across tasks: the handle is immutable and the client is
/// behind an `Arc`.
#[derive(Clone)]
pub struct KmsKeyring {
    handle: KeyHandle,
    client: Arc<dyn KeyService>,
    retry: RetryPolicy,
}

impl KmsKeyring {
    /// Create a keyring for `key_handle`.
    ///
    /// Fails with `Configuration` if the handle is empty or malformed, and
    /// with `InvalidKeyHandle` if it names a key in a region other than the
    /// client's. Neither check contacts the service.
    pub fn new(key_handle: &str, client: Arc<dyn KeyService>) -> Result<Self> {
        if key_handle.trim().is_empty() {
            return Err(GatewayError::Configuration("key handle is empty".into()));
        }
        let handle = KeyHandle::parse(key_handle)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        if let Some(region) = handle.region() {
            if region != client.region() {
                return Err(GatewayError::InvalidKeyHandle(format!(
                    "{handle} is in {region}, client is in {}",
                    client.region()
                )));
            }
        }

        Ok(Self {
            handle,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The client's region.
    pub fn region(&self) -> &str {
        self.client.region()
    }

    /// Wrap caller-supplied key material with the remote `Encrypt` call.
    pub async fn wrap_existing(
        &self,
        data_key: &DataKey,
        context: &EncryptionContext,
    ) -> Result<EncryptedDataKey> {
        let client = self.client.as_ref();
        let handle = &self.handle;
        debug!(key = %handle, "Encrypt");

        let response = self
            .retry
            .run("Encrypt", move || async move {
                client
                    .encrypt(handle, data_key, context)
                    .await
                    .map_err(GatewayError::from)
            })
            .await
            .map_err(|e| log_failure("Encrypt", handle, e))?;

        Ok(EncryptedDataKey {
            provider_id: PROVIDER_ID.into(),
            key_id: response.key_id.to_string(),
            blob: response.ciphertext_blob,
        })
    }
}

#[async_trait]
impl Keyring for KmsKeyring {
    fn key_handle(&self) -> &KeyHandle {
        &self.handle
    }

    async fn generate_and_wrap(
        &self,
        context: &EncryptionContext,
    ) -> Result<(DataKey, EncryptedDataKey)> {
        let client = self.client.as_ref();
        let handle = &self.handle;
        debug!(key = %handle, "GenerateDataKey");

        let generated = self
            .retry
            .run("GenerateDataKey", move || async move {
                client
                    .generate_data_key(handle, context)
                    .await
                    .map_err(GatewayError::from)
            })
            .await
            .map_err(|e| log_failure("GenerateDataKey", handle, e))?;

        let encrypted = EncryptedDataKey {
            provider_id: PROVIDER_ID.into(),
            key_id: generated.key_id.to_string(),
            blob: generated.ciphertext_blob,
        };
        Ok((generated.plaintext, encrypted))
    }

    async fn unwrap_data_key(
        &self,
        encrypted: &EncryptedDataKey,
        context: &EncryptionContext,
    ) -> Result<DataKey> {
        if encrypted.provider_id != PROVIDER_ID {
            return Err(GatewayError::Integrity(format!(
                "data key was wrapped by provider {:?}",
                encrypted.provider_id
            )));
        }

        let client = self.client.as_ref();
        let handle = &self.handle;
        let blob = encrypted.blob.as_ref();
        debug!(key = %handle, "Decrypt");

        let decrypted = self
            .retry
            .run("Decrypt", move || async move {
                client
                    .decrypt(handle, blob, context)
                    .await
                    .map_err(GatewayError::from)
            })
            .await
            .map_err(|e| log_failure("Decrypt", handle, e))?;

        Ok(decrypted.plaintext)
    }
}

impl fmt::Debug for KmsKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsKeyring")
            .field("handle", &self.handle)
            .field("region", &self.client.region())
            .field("retry", &self.retry)
            .finish()
    }
}

fn log_failure(operation: &str, handle: &KeyHandle, err: GatewayError) -> GatewayError {
    match err.kind() {
        ErrorKind::AuthorizationDenied | ErrorKind::Transport => {
            warn!(operation, key = %handle, code = err.code().unwrap_or("unknown"), "key service call failed");
        }
        _ => debug!(operation, key = %handle, error = %err, "key service call failed"),
    }
    err
}
