//! The envelope encryption engine.
//!
//! One fresh data key per message, obtained from a [`Keyring`]. The data
//! key and the random message id feed the committing key schedule, which
//! yields the content key and a commitment. The content key encrypts the
//! payload with the message header as associated data.
//!
//! Decryption runs strictly in order:
//!
//! 1. compare the caller's context with the embedded one (no remote call)
//! 2. unwrap the data key, passing the embedded context to the key service
//! 3. re-derive and check the commitment
//! 4. verify the AEAD tag and release the plaintext
//!
//! Plaintext is only returned after every check has passed.

use std::collections::BTreeSet;

use tracing::debug;

use keygate_core::{
    derive_message_keys, AlgorithmSuite, EncryptionContext, EncryptionNonce, MessageId,
};

use crate::error::{GatewayError, Result};
use crate::keyring::Keyring;
use crate::message::Message;

/// Encrypt `plaintext` under a fresh data key from `keyring`.
///
/// `context` is authenticated and stored in the clear. A denial from the
/// key service propagates unchanged.
pub async fn encrypt<K>(plaintext: &[u8], keyring: &K, context: &EncryptionContext) -> Result<Message>
where
    K: Keyring + ?Sized,
{
    context.validate()?;

    let (data_key, encrypted_data_key) = keyring.generate_and_wrap(context).await?;

    let message_id = MessageId::generate();
    let nonce = EncryptionNonce::generate();
    let (content_key, commitment) = derive_message_keys(&data_key, &message_id);
    drop(data_key);

    let mut message = Message {
        suite: AlgorithmSuite::COMMITTING,
        message_id,
        context: context.clone(),
        encrypted_data_key,
        nonce,
        commitment,
        ciphertext: Vec::new(),
    };

    let header = message.header_bytes()?;
    message.ciphertext = content_key.encrypt(plaintext, &nonce, &header)?;
    check_not_identity(plaintext, &message.ciphertext)?;

    debug!(
        message_id = %message_id.to_hex(),
        suite = message.suite.id(),
        context_keys = ?context.keys().collect::<Vec<_>>(),
        len = plaintext.len(),
        "encrypted message"
    );

    Ok(message)
}

/// Decrypt `message`, requiring its context to equal `expected`.
pub async fn decrypt<K>(message: &Message, keyring: &K, expected: &EncryptionContext) -> Result<Vec<u8>>
where
    K: Keyring + ?Sized,
{
    let mismatched = context_diff(expected, message.context());
    if !mismatched.is_empty() {
        debug!(
            message_id = %message.message_id().to_hex(),
            keys = ?mismatched,
            "encryption context mismatch"
        );
        return Err(GatewayError::ContextMismatch { keys: mismatched });
    }

    let data_key = keyring
        .unwrap_data_key(message.encrypted_data_key(), message.context())
        .await?;

    let (content_key, commitment) = derive_message_keys(&data_key, message.message_id());
    drop(data_key);
    commitment.verify(message.commitment())?;

    let header = message
        .header_bytes()
        .map_err(|e| GatewayError::Integrity(e.to_string()))?;
    let plaintext = content_key.decrypt(message.ciphertext(), message.nonce(), &header)?;

    debug!(
        message_id = %message.message_id().to_hex(),
        suite = message.suite().id(),
        context_keys = ?message.context().keys().collect::<Vec<_>>(),
        len = plaintext.len(),
        "decrypted message"
    );

    Ok(plaintext)
}

/// Fail if a non-empty plaintext would be emitted unchanged.
pub(crate) fn check_not_identity(plaintext: &[u8], ciphertext: &[u8]) -> Result<()> {
    if !plaintext.is_empty() && ciphertext == plaintext {
        return Err(GatewayError::EncryptionFailure(
            "ciphertext reproduces the plaintext".into(),
        ));
    }
    Ok(())
}

/// Keys whose presence or value differs between two contexts, sorted.
fn context_diff(a: &EncryptionContext, b: &EncryptionContext) -> Vec<String> {
    let keys: BTreeSet<&str> = a.keys().chain(b.keys()).collect();
    keys.into_iter()
        .filter(|k| a.get(k) != b.get(k))
        .map(str::to_string)
        .collect()
}
