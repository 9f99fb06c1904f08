//! The self-describing encrypted message.
//!
//! A message is a canonical CBOR map with integer keys:
//!
//! | key | field |
//! |-----|-------|
//! | 0 | format version (1) |
//! | 1 | algorithm suite id |
//! | 2 | message id (32 bytes) |
//! | 3 | encryption context (text map) |
//! | 4 | encrypted data key `[provider, key id, blob]` |
//! | 5 | nonce (12 bytes) |
//! | 6 | key commitment (32 bytes) |
//! | 7 | ciphertext with tag |
//! | 8 | digest of fields 0-7 |
//!
//! Fields 0-6 form the header. The header's canonical bytes are the AEAD
//! associated data, so the tag covers the suite, context and wrapped key.

use bytes::Bytes;
use ciborium::value::Value;

use keygate_core::canonical::{as_u64, map_get};
use keygate_core::{
    canonical_encode, decode_canonical, AlgorithmSuite, Commitment, EncryptionContext,
    EncryptionNonce, MessageDigest, MessageId, NONCE_LEN, TAG_LEN,
};

use crate::error::{GatewayError, Result};
use crate::keyring::EncryptedDataKey;

/// Current message format version.
pub const MESSAGE_VERSION: u64 = 1;

mod fields {
    pub const VERSION: u64 = 0;
    pub const SUITE: u64 = 1;
    pub const MESSAGE_ID: u64 = 2;
    pub const CONTEXT: u64 = 3;
    pub const DATA_KEY: u64 = 4;
    pub const NONCE: u64 = 5;
    pub const COMMITMENT: u64 = 6;
    pub const CIPHERTEXT: u64 = 7;
    pub const DIGEST: u64 = 8;
}

/// An encrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub(crate) suite: AlgorithmSuite,
    pub(crate) message_id: MessageId,
    pub(crate) context: EncryptionContext,
    pub(crate) encrypted_data_key: EncryptedDataKey,
    pub(crate) nonce: EncryptionNonce,
    pub(crate) commitment: Commitment,
    pub(crate) ciphertext: Vec<u8>,
}

impl Message {
    pub fn suite(&self) -> AlgorithmSuite {
        self.suite
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// The encryption context bound to this message.
    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    pub fn encrypted_data_key(&self) -> &EncryptedDataKey {
        &self.encrypted_data_key
    }

    pub fn nonce(&self) -> &EncryptionNonce {
        &self.nonce
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    /// Ciphertext including the authentication tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Canonical bytes of the header, used as associated data.
    pub fn header_bytes(&self) -> Result<Vec<u8>> {
        canonical_encode(&Value::Map(self.header_entries())).map_err(encoding_failure)
    }

    /// Serialize the full message.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut entries = self.header_entries();
        entries.push((
            field(fields::CIPHERTEXT),
            Value::Bytes(self.ciphertext.clone()),
        ));

        let body = canonical_encode(&Value::Map(entries.clone())).map_err(encoding_failure)?;
        let digest = MessageDigest::compute(&body);
        entries.push((field(fields::DIGEST), Value::Bytes(digest.as_bytes().to_vec())));

        canonical_encode(&Value::Map(entries)).map_err(encoding_failure)
    }

    /// Parse and structurally verify a message.
    ///
    /// Rejects non-canonical encodings, unknown versions and suites, and
    /// any body whose digest does not match. Every failure is an integrity
    /// error; nothing here contacts the key service.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value = decode_canonical(bytes).map_err(|e| malformed(e.to_string()))?;
        let Value::Map(entries) = value else {
            return Err(malformed("message must be a map"));
        };
        if entries.len() != 9 {
            return Err(malformed(format!("expected 9 fields, got {}", entries.len())));
        }

        let digest = match map_get(&entries, fields::DIGEST) {
            Some(Value::Bytes(b)) => MessageDigest::from_bytes(to_array(b, "digest")?),
            _ => return Err(malformed("missing digest")),
        };
        let body: Vec<(Value, Value)> = entries
            .iter()
            .filter(|(k, _)| as_u64(k) != Some(fields::DIGEST))
            .cloned()
            .collect();
        let body_bytes = canonical_encode(&Value::Map(body)).map_err(|e| malformed(e.to_string()))?;
        if !digest.verify(&body_bytes) {
            return Err(GatewayError::Integrity("message digest does not match".into()));
        }

        let get = |key: u64, name: &str| {
            map_get(&entries, key).ok_or_else(|| malformed(format!("missing {name}")))
        };

        let version = as_u64(get(fields::VERSION, "version")?)
            .ok_or_else(|| malformed("version must be an integer"))?;
        if version != MESSAGE_VERSION {
            return Err(malformed(format!("unsupported message version {version}")));
        }

        let suite_id = as_u64(get(fields::SUITE, "suite")?)
            .and_then(|id| u16::try_from(id).ok())
            .ok_or_else(|| malformed("suite id must be a u16"))?;
        let suite = AlgorithmSuite::from_id(suite_id)?;

        let message_id = match get(fields::MESSAGE_ID, "message id")? {
            Value::Bytes(b) => MessageId::from_bytes(to_array(b, "message id")?),
            _ => return Err(malformed("message id must be bytes")),
        };

        let context = EncryptionContext::from_cbor_value(get(fields::CONTEXT, "context")?)
            .map_err(|e| malformed(e.to_string()))?;

        let encrypted_data_key = decode_data_key(get(fields::DATA_KEY, "encrypted data key")?)?;

        let nonce = match get(fields::NONCE, "nonce")? {
            Value::Bytes(b) => EncryptionNonce::from_bytes(to_array::<NONCE_LEN>(b, "nonce")?),
            _ => return Err(malformed("nonce must be bytes")),
        };

        let commitment = match get(fields::COMMITMENT, "commitment")? {
            Value::Bytes(b) => Commitment::from_bytes(to_array(b, "commitment")?),
            _ => return Err(malformed("commitment must be bytes")),
        };

        let ciphertext = match get(fields::CIPHERTEXT, "ciphertext")? {
            Value::Bytes(b) if b.len() >= TAG_LEN => b.clone(),
            Value::Bytes(_) => return Err(malformed("ciphertext shorter than tag")),
            _ => return Err(malformed("ciphertext must be bytes")),
        };

        Ok(Self {
            suite,
            message_id,
            context,
            encrypted_data_key,
            nonce,
            commitment,
            ciphertext,
        })
    }

    fn header_entries(&self) -> Vec<(Value, Value)> {
        vec![
            (field(fields::VERSION), field(MESSAGE_VERSION)),
            (field(fields::SUITE), field(u64::from(self.suite.id()))),
            (
                field(fields::MESSAGE_ID),
                Value::Bytes(self.message_id.as_bytes().to_vec()),
            ),
            (field(fields::CONTEXT), self.context.to_cbor_value()),
            (
                field(fields::DATA_KEY),
                encode_data_key(&self.encrypted_data_key),
            ),
            (field(fields::NONCE), Value::Bytes(self.nonce.as_bytes().to_vec())),
            (
                field(fields::COMMITMENT),
                Value::Bytes(self.commitment.as_bytes().to_vec()),
            ),
        ]
    }
}

fn field(n: u64) -> Value {
    Value::Integer(n.into())
}

fn encode_data_key(edk: &EncryptedDataKey) -> Value {
    Value::Array(vec![
        Value::Text(edk.provider_id.clone()),
        Value::Text(edk.key_id.clone()),
        Value::Bytes(edk.blob.to_vec()),
    ])
}

fn decode_data_key(value: &Value) -> Result<EncryptedDataKey> {
    match value {
        Value::Array(items) => match items.as_slice() {
            [Value::Text(provider_id), Value::Text(key_id), Value::Bytes(blob)] => {
                Ok(EncryptedDataKey {
                    provider_id: provider_id.clone(),
                    key_id: key_id.clone(),
                    blob: Bytes::copy_from_slice(blob),
                })
            }
            _ => Err(malformed("encrypted data key must be [text, text, bytes]")),
        },
        _ => Err(malformed("encrypted data key must be an array")),
    }
}

fn to_array<const N: usize>(bytes: &[u8], name: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| malformed(format!("{name} must be {N} bytes, got {}", bytes.len())))
}

fn malformed(reason: impl Into<String>) -> GatewayError {
    GatewayError::Integrity(format!("malformed message: {}", reason.into()))
}

fn encoding_failure(err: keygate_core::CoreError) -> GatewayError {
    GatewayError::EncryptionFailure(err.to_string())
}
