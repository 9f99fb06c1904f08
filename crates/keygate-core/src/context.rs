//! Encryption context: authenticated, non-secret message metadata.
//!
//! The context is a string-to-string mapping bound to every encrypt and
//! decrypt call. Equality ignores insertion order; serialization is the
//! canonical CBOR encoding of the map, so equal contexts always produce the
//! same bytes.

use std::collections::{BTreeMap, HashMap};

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_encode, decode_canonical};
use crate::error::{CoreError, Result};

/// Key prefix reserved for values Keygate itself may add.
pub const RESERVED_PREFIX: &str = "keygate:";

/// Authenticated metadata attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionContext(BTreeMap<String, String>);

impl EncryptionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a pair, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the context has no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Check the context is usable for a caller-initiated operation.
    ///
    /// Keys must be non-empty and must not use the reserved prefix.
    pub fn validate(&self) -> Result<()> {
        for key in self.0.keys() {
            if key.is_empty() {
                return Err(CoreError::InvalidContext("empty key".into()));
            }
            if key.starts_with(RESERVED_PREFIX) {
                return Err(CoreError::InvalidContext(format!(
                    "key {key:?} uses reserved prefix {RESERVED_PREFIX:?}"
                )));
            }
        }
        Ok(())
    }

    /// Layer this context over a set of defaults. Pairs in `self` win.
    pub fn merged_over(&self, defaults: &EncryptionContext) -> EncryptionContext {
        let mut merged = defaults.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        EncryptionContext(merged)
    }

    /// The context as a CBOR map value.
    pub fn to_cbor_value(&self) -> Value {
        Value::Map(
            self.0
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), Value::Text(v.clone())))
                .collect(),
        )
    }

    /// Rebuild a context from a CBOR map value.
    pub fn from_cbor_value(value: &Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(CoreError::DecodingError("encryption context must be a map".into()));
        };

        let mut map = BTreeMap::new();
        for (k, v) in entries {
            let (Value::Text(k), Value::Text(v)) = (k, v) else {
                return Err(CoreError::DecodingError(
                    "encryption context entries must be text".into(),
                ));
            };
            if map.insert(k.clone(), v.clone()).is_some() {
                return Err(CoreError::DecodingError(format!(
                    "duplicate encryption context key {k:?}"
                )));
            }
        }
        Ok(Self(map))
    }

    /// Deterministic serialization used for authentication.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_encode(&self.to_cbor_value())
    }

    /// Parse canonical bytes produced by [`canonical_bytes`](Self::canonical_bytes).
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_cbor_value(&decode_canonical(bytes)?)
    }
}

impl From<BTreeMap<String, String>> for EncryptionContext {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<HashMap<String, String>> for EncryptionContext {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EncryptionContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = EncryptionContext::new().with("tenant", "acme").with("purpose", "test");
        let b = EncryptionContext::new().with("purpose", "test").with("tenant", "acme");

        assert_eq!(a, b);
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn test_empty_context_encodes_as_empty_map() {
        assert_eq!(EncryptionContext::new().canonical_bytes().unwrap(), vec![0xa0]);
    }

    #[test]
    fn test_validate() {
        assert!(EncryptionContext::new().with("k", "v").validate().is_ok());
        assert!(EncryptionContext::new().with("", "v").validate().is_err());
        assert!(EncryptionContext::new()
            .with("keygate:suite", "v")
            .validate()
            .is_err());
    }

    #[test]
    fn test_merge_caller_wins() {
        let defaults = EncryptionContext::new().with("env", "prod").with("app", "billing");
        let caller = EncryptionContext::new().with("env", "staging");

        let merged = caller.merged_over(&defaults);
        assert_eq!(merged.get("env"), Some("staging"));
        assert_eq!(merged.get("app"), Some("billing"));
    }

    #[test]
    fn test_non_text_values_rejected() {
        let value = Value::Map(vec![(Value::Text("k".into()), Value::Integer(1u8.into()))]);
        assert!(EncryptionContext::from_cbor_value(&value).is_err());
    }

    #[test]
    fn test_serde_is_plain_map() {
        let ctx = EncryptionContext::new().with("a", "1");
        assert_eq!(serde_json::to_string(&ctx).unwrap(), r#"{"a":"1"}"#);
    }

    proptest! {
        #[test]
        fn test_canonical_roundtrip(map in prop::collection::btree_map(".{0,12}", ".{0,24}", 0..8)) {
            let ctx = EncryptionContext::from(map);
            let bytes = ctx.canonical_bytes().unwrap();
            let recovered = EncryptionContext::from_canonical_bytes(&bytes).unwrap();
            prop_assert_eq!(recovered, ctx);
        }

        #[test]
        fn test_canonical_bytes_order_independent(
            pairs in prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,6}"), 0..8)
        ) {
            let forward: EncryptionContext = pairs.iter().cloned().collect();
            let backward: EncryptionContext = pairs.iter().rev().cloned().collect();
            // Later duplicates win in each direction, so only compare when keys are unique.
            let mut keys: Vec<_> = pairs.iter().map(|(k, _)| k.clone()).collect();
            keys.sort();
            keys.dedup();
            prop_assume!(keys.len() == pairs.len());
            prop_assert_eq!(forward.canonical_bytes().unwrap(), backward.canonical_bytes().unwrap());
        }
    }
}
