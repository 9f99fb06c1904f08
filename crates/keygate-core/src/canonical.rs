//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats, no tags
//!
//! Encryption contexts and message headers are authenticated over their
//! canonical bytes, so two equal values must always encode identically.

use ciborium::value::{Integer, Value};

use crate::error::{CoreError, Result};

/// Encode a CBOR value to canonical bytes.
pub fn canonical_encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Decode bytes that must already be in canonical form.
///
/// The value is re-encoded and compared against the input, so trailing
/// bytes, non-minimal integers and unsorted maps are all rejected.
pub fn decode_canonical(bytes: &[u8]) -> Result<Value> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let reencoded = canonical_encode(&value)?;
    if reencoded != bytes {
        return Err(CoreError::DecodingError("input is not canonical CBOR".into()));
    }

    Ok(value)
}

/// Look up an integer-keyed entry in a CBOR map.
pub fn map_get(entries: &[(Value, Value)], key: u64) -> Option<&Value> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
        .map(|(_, v)| v)
}

/// Read an unsigned integer that must fit in `u64`.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => u64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::EncodingError("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<()> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison. Duplicate keys are
/// rejected.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        key_value_pairs.push((key_buf, v));
    }

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if key_value_pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::EncodingError("duplicate map key".into()));
    }

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_integers_single_byte() {
        let bytes = canonical_encode(&Value::Integer(7u8.into())).unwrap();
        assert_eq!(bytes, vec![0x07]);

        let bytes = canonical_encode(&Value::Integer(24u8.into())).unwrap();
        assert_eq!(bytes, vec![0x18, 24]);
    }

    #[test]
    fn test_map_keys_sorted_by_encoding() {
        // "bb" encodes longer than "c", so "c" sorts first.
        let value = Value::Map(vec![
            (Value::Text("bb".into()), Value::Null),
            (Value::Text("c".into()), Value::Null),
            (Value::Text("a".into()), Value::Null),
        ]);
        let bytes = canonical_encode(&value).unwrap();
        assert_eq!(
            bytes,
            vec![0xa3, 0x61, b'a', 0xf6, 0x61, b'c', 0xf6, 0x62, b'b', b'b', 0xf6]
        );
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let value = Value::Map(vec![
            (Value::Text("a".into()), Value::Null),
            (Value::Text("a".into()), Value::Bool(true)),
        ]);
        assert!(canonical_encode(&value).is_err());
    }

    #[test]
    fn test_floats_rejected() {
        assert!(canonical_encode(&Value::Float(1.5)).is_err());
    }

    #[test]
    fn test_decode_rejects_non_minimal_integer() {
        // 5 encoded with a one-byte argument instead of inline.
        assert!(decode_canonical(&[0x18, 0x05]).is_err());
        assert!(decode_canonical(&[0x05]).is_ok());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert!(decode_canonical(&[0x05, 0x06]).is_err());
    }

    #[test]
    fn test_map_get() {
        let entries = vec![
            (Value::Integer(0u8.into()), Value::Text("zero".into())),
            (Value::Integer(3u8.into()), Value::Bool(true)),
        ];
        assert_eq!(map_get(&entries, 3), Some(&Value::Bool(true)));
        assert!(map_get(&entries, 1).is_none());
    }
}
