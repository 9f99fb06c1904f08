//! Strong type definitions for Keygate.
//!
//! Identifiers are validated newtypes so a malformed handle is rejected
//! before anything crosses the key-service boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Longest identifier accepted for a handle or principal.
const MAX_IDENTIFIER_LEN: usize = 2048;

/// What a [`KeyHandle`] points at on the key service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyResource {
    /// A key addressed by its key id.
    Key(String),
    /// A key addressed through an alias (`alias/<name>`).
    Alias(String),
}

/// Identifier of a remote key-encryption key.
///
/// Accepted forms:
/// - key ARN: `arn:<partition>:kms:<region>:<account>:key/<key-id>`
/// - alias ARN: `arn:<partition>:kms:<region>:<account>:alias/<name>`
/// - alias name: `alias/<name>`
/// - bare key id: `1234abcd-12ab-34cd-56ef-1234567890ab`
///
/// Immutable once parsed. A keyring references a handle, it never owns the
/// key behind it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyHandle {
    raw: String,
    region: Option<String>,
    account: Option<String>,
    resource: KeyResource,
}

impl KeyHandle {
    /// Parse and validate a key handle.
    pub fn parse(raw: &str) -> Result<Self> {
        check_identifier(raw).map_err(CoreError::InvalidKeyHandle)?;

        if let Some(rest) = raw.strip_prefix("arn:") {
            return Self::parse_arn(raw, rest);
        }

        if let Some(name) = raw.strip_prefix("alias/") {
            check_alias_name(name)?;
            return Ok(Self {
                raw: raw.to_string(),
                region: None,
                account: None,
                resource: KeyResource::Alias(name.to_string()),
            });
        }

        check_key_id(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            region: None,
            account: None,
            resource: KeyResource::Key(raw.to_string()),
        })
    }

    fn parse_arn(raw: &str, rest: &str) -> Result<Self> {
        let parts: Vec<&str> = rest.splitn(5, ':').collect();
        let [partition, service, region, account, resource] = parts.as_slice() else {
            return Err(CoreError::InvalidKeyHandle(format!(
                "ARN must have 6 colon-separated fields: {raw}"
            )));
        };

        if partition.is_empty() {
            return Err(CoreError::InvalidKeyHandle("ARN partition is empty".into()));
        }
        if *service != "kms" {
            return Err(CoreError::InvalidKeyHandle(format!(
                "ARN service must be kms, got {service:?}"
            )));
        }
        if region.is_empty() {
            return Err(CoreError::InvalidKeyHandle("ARN region is empty".into()));
        }
        if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidKeyHandle(format!(
                "ARN account must be 12 digits, got {account:?}"
            )));
        }

        let resource = if let Some(id) = resource.strip_prefix("key/") {
            check_key_id(id)?;
            KeyResource::Key(id.to_string())
        } else if let Some(name) = resource.strip_prefix("alias/") {
            check_alias_name(name)?;
            KeyResource::Alias(name.to_string())
        } else {
            return Err(CoreError::InvalidKeyHandle(format!(
                "ARN resource must be key/<id> or alias/<name>, got {resource:?}"
            )));
        };

        Ok(Self {
            raw: raw.to_string(),
            region: Some(region.to_string()),
            account: Some(account.to_string()),
            resource,
        })
    }

    /// Build the ARN of a key from its parts.
    pub fn key_arn(partition: &str, region: &str, account: &str, key_id: &str) -> Result<Self> {
        Self::parse(&format!("arn:{partition}:kms:{region}:{account}:key/{key_id}"))
    }

    /// The handle exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Region embedded in an ARN handle.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Account embedded in an ARN handle.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// The resource this handle names.
    pub fn resource(&self) -> &KeyResource {
        &self.resource
    }

    /// Whether this handle names an alias rather than a key.
    pub fn is_alias(&self) -> bool {
        matches!(self.resource, KeyResource::Alias(_))
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHandle({})", self.raw)
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for KeyHandle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KeyHandle {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<KeyHandle> for String {
    fn from(handle: KeyHandle) -> Self {
        handle.raw
    }
}

/// An identity attempting an operation: a role or user reference.
///
/// Principals are supplied by the caller or credential layer; Keygate only
/// compares them. Typically an IAM-style ARN such as
/// `arn:aws:iam::123456789012:role/probe`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Create a principal, rejecting empty or whitespace-padded identifiers.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        check_identifier(&id).map_err(CoreError::InvalidPrincipal)?;
        Ok(Self(id))
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The resource name of an ARN principal.
    ///
    /// For `arn:aws:iam::123456789012:role/probe` this is `probe`. Used as the
    /// session name when this principal assumes a role.
    pub fn name(&self) -> &str {
        let resource = self.0.rsplit(':').next().unwrap_or(&self.0);
        match resource.split_once('/') {
            Some((_, name)) if !name.is_empty() => name,
            _ => resource,
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.0
    }
}

fn check_identifier(s: &str) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err("identifier is empty".into());
    }
    if s.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("identifier exceeds {MAX_IDENTIFIER_LEN} bytes"));
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("identifier contains whitespace: {s:?}"));
    }
    Ok(())
}

fn check_key_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return Err(CoreError::InvalidKeyHandle(format!(
            "key id must be non-empty [A-Za-z0-9-], got {id:?}"
        )));
    }
    Ok(())
}

fn check_alias_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'_' | b'-'));
    if !valid {
        return Err(CoreError::InvalidKeyHandle(format!(
            "alias name must be non-empty [A-Za-z0-9/_-], got {name:?}"
        )));
    }
    Ok(())
}
