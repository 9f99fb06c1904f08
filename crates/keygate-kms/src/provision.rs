//! Provisioning inputs and outputs.
//!
//! A [`ProvisionRequest`] is the declarative description of a key: its
//! region, administrator and three grant lists. Provisioning it yields a
//! [`ProvisionedKey`] whose handle the gateway uses.

use std::path::Path;

use serde::{Deserialize, Serialize};

use keygate_core::{KeyHandle, Principal};
use keygate_perms::GrantSets;

use crate::error::{KeyServiceError, Result};

/// Declarative description of a key to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Region the key lives in.
    pub region: String,
    /// Principal allowed to administer the key.
    pub admin: Principal,
    /// Principals with encrypt and decrypt.
    #[serde(default)]
    pub full_access: Vec<Principal>,
    /// Principals with encrypt only.
    #[serde(default)]
    pub encrypt_only: Vec<Principal>,
    /// Principals with decrypt only.
    #[serde(default)]
    pub decrypt_only: Vec<Principal>,
    /// Optional alias name (without the `alias/` prefix).
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl ProvisionRequest {
    /// A request with empty grant lists.
    pub fn new(region: impl Into<String>, admin: Principal) -> Self {
        Self {
            region: region.into(),
            admin,
            full_access: Vec::new(),
            encrypt_only: Vec::new(),
            decrypt_only: Vec::new(),
            alias: None,
            description: String::new(),
        }
    }

    /// Set all three grant lists from a [`GrantSets`].
    pub fn with_grants(mut self, grants: &GrantSets) -> Self {
        self.full_access = grants.full_access.iter().cloned().collect();
        self.encrypt_only = grants.encrypt_only.iter().cloned().collect();
        self.decrypt_only = grants.decrypt_only.iter().cloned().collect();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The grant lists as sets.
    pub fn grants(&self) -> GrantSets {
        GrantSets {
            full_access: self.full_access.iter().cloned().collect(),
            encrypt_only: self.encrypt_only.iter().cloned().collect(),
            decrypt_only: self.decrypt_only.iter().cloned().collect(),
        }
    }

    /// Parse a JSON request.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(json)
            .map_err(|e| KeyServiceError::Validation(format!("provision request: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Read a JSON request from a file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| KeyServiceError::Validation(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Check the request is complete.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(KeyServiceError::Validation("region is empty".into()));
        }
        if let Some(alias) = &self.alias {
            KeyHandle::parse(&format!("alias/{alias}"))
                .map_err(|e| KeyServiceError::Validation(e.to_string()))?;
        }
        Ok(())
    }
}

/// A provisioned key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedKey {
    pub key_id: String,
    /// Full key ARN.
    pub arn: KeyHandle,
    pub region: String,
    /// `alias/<name>` handle, if an alias was requested.
    pub alias: Option<KeyHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let request = ProvisionRequest::from_json_str(
            r#"{
                "region": "us-west-1",
                "admin": "arn:aws:iam::123456789012:role/admin",
                "full_access": ["arn:aws:iam::123456789012:role/probe"]
            }"#,
        )
        .unwrap();

        assert_eq!(request.region, "us-west-1");
        assert_eq!(request.full_access.len(), 1);
        assert!(request.encrypt_only.is_empty());
        assert!(request.alias.is_none());
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let missing_admin = r#"{"region": "us-west-1"}"#;
        assert!(matches!(
            ProvisionRequest::from_json_str(missing_admin),
            Err(KeyServiceError::Validation(_))
        ));

        let blank_region = r#"{"region": " ", "admin": "arn:aws:iam::123456789012:role/admin"}"#;
        assert!(ProvisionRequest::from_json_str(blank_region).is_err());

        let bad_alias = r#"{"region": "us-west-1", "admin": "a", "alias": "has space"}"#;
        assert!(ProvisionRequest::from_json_str(bad_alias).is_err());
    }

    #[test]
    fn test_grants_roundtrip_through_request() {
        let probe = Principal::new("arn:aws:iam::123456789012:role/probe").unwrap();
        let grants = GrantSets::new()
            .with_encrypt_only(probe.clone())
            .with_decrypt_only(probe);
        let admin = Principal::new("arn:aws:iam::123456789012:role/admin").unwrap();

        let request = ProvisionRequest::new("us-west-1", admin).with_grants(&grants);
        assert_eq!(request.grants(), grants);
    }
}
