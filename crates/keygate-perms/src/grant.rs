//! Grant lists.
//!
//! A key's access configuration is three lists of principals. Lists may
//! overlap; a principal may appear in any combination of them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use keygate_core::Principal;

use crate::error::{PermsError, Result};
use crate::tier::Operation;

/// Which grant list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Encrypt and decrypt.
    FullAccess,
    /// Encrypt (and generate data keys) only.
    EncryptOnly,
    /// Decrypt only.
    DecryptOnly,
}

impl GrantKind {
    /// Every grant kind.
    pub const ALL: [GrantKind; 3] = [
        GrantKind::FullAccess,
        GrantKind::EncryptOnly,
        GrantKind::DecryptOnly,
    ];

    /// Check if this grant alone permits an operation.
    pub fn permits(self, operation: Operation) -> bool {
        match (self, operation) {
            (GrantKind::FullAccess, _) => true,
            (GrantKind::EncryptOnly, Operation::Encrypt) => true,
            (GrantKind::DecryptOnly, Operation::Decrypt) => true,
            _ => false,
        }
    }
}

/// The three grant lists attached to one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSets {
    /// Principals with encrypt and decrypt.
    #[serde(default)]
    pub full_access: BTreeSet<Principal>,

    /// Principals with encrypt only.
    #[serde(default)]
    pub encrypt_only: BTreeSet<Principal>,

    /// Principals with decrypt only.
    #[serde(default)]
    pub decrypt_only: BTreeSet<Principal>,
}

impl GrantSets {
    /// Create empty grant lists (nobody has access).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw identifier lists, validating every entry.
    pub fn from_lists<S: AsRef<str>>(
        full_access: &[S],
        encrypt_only: &[S],
        decrypt_only: &[S],
    ) -> Result<Self> {
        let parse = |list: &[S]| -> Result<BTreeSet<Principal>> {
            list.iter()
                .map(|s| {
                    Principal::new(s.as_ref())
                        .map_err(|e| PermsError::InvalidGrant(format!("{:?}: {e}", s.as_ref())))
                })
                .collect()
        };

        Ok(Self {
            full_access: parse(full_access)?,
            encrypt_only: parse(encrypt_only)?,
            decrypt_only: parse(decrypt_only)?,
        })
    }

    /// Add a principal to the full-access list.
    pub fn with_full_access(mut self, principal: Principal) -> Self {
        self.grant(GrantKind::FullAccess, principal);
        self
    }

    /// Add a principal to the encrypt-only list.
    pub fn with_encrypt_only(mut self, principal: Principal) -> Self {
        self.grant(GrantKind::EncryptOnly, principal);
        self
    }

    /// Add a principal to the decrypt-only list.
    pub fn with_decrypt_only(mut self, principal: Principal) -> Self {
        self.grant(GrantKind::DecryptOnly, principal);
        self
    }

    /// Add a principal to a list. Returns false if it was already there.
    pub fn grant(&mut self, kind: GrantKind, principal: Principal) -> bool {
        self.list_mut(kind).insert(principal)
    }

    /// Remove a principal from a list. Returns false if it was not there.
    pub fn revoke(&mut self, kind: GrantKind, principal: &Principal) -> bool {
        self.list_mut(kind).remove(principal)
    }

    /// Check list membership.
    pub fn contains(&self, kind: GrantKind, principal: &Principal) -> bool {
        self.list(kind).contains(principal)
    }

    /// Borrow one list.
    pub fn list(&self, kind: GrantKind) -> &BTreeSet<Principal> {
        match kind {
            GrantKind::FullAccess => &self.full_access,
            GrantKind::EncryptOnly => &self.encrypt_only,
            GrantKind::DecryptOnly => &self.decrypt_only,
        }
    }

    fn list_mut(&mut self, kind: GrantKind) -> &mut BTreeSet<Principal> {
        match kind {
            GrantKind::FullAccess => &mut self.full_access,
            GrantKind::EncryptOnly => &mut self.encrypt_only,
            GrantKind::DecryptOnly => &mut self.decrypt_only,
        }
    }

    /// Every list a principal appears in.
    pub fn kinds_for(&self, principal: &Principal) -> Vec<GrantKind> {
        GrantKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind, principal))
            .collect()
    }

    /// Every principal mentioned in any list.
    pub fn principals(&self) -> BTreeSet<&Principal> {
        self.full_access
            .iter()
            .chain(&self.encrypt_only)
            .chain(&self.decrypt_only)
            .collect()
    }

    /// Whether no principal is granted anything.
    pub fn is_empty(&self) -> bool {
        self.full_access.is_empty() && self.encrypt_only.is_empty() && self.decrypt_only.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(name: &str) -> Principal {
        Principal::new(format!("arn:aws:iam::123456789012:role/{name}")).unwrap()
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut grants = GrantSets::new();
        let probe = principal("probe");

        assert!(grants.grant(GrantKind::EncryptOnly, probe.clone()));
        assert!(!grants.grant(GrantKind::EncryptOnly, probe.clone()));
        assert!(grants.contains(GrantKind::EncryptOnly, &probe));

        assert!(grants.revoke(GrantKind::EncryptOnly, &probe));
        assert!(!grants.revoke(GrantKind::EncryptOnly, &probe));
        assert!(grants.is_empty());
    }

    #[test]
    fn test_overlapping_lists() {
        let probe = principal("probe");
        let grants = GrantSets::new()
            .with_full_access(probe.clone())
            .with_encrypt_only(probe.clone())
            .with_decrypt_only(probe.clone());

        assert_eq!(grants.kinds_for(&probe), GrantKind::ALL.to_vec());
        assert_eq!(grants.principals().len(), 1);
    }

    #[test]
    fn test_from_lists_validates() {
        let grants = GrantSets::from_lists(
            &["arn:aws:iam::123456789012:role/admin"],
            &[],
            &["arn:aws:iam::123456789012:role/reader"],
        )
        .unwrap();
        assert_eq!(grants.full_access.len(), 1);
        assert_eq!(grants.decrypt_only.len(), 1);

        let err = GrantSets::from_lists(&[""], &[], &[]).unwrap_err();
        assert!(matches!(err, PermsError::InvalidGrant(_)));
    }

    #[test]
    fn test_grant_kind_permits() {
        assert!(GrantKind::FullAccess.permits(Operation::Encrypt));
        assert!(GrantKind::FullAccess.permits(Operation::Decrypt));
        assert!(GrantKind::EncryptOnly.permits(Operation::Encrypt));
        assert!(!GrantKind::EncryptOnly.permits(Operation::Decrypt));
        assert!(!GrantKind::DecryptOnly.permits(Operation::Encrypt));
        assert!(GrantKind::DecryptOnly.permits(Operation::Decrypt));
    }

    #[test]
    fn test_serde_missing_lists_default_empty() {
        let grants: GrantSets = serde_json::from_str(
            r#"{"encrypt_only": ["arn:aws:iam::123456789012:role/writer"]}"#,
        )
        .unwrap();
        assert!(grants.full_access.is_empty());
        assert_eq!(grants.encrypt_only.len(), 1);
    }
}
