//! Authorization tiers and the expected-decision oracle.

use std::fmt;

use serde::{Deserialize, Serialize};

use keygate_core::Principal;

use crate::grant::{GrantKind, GrantSets};

/// A cryptographic operation against the managed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Produce a new message (generate or wrap a data key).
    Encrypt,
    /// Open an existing message (unwrap a data key).
    Decrypt,
}

impl Operation {
    /// Both operations.
    pub const ALL: [Operation; 2] = [Operation::Encrypt, Operation::Decrypt];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Encrypt => f.write_str("encrypt"),
            Operation::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// The outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Check if this decision allows the operation.
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// The capability class a principal holds against a key.
///
/// Derived, never stored: see [`resolve_tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationTier {
    None,
    EncryptOnly,
    DecryptOnly,
    Full,
}

impl AuthorizationTier {
    /// Tier for a given list membership.
    ///
    /// Full access dominates; encrypt-only and decrypt-only compose into
    /// full.
    pub const fn from_membership(full_access: bool, encrypt_only: bool, decrypt_only: bool) -> Self {
        match (full_access, encrypt_only, decrypt_only) {
            (true, _, _) => AuthorizationTier::Full,
            (false, true, true) => AuthorizationTier::Full,
            (false, true, false) => AuthorizationTier::EncryptOnly,
            (false, false, true) => AuthorizationTier::DecryptOnly,
            (false, false, false) => AuthorizationTier::None,
        }
    }

    /// Check if this tier permits an operation.
    pub const fn permits(self, operation: Operation) -> bool {
        matches!(
            (self, operation),
            (AuthorizationTier::Full, _)
                | (AuthorizationTier::EncryptOnly, Operation::Encrypt)
                | (AuthorizationTier::DecryptOnly, Operation::Decrypt)
        )
    }

    /// The decision the key service is expected to make.
    pub fn decision(self, operation: Operation) -> Decision {
        Decision::from(self.permits(operation))
    }

    /// Operations this tier permits.
    pub fn operations(self) -> Vec<Operation> {
        Operation::ALL
            .into_iter()
            .filter(|op| self.permits(*op))
            .collect()
    }
}

/// Compute a principal's tier from current list membership.
pub fn resolve_tier(principal: &Principal, grants: &GrantSets) -> AuthorizationTier {
    AuthorizationTier::from_membership(
        grants.contains(GrantKind::FullAccess, principal),
        grants.contains(GrantKind::EncryptOnly, principal),
        grants.contains(GrantKind::DecryptOnly, principal),
    )
}

/// Predict whether the key service will honor `operation` for `principal`.
pub fn authorize(principal: &Principal, operation: Operation, grants: &GrantSets) -> Decision {
    resolve_tier(principal, grants).decision(operation)
}

/// One row of the full membership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRow {
    pub full_access: bool,
    pub encrypt_only: bool,
    pub decrypt_only: bool,
    pub tier: AuthorizationTier,
}

impl TierRow {
    /// Build the grant lists that put `principal` in this row.
    pub fn grants_for(&self, principal: &Principal) -> GrantSets {
        let mut grants = GrantSets::new();
        if self.full_access {
            grants.grant(GrantKind::FullAccess, principal.clone());
        }
        if self.encrypt_only {
            grants.grant(GrantKind::EncryptOnly, principal.clone());
        }
        if self.decrypt_only {
            grants.grant(GrantKind::DecryptOnly, principal.clone());
        }
        grants
    }

    /// Short label such as `full+encrypt`, or `none`.
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [
            (self.full_access, "full"),
            (self.encrypt_only, "encrypt"),
            (self.decrypt_only, "decrypt"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();

        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("+")
        }
    }
}

/// Every membership combination with its tier (8 rows).
pub fn tier_table() -> Vec<TierRow> {
    let mut rows = Vec::with_capacity(8);
    for full_access in [false, true] {
        for encrypt_only in [false, true] {
            for decrypt_only in [false, true] {
                rows.push(TierRow {
                    full_access,
                    encrypt_only,
                    decrypt_only,
                    tier: AuthorizationTier::from_membership(full_access, encrypt_only, decrypt_only),
                });
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn probe() -> Principal {
        Principal::new("arn:aws:iam::123456789012:role/probe").unwrap()
    }

    #[test]
    fn test_no_grants_denies_everything() {
        let grants = GrantSets::new();
        assert_eq!(resolve_tier(&probe(), &grants), AuthorizationTier::None);
        for op in Operation::ALL {
            assert_eq!(authorize(&probe(), op, &grants), Decision::Deny);
        }
    }

    #[test]
    fn test_full_access_dominates() {
        let grants = GrantSets::new()
            .with_full_access(probe())
            .with_decrypt_only(probe());
        assert_eq!(resolve_tier(&probe(), &grants), AuthorizationTier::Full);
    }

    #[test]
    fn test_encrypt_and_decrypt_only_compose() {
        let grants = GrantSets::new()
            .with_encrypt_only(probe())
            .with_decrypt_only(probe());
        assert_eq!(resolve_tier(&probe(), &grants), AuthorizationTier::Full);
    }

    #[test]
    fn test_single_tiers() {
        let enc = GrantSets::new().with_encrypt_only(probe());
        assert_eq!(authorize(&probe(), Operation::Encrypt, &enc), Decision::Allow);
        assert_eq!(authorize(&probe(), Operation::Decrypt, &enc), Decision::Deny);

        let dec = GrantSets::new().with_decrypt_only(probe());
        assert_eq!(authorize(&probe(), Operation::Encrypt, &dec), Decision::Deny);
        assert_eq!(authorize(&probe(), Operation::Decrypt, &dec), Decision::Allow);
    }

    #[test]
    fn test_other_principals_unaffected() {
        let other = Principal::new("arn:aws:iam::123456789012:role/other").unwrap();
        let grants = GrantSets::new().with_full_access(other);
        assert_eq!(resolve_tier(&probe(), &grants), AuthorizationTier::None);
    }

    #[test]
    fn test_tier_recomputed_after_revoke() {
        let mut grants = GrantSets::new().with_full_access(probe());
        assert_eq!(resolve_tier(&probe(), &grants), AuthorizationTier::Full);

        grants.revoke(GrantKind::FullAccess, &probe());
        assert_eq!(resolve_tier(&probe(), &grants), AuthorizationTier::None);
    }

    #[test]
    fn test_table_has_every_combination() {
        let table = tier_table();
        assert_eq!(table.len(), 8);
        assert_eq!(table.iter().filter(|r| r.tier == AuthorizationTier::Full).count(), 5);
        assert_eq!(table[0].label(), "none");
        assert_eq!(table[7].label(), "full+encrypt+decrypt");
    }

    #[test]
    fn test_table_rows_agree_with_resolver() {
        for row in tier_table() {
            let grants = row.grants_for(&probe());
            assert_eq!(resolve_tier(&probe(), &grants), row.tier, "row {}", row.label());
        }
    }

    proptest! {
        #[test]
        fn test_adding_grants_never_removes_operations(
            before in any::<(bool, bool, bool)>(),
            extra in any::<(bool, bool, bool)>(),
        ) {
            let lower = AuthorizationTier::from_membership(before.0, before.1, before.2);
            let higher = AuthorizationTier::from_membership(
                before.0 || extra.0,
                before.1 || extra.1,
                before.2 || extra.2,
            );
            for op in Operation::ALL {
                prop_assert!(!lower.permits(op) || higher.permits(op));
            }
        }

        #[test]
        fn test_tier_matches_any_grant_kind(membership in any::<(bool, bool, bool)>()) {
            let tier = AuthorizationTier::from_membership(membership.0, membership.1, membership.2);
            let held: Vec<GrantKind> = GrantKind::ALL
                .into_iter()
                .zip([membership.0, membership.1, membership.2])
                .filter_map(|(kind, on)| on.then_some(kind))
                .collect();
            for op in Operation::ALL {
                prop_assert_eq!(tier.permits(op), held.iter().any(|k| k.permits(op)));
            }
        }
    }
}
