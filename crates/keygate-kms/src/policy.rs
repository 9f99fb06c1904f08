//! Server-side key policy.
//!
//! This is what the key service itself enforces. It is built once, at
//! provisioning time, from the grant lists and evaluated on every request.
//! The client-side oracle in `keygate-perms` predicts the same decisions
//! from the same lists; the verification harness checks that they agree.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use keygate_core::Principal;
use keygate_perms::{Decision, GrantKind, GrantSets, Operation};

/// An action named in a key policy statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KmsAction {
    GenerateDataKey,
    Encrypt,
    Decrypt,
    ReEncrypt,
    DescribeKey,
}

impl KmsAction {
    /// Every action.
    pub const ALL: [KmsAction; 5] = [
        KmsAction::GenerateDataKey,
        KmsAction::Encrypt,
        KmsAction::Decrypt,
        KmsAction::ReEncrypt,
        KmsAction::DescribeKey,
    ];

    /// The actions a gateway operation needs.
    ///
    /// Encrypting a message generates (or wraps) a data key; decrypting one
    /// unwraps it.
    pub fn required_for(operation: Operation) -> &'static [KmsAction] {
        match operation {
            Operation::Encrypt => &[KmsAction::GenerateDataKey, KmsAction::Encrypt],
            Operation::Decrypt => &[KmsAction::Decrypt],
        }
    }

    /// Actions granted by one grant list.
    pub fn granted_by(kind: GrantKind) -> &'static [KmsAction] {
        match kind {
            GrantKind::FullAccess => &KmsAction::ALL,
            GrantKind::EncryptOnly => &[
                KmsAction::GenerateDataKey,
                KmsAction::Encrypt,
                KmsAction::ReEncrypt,
                KmsAction::DescribeKey,
            ],
            GrantKind::DecryptOnly => &[KmsAction::Decrypt, KmsAction::DescribeKey],
        }
    }
}

impl fmt::Display for KmsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KmsAction::GenerateDataKey => "GenerateDataKey",
            KmsAction::Encrypt => "Encrypt",
            KmsAction::Decrypt => "Decrypt",
            KmsAction::ReEncrypt => "ReEncrypt",
            KmsAction::DescribeKey => "DescribeKey",
        };
        write!(f, "kms:{name}")
    }
}

/// One allow statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// Statement id.
    pub sid: String,
    /// Principals the statement applies to.
    pub principals: BTreeSet<Principal>,
    /// Actions allowed.
    pub actions: BTreeSet<KmsAction>,
}

impl PolicyStatement {
    fn matches(&self, principal: &Principal, action: KmsAction) -> bool {
        self.actions.contains(&action) && self.principals.contains(principal)
    }
}

/// A key policy: a list of allow statements. Anything not allowed is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub statements: Vec<PolicyStatement>,
}

impl KeyPolicy {
    /// Build the policy for a key from its admin and grant lists.
    ///
    /// Empty lists produce no statement.
    pub fn from_grants(admin: &Principal, grants: &GrantSets) -> Self {
        let mut statements = vec![PolicyStatement {
            sid: "KeyAdministration".into(),
            principals: BTreeSet::from([admin.clone()]),
            actions: KmsAction::ALL.into_iter().collect(),
        }];

        for kind in GrantKind::ALL {
            let principals = grants.list(kind);
            if principals.is_empty() {
                continue;
            }
            let sid = match kind {
                GrantKind::FullAccess => "AllowFullAccess",
                GrantKind::EncryptOnly => "AllowEncryptOnly",
                GrantKind::DecryptOnly => "AllowDecryptOnly",
            };
            statements.push(PolicyStatement {
                sid: sid.into(),
                principals: principals.clone(),
                actions: KmsAction::granted_by(kind).iter().copied().collect(),
            });
        }

        Self { statements }
    }

    /// Evaluate a single action.
    pub fn evaluate(&self, principal: &Principal, action: KmsAction) -> Decision {
        Decision::from(self.statements.iter().any(|s| s.matches(principal, action)))
    }

    /// Evaluate a gateway operation: every required action must be allowed.
    pub fn evaluate_operation(&self, principal: &Principal, operation: Operation) -> Decision {
        Decision::from(
            KmsAction::required_for(operation)
                .iter()
                .all(|action| self.evaluate(principal, *action).is_allowed()),
        )
    }

    /// Render as pretty JSON, for logs and provisioning output.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_perms::{authorize, tier_table};
    use proptest::prelude::*;

    fn principal(name: &str) -> Principal {
        Principal::new(format!("arn:aws:iam::123456789012:role/{name}")).unwrap()
    }

    #[test]
    fn test_admin_allowed_everything() {
        let admin = principal("admin");
        let policy = KeyPolicy::from_grants(&admin, &GrantSets::new());
        for action in KmsAction::ALL {
            assert_eq!(policy.evaluate(&admin, action), Decision::Allow);
        }
        assert_eq!(policy.statements.len(), 1);
    }

    #[test]
    fn test_unlisted_principal_denied() {
        let policy = KeyPolicy::from_grants(&principal("admin"), &GrantSets::new());
        for action in KmsAction::ALL {
            assert_eq!(policy.evaluate(&principal("stranger"), action), Decision::Deny);
        }
    }

    #[test]
    fn test_encrypt_only_cannot_decrypt() {
        let writer = principal("writer");
        let grants = GrantSets::new().with_encrypt_only(writer.clone());
        let policy = KeyPolicy::from_grants(&principal("admin"), &grants);

        assert_eq!(policy.evaluate(&writer, KmsAction::GenerateDataKey), Decision::Allow);
        assert_eq!(policy.evaluate(&writer, KmsAction::Decrypt), Decision::Deny);
    }

    #[test]
    fn test_policy_agrees_with_oracle_on_every_row() {
        let probe = principal("probe");
        let admin = principal("admin");
        for row in tier_table() {
            let grants = row.grants_for(&probe);
            let policy = KeyPolicy::from_grants(&admin, &grants);
            for op in Operation::ALL {
                assert_eq!(
                    policy.evaluate_operation(&probe, op),
                    authorize(&probe, op, &grants),
                    "row {} op {}",
                    row.label(),
                    op
                );
            }
        }
    }

    #[test]
    fn test_action_display() {
        assert_eq!(KmsAction::GenerateDataKey.to_string(), "kms:GenerateDataKey");
    }

    #[test]
    fn test_json_rendering() {
        let grants = GrantSets::new().with_decrypt_only(principal("reader"));
        let json = KeyPolicy::from_grants(&principal("admin"), &grants).to_json();
        assert!(json.contains("AllowDecryptOnly"));
        assert!(json.contains("role/reader"));
    }

    fn pool(index: usize) -> Principal {
        principal(&format!("pool-{index}"))
    }

    proptest! {
        #[test]
        fn policy_agrees_with_oracle_on_overlapping_lists(
            entries in prop::collection::vec((0usize..3, 0usize..4), 0..10),
            index in 0usize..5,
        ) {
            let mut grants = GrantSets::new();
            for (kind, who) in entries {
                grants.grant(GrantKind::ALL[kind], pool(who));
            }
            let policy = KeyPolicy::from_grants(&principal("admin"), &grants);
            let probe = pool(index);
            for op in Operation::ALL {
                prop_assert_eq!(policy.evaluate_operation(&probe, op), authorize(&probe, op, &grants));
            }
        }
    }
}
