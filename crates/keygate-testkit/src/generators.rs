//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keygate_core::{EncryptionContext, Principal};
use keygate_perms::{tier_table, GrantKind, GrantSets, Operation, TierRow};

use crate::TEST_ACCOUNT;

/// Generate plaintext bytes up to `max_len`, including empty.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a non-empty plaintext.
pub fn non_empty_plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Generate a context key outside the reserved namespace.
pub fn context_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,15}".prop_map(String::from)
}

/// Generate a context value. Values may be empty or contain any text.
pub fn context_value() -> impl Strategy<Value = String> {
    "\\PC{0,24}".prop_map(String::from)
}

/// Generate a valid encryption context with up to `max_pairs` pairs.
pub fn encryption_context(max_pairs: usize) -> impl Strategy<Value = EncryptionContext> {
    prop::collection::btree_map(context_key(), context_value(), 0..=max_pairs)
        .prop_map(EncryptionContext::from)
}

/// Generate two contexts that differ.
pub fn distinct_contexts() -> impl Strategy<Value = (EncryptionContext, EncryptionContext)> {
    (encryption_context(4), encryption_context(4)).prop_filter("contexts must differ", |(a, b)| a != b)
}

/// Generate a role principal in the harness account.
pub fn principal() -> impl Strategy<Value = Principal> {
    "[a-z][a-z0-9-]{0,15}".prop_filter_map("valid principal", |name| {
        Principal::new(format!("arn:aws:iam::{TEST_ACCOUNT}:role/{name}")).ok()
    })
}

/// Generate an operation.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![Just(Operation::Encrypt), Just(Operation::Decrypt)]
}

/// Generate a grant kind.
pub fn grant_kind() -> impl Strategy<Value = GrantKind> {
    prop_oneof![
        Just(GrantKind::FullAccess),
        Just(GrantKind::EncryptOnly),
        Just(GrantKind::DecryptOnly),
    ]
}

/// Pick a row of the tier table.
pub fn tier_row() -> impl Strategy<Value = TierRow> {
    prop::sample::select(tier_table())
}

/// Generate grant lists over a small pool of principals, so lists overlap.
pub fn grant_sets() -> impl Strategy<Value = GrantSets> {
    let entry = (grant_kind(), 0usize..4);
    prop::collection::vec(entry, 0..8).prop_map(|entries| {
        let mut grants = GrantSets::new();
        for (kind, index) in entries {
            if let Ok(principal) = Principal::new(format!("arn:aws:iam::{TEST_ACCOUNT}:role/pool-{index}")) {
                grants.grant(kind, principal);
            }
        }
        grants
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_perms::{authorize, resolve_tier};

    proptest! {
        #[test]
        fn generated_contexts_are_valid(context in encryption_context(6)) {
            prop_assert!(context.validate().is_ok());
        }

        #[test]
        fn tier_row_grants_resolve_to_row_tier(row in tier_row(), principal in principal()) {
            let grants = row.grants_for(&principal);
            prop_assert_eq!(resolve_tier(&principal, &grants), row.tier);
        }

        #[test]
        fn authorization_follows_grant_kinds(grants in grant_sets(), index in 0usize..5, op in operation()) {
            let principal = Principal::new(format!("arn:aws:iam::{TEST_ACCOUNT}:role/pool-{index}")).unwrap();
            let expected = grants
                .kinds_for(&principal)
                .iter()
                .any(|kind| kind.permits(op));
            prop_assert_eq!(authorize(&principal, op, &grants).is_allowed(), expected);
        }
    }
}
