//! # Keygate Permissions
//!
//! Authorization tiers over a single managed key.
//!
//! ## Overview
//!
//! Access to a key is configured with three independent, possibly
//! overlapping grant lists: full access, encrypt-only and decrypt-only. A
//! principal's [`AuthorizationTier`] is a pure function of its membership in
//! those lists, recomputed on every check and never cached.
//!
//! ## Tier Table
//!
//! | full | encrypt-only | decrypt-only | tier |
//! |------|--------------|--------------|------|
//! | no   | no           | no           | `None` |
//! | yes  | any          | any          | `Full` |
//! | no   | yes          | no           | `EncryptOnly` |
//! | no   | no           | yes          | `DecryptOnly` |
//! | no   | yes          | yes          | `Full` |
//!
//! ## Role
//!
//! The key service is the authority. This crate predicts what the service
//! will decide so tests and tooling can construct grant configurations and
//! check the service agrees. It is not an enforcement point.
//!
//! ## Usage
//!
//! ```rust
//! use keygate_core::Principal;
//! use keygate_perms::{authorize, Decision, GrantSets, Operation};
//!
//! let probe = Principal::new("arn:aws:iam::123456789012:role/probe").unwrap();
//! let grants = GrantSets::new().with_encrypt_only(probe.clone());
//!
//! assert_eq!(authorize(&probe, Operation::Encrypt, &grants), Decision::Allow);
//! assert_eq!(authorize(&probe, Operation::Decrypt, &grants), Decision::Deny);
//! ```

pub mod error;
pub mod grant;
pub mod tier;

pub use error::{PermsError, Result};
pub use grant::{GrantKind, GrantSets};
pub use tier::{authorize, resolve_tier, tier_table, AuthorizationTier, Decision, Operation, TierRow};
