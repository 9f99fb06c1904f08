//! # Keygate
//!
//! Envelope encryption over a remote key-management service, with tiered
//! authorization on a single managed key.
//!
//! ## Overview
//!
//! - **Keyring**: produces one fresh data key per message and protects it
//!   with the remote key
//! - **Envelope engine**: committing encryption of the payload, bound to an
//!   authenticated encryption context
//! - **Message**: a self-describing, tamper-evident serialized form
//! - **Gateway**: the configured entry point, built from an injected client
//!   or from assumed-role credentials
//!
//! Whether a principal may encrypt or decrypt is decided by the key
//! service. [`perms`] holds the pure tier resolver used to predict it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keygate::core::{EncryptionContext, Principal};
//! use keygate::kms::{MemoryKms, ProvisionRequest};
//! use keygate::perms::GrantSets;
//! use keygate::{Gateway, GatewayConfig};
//!
//! async fn example() -> keygate::Result<()> {
//!     let kms = Arc::new(MemoryKms::new());
//!     let app = Principal::new("arn:aws:iam::111122223333:role/app")?;
//!     let admin = Principal::new("arn:aws:iam::111122223333:role/admin")?;
//!
//!     let key = kms.provision_key(
//!         &ProvisionRequest::new("us-west-1", admin)
//!             .with_grants(&GrantSets::new().with_full_access(app.clone())),
//!     )?;
//!
//!     let client = Arc::new(kms.client_as(app, "us-west-1"));
//!     let gateway = Gateway::new(key.arn.as_str(), client, GatewayConfig::default())?;
//!
//!     let context = EncryptionContext::new().with("purpose", "example");
//!     let message = gateway.encrypt(b"Hello world", Some(&context)).await?;
//!     let plaintext = gateway.decrypt(&message, Some(&context)).await?;
//!     assert_eq!(plaintext, b"Hello world");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keygate::core` - Primitives (KeyHandle, EncryptionContext, DataKey, ...)
//! - `keygate::kms` - Key service boundary and the in-memory service
//! - `keygate::perms` - Authorization tiers and grant lists

pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod keyring;
pub mod message;
pub mod retry;

// Re-export component crates
pub use keygate_core as core;
pub use keygate_kms as kms;
pub use keygate_perms as perms;

// Re-export main types for convenience
pub use config::{GatewayConfig, RetryConfig};
pub use envelope::{decrypt, encrypt};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::Gateway;
pub use keyring::{EncryptedDataKey, Keyring, KmsKeyring, PROVIDER_ID};
pub use message::{Message, MESSAGE_VERSION};
pub use retry::RetryPolicy;

// Re-export commonly used core types
pub use keygate_core::{AlgorithmSuite, EncryptionContext, KeyHandle, Principal};
