//! # Keygate KMS
//!
//! The remote key service boundary. Provides the [`KeyService`] trait the
//! gateway calls, and [`MemoryKms`], an in-process service with real policy
//! evaluation used by tests and local development.
//!
//! ## Key Types
//!
//! - [`KeyService`] - `GenerateDataKey`, `Encrypt`, `Decrypt`, `DescribeKey`
//! - [`KeyServiceError`] - remote error classes with stable codes
//! - [`KeyPolicy`] - the server-side policy attached to a key
//! - [`CredentialProvider`] / [`Credentials`] - role assumption
//! - [`ProvisionRequest`] / [`ProvisionedKey`] - declarative key provisioning
//! - [`MemoryKms`] / [`MemoryKmsClient`] - the in-memory service and its clients
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keygate_core::{EncryptionContext, Principal};
//! use keygate_kms::{KeyService, MemoryKms, ProvisionRequest};
//! use keygate_perms::GrantSets;
//!
//! async fn example() {
//!     let kms = Arc::new(MemoryKms::new());
//!     let admin = Principal::new("arn:aws:iam::111122223333:role/admin").unwrap();
//!     let app = Principal::new("arn:aws:iam::111122223333:role/app").unwrap();
//!
//!     let key = kms
//!         .provision_key(
//!             &ProvisionRequest::new("us-west-1", admin)
//!                 .with_grants(&GrantSets::new().with_full_access(app.clone())),
//!         )
//!         .unwrap();
//!
//!     let client = kms.client_as(app, "us-west-1");
//!     let generated = client
//!         .generate_data_key(&key.arn, &EncryptionContext::new())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Denials are final**: `AccessDeniedException` is never retryable
//! - **Context binding**: wrapped data keys authenticate the encryption context
//! - **Region binding**: a client only sees keys in its own region

pub mod credentials;
pub mod error;
pub mod memory;
pub mod policy;
pub mod provision;
pub mod traits;

pub use credentials::{CredentialProvider, Credentials, SecretKey, DEFAULT_SESSION_DURATION};
pub use error::{KeyServiceError, Result};
pub use memory::{FaultKind, MemoryCredentialProvider, MemoryKms, MemoryKmsClient};
pub use policy::{KeyPolicy, KmsAction, PolicyStatement};
pub use provision::{ProvisionRequest, ProvisionedKey};
pub use traits::{
    DecryptedKey, EncryptedKey, GeneratedDataKey, KeyMetadata, KeyService, KeyServiceConnector,
    KeyState,
};
