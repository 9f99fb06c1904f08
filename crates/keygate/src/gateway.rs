//! The Gateway: encrypt and decrypt bytes under one managed key.
//!
//! A gateway binds a [`KmsKeyring`] to a [`GatewayConfig`]. The key service
//! client can be injected directly, or built from credentials obtained by
//! assuming a role. Both paths produce the same gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use keygate_core::{EncryptionContext, KeyHandle, Principal};
use keygate_kms::{CredentialProvider, KeyService, KeyServiceConnector};

use crate::config::GatewayConfig;
use crate::envelope;
use crate::error::{GatewayError, Result};
use crate::keyring::{Keyring, KmsKeyring};
use crate::message::Message;
use crate::retry::RetryPolicy;

/// Envelope encryption over a single remote key.
#[derive(Debug, Clone)]
pub struct Gateway {
    keyring: KmsKeyring,
    config: GatewayConfig,
    /// Expiry of assumed-role credentials, if the client was built from them.
    session_expires_at: Option<Instant>,
}

impl Gateway {
    /// Create a gateway using a caller-built client.
    pub fn new(key_handle: &str, client: Arc<dyn KeyService>, config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        if let Some(region) = &config.region {
            if region != client.region() {
                return Err(GatewayError::Configuration(format!(
                    "config region {region} does not match client region {}",
                    client.region()
                )));
            }
        }

        let keyring = KmsKeyring::new(key_handle, client)?
            .with_retry(RetryPolicy::from_config(&config.retry));
        debug!(key = %keyring.key_handle(), region = keyring.region(), "gateway ready");

        Ok(Self {
            keyring,
            config,
            session_expires_at: None,
        })
    }

    /// Create a gateway acting as `role`.
    ///
    /// The caller of `provider` must be trusted by the role. The client
    /// targets `config.region`, or the key handle's region when unset.
    pub async fn with_assumed_role(
        key_handle: &str,
        role: &Principal,
        provider: &dyn CredentialProvider,
        connector: &dyn KeyServiceConnector,
        config: GatewayConfig,
    ) -> Result<Self> {
        config.validate()?;
        let handle = KeyHandle::parse(key_handle)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        let region = config
            .region
            .clone()
            .or_else(|| handle.region().map(str::to_string))
            .ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "no region configured and {handle} does not name one"
                ))
            })?;

        let credentials = provider.assume_role(role).await?;
        info!(
            %role,
            session = %credentials.session_name,
            expires_in_s = credentials.remaining().as_secs(),
            "assumed role"
        );
        let client = connector.connect(&credentials, &region)?;

        let mut gateway = Self::new(key_handle, client, config)?;
        gateway.session_expires_at = Some(credentials.expires_at);
        Ok(gateway)
    }

    /// Encrypt `plaintext` and return the serialized message.
    ///
    /// `context` is layered over the configured default context; `None`
    /// means no caller context.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        context: Option<&EncryptionContext>,
    ) -> Result<Vec<u8>> {
        let context = self.effective_context(context);
        let message = envelope::encrypt(plaintext, &self.keyring, &context).await?;
        message.to_bytes()
    }

    /// Parse and decrypt a serialized message.
    ///
    /// The effective context must equal the one the message was encrypted
    /// under.
    pub async fn decrypt(
        &self,
        message: &[u8],
        context: Option<&EncryptionContext>,
    ) -> Result<Vec<u8>> {
        let message = Message::from_bytes(message)?;
        let context = self.effective_context(context);
        envelope::decrypt(&message, &self.keyring, &context).await
    }

    pub fn keyring(&self) -> &KmsKeyring {
        &self.keyring
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Time left on assumed-role credentials. `None` for injected clients.
    pub fn session_remaining(&self) -> Option<Duration> {
        self.session_expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn effective_context(&self, context: Option<&EncryptionContext>) -> EncryptionContext {
        match context {
            Some(context) => context.merged_over(&self.config.default_context),
            None => self.config.default_context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use keygate_kms::{MemoryKms, ProvisionRequest, ProvisionedKey};
    use keygate_perms::GrantSets;

    const REGION: &str = "us-west-1";

    fn principal(name: &str) -> Principal {
        Principal::new(format!("arn:aws:iam::111122223333:role/{name}")).unwrap()
    }

    fn setup(grants: GrantSets) -> (Arc<MemoryKms>, ProvisionedKey) {
        let kms = Arc::new(MemoryKms::new());
        let key = kms
            .provision_key(&ProvisionRequest::new(REGION, principal("admin")).with_grants(&grants))
            .unwrap();
        (kms, key)
    }

    fn gateway_as(kms: &Arc<MemoryKms>, key: &ProvisionedKey, name: &str, config: GatewayConfig) -> Gateway {
        let client = Arc::new(kms.client_as(principal(name), REGION));
        Gateway::new(key.arn.as_str(), client, config).unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_without_context() {
        let (kms, key) = setup(GrantSets::new().with_full_access(principal("app")));
        let gateway = gateway_as(&kms, &key, "app", GatewayConfig::default());

        let ciphertext = gateway.encrypt(b"Hello world", None).await.unwrap();
        assert_ne!(ciphertext, b"Hello world");
        assert_eq!(gateway.decrypt(&ciphertext, None).await.unwrap(), b"Hello world");
        assert_eq!(gateway.session_remaining(), None);
    }

    #[tokio::test]
    async fn test_default_context_layered_under_caller_context() {
        let (kms, key) = setup(GrantSets::new().with_full_access(principal("app")));
        let config = GatewayConfig {
            default_context: EncryptionContext::new().with("app", "billing"),
            ..GatewayConfig::default()
        };
        let gateway = gateway_as(&kms, &key, "app", config);

        let caller = EncryptionContext::new().with("invoice", "42");
        let ciphertext = gateway.encrypt(b"total: 10", Some(&caller)).await.unwrap();

        let message = Message::from_bytes(&ciphertext).unwrap();
        assert_eq!(message.context().get("app"), Some("billing"));
        assert_eq!(message.context().get("invoice"), Some("42"));

        assert_eq!(gateway.decrypt(&ciphertext, Some(&caller)).await.unwrap(), b"total: 10");

        // A gateway without the default must supply the full context.
        let plain = gateway_as(&kms, &key, "app", GatewayConfig::default());
        let err = plain.decrypt(&ciphertext, Some(&caller)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContextMismatch);
        let full = caller.merged_over(&EncryptionContext::new().with("app", "billing"));
        assert_eq!(plain.decrypt(&ciphertext, Some(&full)).await.unwrap(), b"total: 10");
    }

    #[test]
    fn test_region_mismatch_is_configuration_error() {
        let (kms, key) = setup(GrantSets::new());
        let client = Arc::new(kms.client_as(principal("app"), REGION));
        let config = GatewayConfig {
            region: Some("eu-central-1".into()),
            ..GatewayConfig::default()
        };

        let err = Gateway::new(key.arn.as_str(), client, config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_retry_config_applied() {
        let (kms, key) = setup(GrantSets::new());
        let mut config = GatewayConfig::default();
        config.retry.max_attempts = 3;
        let gateway = gateway_as(&kms, &key, "app", config);
        assert_eq!(gateway.keyring().retry().max_attempts(), 3);
    }

    #[tokio::test]
    async fn test_assumed_role_path() {
        let (kms, key) = setup(GrantSets::new().with_full_access(principal("probe")));
        kms.create_role(principal("probe"), [principal("ci-runner")]).unwrap();

        let provider = kms.credential_provider(principal("ci-runner"));
        let gateway = Gateway::with_assumed_role(
            key.arn.as_str(),
            &principal("probe"),
            &provider,
            &kms,
            GatewayConfig::default(),
        )
        .await
        .unwrap();

        assert!(gateway.session_remaining().is_some());
        assert_eq!(gateway.keyring().region(), REGION);

        let ciphertext = gateway.encrypt(b"Hello world", None).await.unwrap();
        assert_eq!(gateway.decrypt(&ciphertext, None).await.unwrap(), b"Hello world");
    }

    #[tokio::test]
    async fn test_untrusted_caller_cannot_assume_role() {
        let (kms, key) = setup(GrantSets::new().with_full_access(principal("probe")));
        kms.create_role(principal("probe"), [principal("ci-runner")]).unwrap();

        let provider = kms.credential_provider(principal("intruder"));
        let err = Gateway::with_assumed_role(
            key.arn.as_str(),
            &principal("probe"),
            &provider,
            &kms,
            GatewayConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
    }

    #[tokio::test]
    async fn test_alias_without_region_needs_config_region() {
        let (kms, _) = setup(GrantSets::new());
        let provider = kms.credential_provider(principal("ci-runner"));

        let err = Gateway::with_assumed_role(
            "alias/payments",
            &principal("probe"),
            &provider,
            &kms,
            GatewayConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(kms.request_count(), 0);
    }
}
