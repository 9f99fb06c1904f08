//! Disposable scenario fixtures.
//!
//! Each fixture provisions its own key (and, for [`ProbeRoleFixture`], its
//! own role) and retires it on drop unless the harness is configured to
//! keep it.

use std::sync::Arc;

use tracing::{info, warn};

use keygate::{EncryptionContext, ErrorKind, Gateway, GatewayConfig, RetryConfig};
use keygate_core::Principal;
use keygate_kms::{MemoryKms, ProvisionRequest, ProvisionedKey};
use keygate_perms::{AuthorizationTier, GrantSets, Operation, TierRow};

use crate::{test_principal, HarnessConfig};

/// Gateway settings used by fixtures: quick retries, no default context.
pub fn harness_gateway_config(region: &str) -> GatewayConfig {
    GatewayConfig {
        region: Some(region.to_string()),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
        },
        default_context: EncryptionContext::new(),
    }
}

/// A fresh principal with a random suffix.
pub fn unique_principal(prefix: &str) -> keygate::Result<Principal> {
    let suffix = hex::encode(rand::random::<[u8; 4]>());
    Ok(test_principal(&format!("{prefix}-{suffix}"))?)
}

/// Result of attempting one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation round-tripped and the ciphertext differed from the
    /// plaintext.
    Succeeded,
    /// The operation failed.
    Failed {
        kind: ErrorKind,
        code: Option<&'static str>,
    },
    /// The operation returned, but the round trip did not reproduce the
    /// plaintext or the ciphertext equalled it.
    Corrupted,
}

impl Outcome {
    fn from_error(err: &keygate::GatewayError) -> Self {
        Outcome::Failed {
            kind: err.kind(),
            code: err.code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    /// Whether this is exactly an authorization denial.
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            Outcome::Failed {
                kind: ErrorKind::AuthorizationDenied,
                ..
            }
        )
    }
}

/// What a scenario's principal could do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub label: String,
    pub encrypt: Outcome,
    pub decrypt: Outcome,
}

impl ScenarioReport {
    pub fn outcome(&self, operation: Operation) -> &Outcome {
        match operation {
            Operation::Encrypt => &self.encrypt,
            Operation::Decrypt => &self.decrypt,
        }
    }
}

/// One key whose grant lists place one principal in one tier-table row.
///
/// The harness caller administers the key. Dropping the scenario schedules
/// the key for deletion.
pub struct Scenario {
    kms: Arc<MemoryKms>,
    key: ProvisionedKey,
    principal: Principal,
    admin: Principal,
    row: TierRow,
    region: String,
    keep_after: bool,
}

impl Scenario {
    /// Provision a key for a fresh principal in `row`.
    pub fn provision(kms: &Arc<MemoryKms>, config: &HarnessConfig, row: TierRow) -> keygate::Result<Self> {
        let principal = unique_principal("keygate-probe")?;
        Self::provision_for(kms, config, principal, row)
    }

    /// Provision a key placing `principal` in `row`.
    pub fn provision_for(
        kms: &Arc<MemoryKms>,
        config: &HarnessConfig,
        principal: Principal,
        row: TierRow,
    ) -> keygate::Result<Self> {
        let request = ProvisionRequest::new(config.region.clone(), config.caller.clone())
            .with_grants(&row.grants_for(&principal))
            .with_description(format!("keygate scenario {}", row.label()));
        let key = kms.provision_key(&request)?;
        info!(key = %key.arn, %principal, row = %row.label(), "provisioned scenario");

        Ok(Self {
            kms: Arc::clone(kms),
            key,
            principal,
            admin: config.caller.clone(),
            row,
            region: config.region.clone(),
            keep_after: config.keep_after,
        })
    }

    pub fn key(&self) -> &ProvisionedKey {
        &self.key
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn row(&self) -> TierRow {
        self.row
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// The grant lists the key was provisioned with.
    pub fn grants(&self) -> GrantSets {
        self.row.grants_for(&self.principal)
    }

    /// A gateway acting directly as the scenario principal.
    pub fn gateway(&self) -> keygate::Result<Gateway> {
        self.gateway_as(self.principal.clone())
    }

    /// A gateway acting as the key administrator.
    pub fn admin_gateway(&self) -> keygate::Result<Gateway> {
        self.gateway_as(self.admin.clone())
    }

    fn gateway_as(&self, principal: Principal) -> keygate::Result<Gateway> {
        let client = Arc::new(self.kms.client_as(principal, self.region.clone()));
        Gateway::new(self.key.arn.as_str(), client, harness_gateway_config(&self.region))
    }

    /// Attempt both operations as the scenario principal.
    ///
    /// The decrypt attempt uses a message the administrator encrypted, so
    /// it is independent of whether the principal can encrypt. Errors are
    /// only returned when that setup fails.
    pub async fn exercise(&self, plaintext: &[u8]) -> keygate::Result<ScenarioReport> {
        let label = self.row.label();
        let context = EncryptionContext::new().with("scenario", label.clone());
        let admin = self.admin_gateway()?;
        let gateway = self.gateway()?;

        let encrypt = match gateway.encrypt(plaintext, Some(&context)).await {
            Ok(message) if message == plaintext => Outcome::Corrupted,
            Ok(message) => match admin.decrypt(&message, Some(&context)).await {
                Ok(recovered) if recovered == plaintext => Outcome::Succeeded,
                Ok(_) => Outcome::Corrupted,
                Err(err) => Outcome::from_error(&err),
            },
            Err(err) => Outcome::from_error(&err),
        };

        let sealed = admin.encrypt(plaintext, Some(&context)).await?;
        let decrypt = match gateway.decrypt(&sealed, Some(&context)).await {
            Ok(recovered) if recovered == plaintext => Outcome::Succeeded,
            Ok(_) => Outcome::Corrupted,
            Err(err) => Outcome::from_error(&err),
        };

        Ok(ScenarioReport {
            label,
            encrypt,
            decrypt,
        })
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        if self.keep_after {
            info!(key = %self.key.arn, "keeping scenario key");
            return;
        }
        if let Err(err) = self.kms.schedule_key_deletion(&self.key.arn) {
            warn!(key = %self.key.arn, error = %err, "scenario teardown failed");
        }
    }
}

/// A role trusted by the harness caller, with full access to its own key.
///
/// The end-to-end path: assume the role, build a client from the
/// temporary credentials, and use it through a gateway. Dropping the
/// fixture deletes the role, then retires the key.
pub struct ProbeRoleFixture {
    scenario: Scenario,
    caller: Principal,
}

impl ProbeRoleFixture {
    pub fn provision(kms: &Arc<MemoryKms>, config: &HarnessConfig) -> keygate::Result<Self> {
        let role = unique_principal("keygate-probe-role")?;
        kms.create_role(role.clone(), [config.caller.clone()])?;

        let row = TierRow {
            full_access: true,
            encrypt_only: false,
            decrypt_only: false,
            tier: AuthorizationTier::from_membership(true, false, false),
        };
        let scenario = match Scenario::provision_for(kms, config, role.clone(), row) {
            Ok(scenario) => scenario,
            Err(err) => {
                let _ = kms.delete_role(&role);
                return Err(err);
            }
        };

        Ok(Self {
            scenario,
            caller: config.caller.clone(),
        })
    }

    pub fn role(&self) -> &Principal {
        &self.scenario.principal
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// A gateway acting as the role through assumed credentials.
    pub async fn gateway(&self) -> keygate::Result<Gateway> {
        let kms = &self.scenario.kms;
        let provider = kms.credential_provider(self.caller.clone());
        Gateway::with_assumed_role(
            self.scenario.key.arn.as_str(),
            self.role(),
            &provider,
            kms,
            harness_gateway_config(&self.scenario.region),
        )
        .await
    }
}

impl Drop for ProbeRoleFixture {
    fn drop(&mut self) {
        if self.scenario.keep_after {
            info!(role = %self.role(), "keeping probe role");
            return;
        }
        if let Err(err) = self.scenario.kms.delete_role(self.role()) {
            warn!(role = %self.role(), error = %err, "probe role teardown failed");
        }
    }
}
