//! In-memory implementation of the KeyService trait.
//!
//! Behaves like a remote key service for one account: keys live in regions,
//! every request is checked against the key's policy, wrapped data keys are
//! authenticated against the encryption context, and roles can be assumed
//! for temporary credentials. Nothing is persisted.
//!
//! Faults and latency can be injected so retry and cancellation paths are
//! testable.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;
use tokio::time::Instant;
use tracing::{debug, info};

use keygate_core::{
    ContentKey, DataKey, EncryptionContext, EncryptionNonce, KeyHandle, KeyResource, Principal,
    NONCE_LEN,
};
use keygate_perms::GrantSets;

use crate::credentials::{session_name_for, CredentialProvider, Credentials, SecretKey};
use crate::error::{KeyServiceError, Result};
use crate::policy::{KeyPolicy, KmsAction};
use crate::provision::{ProvisionRequest, ProvisionedKey};
use crate::traits::{
    DecryptedKey, EncryptedKey, GeneratedDataKey, KeyMetadata, KeyService, KeyServiceConnector,
    KeyState,
};

/// Account id used by [`MemoryKms::new`].
pub const DEFAULT_ACCOUNT: &str = "111122223333";

const BLOB_VERSION: u8 = 1;

/// Kind of transient fault to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Throttling,
    Internal,
    Timeout,
}

impl FaultKind {
    fn to_error(self) -> KeyServiceError {
        match self {
            FaultKind::Throttling => KeyServiceError::Throttling("Rate exceeded".into()),
            FaultKind::Internal => KeyServiceError::Internal("injected internal fault".into()),
            FaultKind::Timeout => {
                KeyServiceError::DependencyTimeout("injected dependency timeout".into())
            }
        }
    }
}

/// In-memory key service.
///
/// Shared between clients through an `Arc`. Thread-safe via RwLock.
pub struct MemoryKms {
    partition: String,
    account: String,
    inner: RwLock<MemoryKmsInner>,
}

struct MemoryKmsInner {
    /// Keys indexed by key id.
    keys: HashMap<String, StoredKey>,

    /// Alias index: (region, alias name) -> key id.
    aliases: HashMap<(String, String), String>,

    /// Roles and the principals trusted to assume them.
    roles: HashMap<Principal, BTreeSet<Principal>>,

    /// Live sessions indexed by session token.
    sessions: HashMap<String, Session>,

    /// Pending transient faults.
    faults_remaining: u32,
    fault_kind: FaultKind,

    /// Delay applied before every request.
    latency: Duration,

    /// Requests received, including faulted ones.
    requests: u64,
}

struct StoredKey {
    key_id: String,
    arn: KeyHandle,
    region: String,
    admin: Principal,
    kek: ContentKey,
    policy: KeyPolicy,
    state: KeyState,
    description: String,
}

struct Session {
    principal: Principal,
    expires_at: Instant,
}

/// The key material and identity needed to serve one request.
struct Authorized {
    key_id: String,
    arn: KeyHandle,
    kek: ContentKey,
}

impl MemoryKms {
    /// Create an empty service for the default account.
    pub fn new() -> Self {
        Self::with_account(DEFAULT_ACCOUNT)
    }

    /// Create an empty service for `account` (12 digits).
    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            partition: "aws".into(),
            account: account.into(),
            inner: RwLock::new(MemoryKmsInner {
                keys: HashMap::new(),
                aliases: HashMap::new(),
                roles: HashMap::new(),
                sessions: HashMap::new(),
                faults_remaining: 0,
                fault_kind: FaultKind::Throttling,
                latency: Duration::ZERO,
                requests: 0,
            }),
        }
    }

    /// The account this service owns.
    pub fn account(&self) -> &str {
        &self.account
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryKmsInner>> {
        self.inner
            .read()
            .map_err(|_| KeyServiceError::Internal("key store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryKmsInner>> {
        self.inner
            .write()
            .map_err(|_| KeyServiceError::Internal("key store lock poisoned".into()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clients
    // ─────────────────────────────────────────────────────────────────────────

    /// A client acting directly as `principal` in `region`.
    pub fn client_as(self: &Arc<Self>, principal: Principal, region: impl Into<String>) -> MemoryKmsClient {
        MemoryKmsClient {
            service: Arc::clone(self),
            principal,
            region: region.into(),
            session_token: None,
        }
    }

    /// A client acting with assumed-role credentials in `region`.
    pub fn client_for_credentials(
        self: &Arc<Self>,
        credentials: &Credentials,
        region: impl Into<String>,
    ) -> Result<MemoryKmsClient> {
        let inner = self.read()?;
        let valid = inner
            .sessions
            .get(&credentials.session_token)
            .is_some_and(|s| s.principal == credentials.principal);
        if !valid {
            return Err(KeyServiceError::AccessDenied(
                "The security token included in the request is invalid".into(),
            ));
        }

        Ok(MemoryKmsClient {
            service: Arc::clone(self),
            principal: credentials.principal.clone(),
            region: region.into(),
            session_token: Some(credentials.session_token.clone()),
        })
    }

    /// A credential provider acting as `caller`.
    pub fn credential_provider(self: &Arc<Self>, caller: Principal) -> MemoryCredentialProvider {
        MemoryCredentialProvider {
            service: Arc::clone(self),
            caller,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provisioning
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a key with a policy built from the request's grant lists.
    pub fn provision_key(&self, request: &ProvisionRequest) -> Result<ProvisionedKey> {
        request.validate()?;

        let key_id = new_key_id();
        let arn = KeyHandle::key_arn(&self.partition, &request.region, &self.account, &key_id)
            .map_err(|e| KeyServiceError::Validation(e.to_string()))?;
        let policy = KeyPolicy::from_grants(&request.admin, &request.grants());

        let mut inner = self.write()?;

        let alias = match &request.alias {
            Some(name) => {
                let index = (request.region.clone(), name.clone());
                if inner.aliases.contains_key(&index) {
                    return Err(KeyServiceError::Validation(format!(
                        "alias/{name} already exists in {}",
                        request.region
                    )));
                }
                inner.aliases.insert(index, key_id.clone());
                Some(
                    KeyHandle::parse(&format!("alias/{name}"))
                        .map_err(|e| KeyServiceError::Validation(e.to_string()))?,
                )
            }
            None => None,
        };

        inner.keys.insert(
            key_id.clone(),
            StoredKey {
                key_id: key_id.clone(),
                arn: arn.clone(),
                region: request.region.clone(),
                admin: request.admin.clone(),
                kek: ContentKey::generate(),
                policy,
                state: KeyState::Enabled,
                description: request.description.clone(),
            },
        );

        info!(key = %arn, region = %request.region, "provisioned key");

        Ok(ProvisionedKey {
            key_id,
            arn,
            region: request.region.clone(),
            alias,
        })
    }

    /// Replace a key's grant lists. The admin statement is kept.
    pub fn update_grants(&self, key: &KeyHandle, grants: &GrantSets) -> Result<()> {
        let mut inner = self.write()?;
        let key_id = resolve_any(&inner, key)?;
        let stored = inner.keys.get_mut(&key_id).ok_or_else(|| not_found(key))?;
        stored.policy = KeyPolicy::from_grants(&stored.admin, grants);
        info!(key = %stored.arn, "updated key policy");
        Ok(())
    }

    /// The policy currently attached to a key.
    pub fn key_policy(&self, key: &KeyHandle) -> Result<KeyPolicy> {
        let inner = self.read()?;
        let key_id = resolve_any(&inner, key)?;
        inner
            .keys
            .get(&key_id)
            .map(|k| k.policy.clone())
            .ok_or_else(|| not_found(key))
    }

    /// Lifecycle state of a key.
    pub fn key_state(&self, key: &KeyHandle) -> Result<KeyState> {
        let inner = self.read()?;
        let key_id = resolve_any(&inner, key)?;
        inner
            .keys
            .get(&key_id)
            .map(|k| k.state)
            .ok_or_else(|| not_found(key))
    }

    pub fn disable_key(&self, key: &KeyHandle) -> Result<()> {
        self.set_state(key, KeyState::Disabled)
    }

    pub fn enable_key(&self, key: &KeyHandle) -> Result<()> {
        self.set_state(key, KeyState::Enabled)
    }

    /// Retire a key. Its aliases are removed and every later request fails.
    pub fn schedule_key_deletion(&self, key: &KeyHandle) -> Result<()> {
        let mut inner = self.write()?;
        let key_id = resolve_any(&inner, key)?;
        inner.aliases.retain(|_, target| *target != key_id);
        if let Some(stored) = inner.keys.get_mut(&key_id) {
            stored.state = KeyState::PendingDeletion;
            info!(key = %stored.arn, "scheduled key deletion");
        }
        Ok(())
    }

    fn set_state(&self, key: &KeyHandle, state: KeyState) -> Result<()> {
        let mut inner = self.write()?;
        let key_id = resolve_any(&inner, key)?;
        let stored = inner.keys.get_mut(&key_id).ok_or_else(|| not_found(key))?;
        if stored.state == KeyState::PendingDeletion {
            return Err(KeyServiceError::Disabled(format!("{} is pending deletion", stored.arn)));
        }
        stored.state = state;
        info!(key = %stored.arn, ?state, "changed key state");
        Ok(())
    }

    /// Keys not pending deletion.
    pub fn live_key_count(&self) -> usize {
        self.read()
            .map(|inner| {
                inner
                    .keys
                    .values()
                    .filter(|k| k.state != KeyState::PendingDeletion)
                    .count()
            })
            .unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a role assumable by `trusted` principals.
    pub fn create_role(
        &self,
        role: Principal,
        trusted: impl IntoIterator<Item = Principal>,
    ) -> Result<()> {
        let mut inner = self.write()?;
        if inner.roles.contains_key(&role) {
            return Err(KeyServiceError::Validation(format!("role {role} already exists")));
        }
        info!(%role, "created role");
        inner.roles.insert(role, trusted.into_iter().collect());
        Ok(())
    }

    /// Delete a role and revoke its sessions.
    pub fn delete_role(&self, role: &Principal) -> Result<()> {
        let mut inner = self.write()?;
        if inner.roles.remove(role).is_none() {
            return Err(KeyServiceError::NotFound(format!("role {role}")));
        }
        inner.sessions.retain(|_, s| s.principal != *role);
        info!(%role, "deleted role");
        Ok(())
    }

    fn issue_credentials(
        &self,
        caller: &Principal,
        role: &Principal,
        duration: Duration,
    ) -> Result<Credentials> {
        let mut inner = self.write()?;
        let trusted = inner
            .roles
            .get(role)
            .ok_or_else(|| KeyServiceError::NotFound(format!("role {role}")))?;

        if !trusted.contains(caller) {
            debug!(%caller, %role, "assume role denied");
            return Err(KeyServiceError::AccessDenied(format!(
                "User: {caller} is not authorized to perform: sts:AssumeRole on resource: {role}"
            )));
        }

        let expires_at = Instant::now() + duration;
        let session_token = random_hex(32);
        inner.sessions.insert(
            session_token.clone(),
            Session {
                principal: role.clone(),
                expires_at,
            },
        );

        let session_name = session_name_for(caller);
        debug!(%caller, %role, %session_name, "assumed role");

        Ok(Credentials {
            principal: role.clone(),
            session_name,
            access_key_id: format!("ASIA{}", random_hex(8).to_uppercase()),
            secret_access_key: SecretKey::generate(),
            session_token,
            expires_at,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fault Injection
    // ─────────────────────────────────────────────────────────────────────────

    /// Fail the next `count` requests with a transient fault.
    pub fn inject_faults(&self, count: u32, kind: FaultKind) {
        if let Ok(mut inner) = self.write() {
            inner.faults_remaining = count;
            inner.fault_kind = kind;
        }
    }

    /// Delay every request by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut inner) = self.write() {
            inner.latency = latency;
        }
    }

    /// Requests received so far.
    pub fn request_count(&self) -> u64 {
        self.read().map(|inner| inner.requests).unwrap_or(0)
    }

    fn latency(&self) -> Result<Duration> {
        Ok(self.read()?.latency)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request Handling
    // ─────────────────────────────────────────────────────────────────────────

    /// Count the request, check the session, then consume a pending fault.
    fn admit(&self, session_token: Option<&str>) -> Result<()> {
        let mut inner = self.write()?;
        inner.requests += 1;

        if let Some(token) = session_token {
            let session = inner.sessions.get(token).ok_or_else(|| {
                KeyServiceError::AccessDenied(
                    "The security token included in the request is invalid".into(),
                )
            })?;
            if Instant::now() >= session.expires_at {
                return Err(KeyServiceError::ExpiredToken(
                    "The security token included in the request is expired".into(),
                ));
            }
        }

        if inner.faults_remaining > 0 {
            inner.faults_remaining -= 1;
            return Err(inner.fault_kind.to_error());
        }
        Ok(())
    }

    /// Resolve a key in `region`, check it is usable, and evaluate policy.
    fn authorize(
        &self,
        principal: &Principal,
        region: &str,
        key: &KeyHandle,
        action: KmsAction,
    ) -> Result<Authorized> {
        let inner = self.read()?;

        if let Some(account) = key.account() {
            if account != self.account {
                return Err(not_found(key));
            }
        }
        if let Some(key_region) = key.region() {
            if key_region != region {
                return Err(KeyServiceError::NotFound(format!(
                    "Invalid arn {key}: key is in {key_region}, client is in {region}"
                )));
            }
        }

        let key_id = match key.resource() {
            KeyResource::Key(id) => id.clone(),
            KeyResource::Alias(name) => inner
                .aliases
                .get(&(region.to_string(), name.clone()))
                .cloned()
                .ok_or_else(|| not_found(key))?,
        };

        let stored = inner
            .keys
            .get(&key_id)
            .filter(|k| k.region == region)
            .ok_or_else(|| not_found(key))?;

        match stored.state {
            KeyState::Enabled => {}
            KeyState::Disabled => {
                return Err(KeyServiceError::Disabled(format!("{} is disabled", stored.arn)))
            }
            KeyState::PendingDeletion => {
                return Err(KeyServiceError::Disabled(format!(
                    "{} is pending deletion",
                    stored.arn
                )))
            }
        }

        let decision = stored.policy.evaluate(principal, action);
        debug!(%principal, %action, key = %stored.arn, ?decision, "policy decision");
        if !decision.is_allowed() {
            return Err(KeyServiceError::AccessDenied(format!(
                "User: {principal} is not authorized to perform: {action} on resource: {}",
                stored.arn
            )));
        }

        Ok(Authorized {
            key_id: stored.key_id.clone(),
            arn: stored.arn.clone(),
            kek: stored.kek.clone(),
        })
    }

    fn describe(&self, key_id: &str) -> Result<KeyMetadata> {
        let inner = self.read()?;
        let stored = inner
            .keys
            .get(key_id)
            .ok_or_else(|| KeyServiceError::NotFound(key_id.to_string()))?;
        Ok(KeyMetadata {
            key_id: stored.key_id.clone(),
            arn: stored.arn.clone(),
            region: stored.region.clone(),
            state: stored.state,
            description: stored.description.clone(),
        })
    }
}

impl Default for MemoryKms {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`KeyService`] client bound to one principal and region.
#[derive(Clone)]
pub struct MemoryKmsClient {
    service: Arc<MemoryKms>,
    principal: Principal,
    region: String,
    session_token: Option<String>,
}

impl MemoryKmsClient {
    /// The principal this client acts as.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    async fn begin(&self, action: KmsAction, key: &KeyHandle) -> Result<Authorized> {
        let latency = self.service.latency()?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.service.admit(self.session_token.as_deref())?;
        self.service
            .authorize(&self.principal, &self.region, key, action)
    }
}

impl std::fmt::Debug for MemoryKmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKmsClient")
            .field("principal", &self.principal)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyService for MemoryKmsClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn generate_data_key(
        &self,
        key: &KeyHandle,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey> {
        let authorized = self.begin(KmsAction::GenerateDataKey, key).await?;
        let plaintext = DataKey::generate();
        let ciphertext_blob = seal_blob(&authorized, &plaintext, context)?;

        Ok(GeneratedDataKey {
            key_id: authorized.arn,
            plaintext,
            ciphertext_blob,
        })
    }

    async fn encrypt(
        &self,
        key: &KeyHandle,
        plaintext: &DataKey,
        context: &EncryptionContext,
    ) -> Result<EncryptedKey> {
        let authorized = self.begin(KmsAction::Encrypt, key).await?;
        let ciphertext_blob = seal_blob(&authorized, plaintext, context)?;

        Ok(EncryptedKey {
            key_id: authorized.arn,
            ciphertext_blob,
        })
    }

    async fn decrypt(
        &self,
        key: &KeyHandle,
        ciphertext_blob: &[u8],
        context: &EncryptionContext,
    ) -> Result<DecryptedKey> {
        let authorized = self.begin(KmsAction::Decrypt, key).await?;
        let plaintext = open_blob(&authorized, ciphertext_blob, context)?;

        Ok(DecryptedKey {
            key_id: authorized.arn,
            plaintext,
        })
    }

    async fn describe_key(&self, key: &KeyHandle) -> Result<KeyMetadata> {
        let authorized = self.begin(KmsAction::DescribeKey, key).await?;
        self.service.describe(&authorized.key_id)
    }
}

impl KeyServiceConnector for Arc<MemoryKms> {
    fn connect(&self, credentials: &Credentials, region: &str) -> Result<Arc<dyn KeyService>> {
        Ok(Arc::new(self.client_for_credentials(credentials, region)?))
    }
}

/// Issues assumed-role credentials from a [`MemoryKms`].
pub struct MemoryCredentialProvider {
    service: Arc<MemoryKms>,
    caller: Principal,
}

#[async_trait]
impl CredentialProvider for MemoryCredentialProvider {
    fn caller(&self) -> &Principal {
        &self.caller
    }

    async fn assume_role_for(&self, role: &Principal, duration: Duration) -> Result<Credentials> {
        self.service.issue_credentials(&self.caller, role, duration)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn not_found(key: &KeyHandle) -> KeyServiceError {
    KeyServiceError::NotFound(format!("{key} does not exist"))
}

/// Resolve any handle form without a region check. Used by administrative
/// calls, which are not region-bound.
fn resolve_any(inner: &MemoryKmsInner, key: &KeyHandle) -> Result<String> {
    let key_id = match key.resource() {
        KeyResource::Key(id) => Some(id.clone()),
        KeyResource::Alias(name) => inner
            .aliases
            .iter()
            .find(|((region, alias), _)| {
                alias == name && key.region().map_or(true, |r| r == region)
            })
            .map(|(_, id)| id.clone()),
    };
    key_id
        .filter(|id| inner.keys.contains_key(id))
        .ok_or_else(|| not_found(key))
}

fn new_key_id() -> String {
    let hex = random_hex(16);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn context_aad(context: &EncryptionContext) -> Result<Vec<u8>> {
    context
        .canonical_bytes()
        .map_err(|e| KeyServiceError::Validation(format!("encryption context: {e}")))
}

/// `version || key_id_len || key_id || nonce || sealed data key`
fn seal_blob(
    authorized: &Authorized,
    plaintext: &DataKey,
    context: &EncryptionContext,
) -> Result<Bytes> {
    let key_id = authorized.key_id.as_bytes();
    let key_id_len = u8::try_from(key_id.len())
        .map_err(|_| KeyServiceError::Internal("key id too long".into()))?;

    let nonce = EncryptionNonce::generate();
    let sealed = authorized
        .kek
        .encrypt(plaintext.as_bytes(), &nonce, &context_aad(context)?)
        .map_err(|e| KeyServiceError::Internal(e.to_string()))?;

    let mut blob = BytesMut::with_capacity(2 + key_id.len() + NONCE_LEN + sealed.len());
    blob.put_u8(BLOB_VERSION);
    blob.put_u8(key_id_len);
    blob.put_slice(key_id);
    blob.put_slice(nonce.as_bytes());
    blob.put_slice(&sealed);
    Ok(blob.freeze())
}

fn open_blob(
    authorized: &Authorized,
    blob: &[u8],
    context: &EncryptionContext,
) -> Result<DataKey> {
    let malformed = || KeyServiceError::InvalidCiphertext("ciphertext blob is malformed".into());

    let (&version, rest) = blob.split_first().ok_or_else(malformed)?;
    if version != BLOB_VERSION {
        return Err(malformed());
    }
    let (&key_id_len, rest) = rest.split_first().ok_or_else(malformed)?;
    let key_id_len = usize::from(key_id_len);
    if rest.len() < key_id_len + NONCE_LEN {
        return Err(malformed());
    }
    let (key_id, rest) = rest.split_at(key_id_len);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);

    if key_id != authorized.key_id.as_bytes() {
        return Err(KeyServiceError::IncorrectKey(format!(
            "ciphertext was not produced under {}",
            authorized.arn
        )));
    }

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(nonce);

    let mut opened = authorized
        .kek
        .decrypt(sealed, &EncryptionNonce::from_bytes(nonce_bytes), &context_aad(context)?)
        .map_err(|_| {
            KeyServiceError::InvalidCiphertext(
                "ciphertext or encryption context failed verification".into(),
            )
        })?;

    let data_key = DataKey::from_slice(&opened)
        .map_err(|_| KeyServiceError::InvalidCiphertext("unexpected data key length".into()));
    zeroize::Zeroize::zeroize(&mut opened);
    data_key
}
