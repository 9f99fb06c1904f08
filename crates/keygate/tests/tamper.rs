//! Tamper evidence on serialized messages.
//!
//! Every single-bit flip of a real message must fail as an integrity error
//! before the key service is contacted, and must never yield plaintext.

use std::sync::Arc;

use anyhow::Result;
use keygate::core::Principal;
use keygate::kms::{MemoryKms, ProvisionRequest};
use keygate::perms::GrantSets;
use keygate::{EncryptionContext, ErrorKind, Gateway, GatewayConfig, Keyring, Message};

const REGION: &str = "us-west-1";

fn principal(name: &str) -> Principal {
    Principal::new(format!("arn:aws:iam::111122223333:role/{name}")).unwrap()
}

fn setup() -> Result<(Arc<MemoryKms>, Gateway)> {
    let kms = Arc::new(MemoryKms::new());
    let key = kms.provision_key(
        &ProvisionRequest::new(REGION, principal("admin"))
            .with_grants(&GrantSets::new().with_full_access(principal("app"))),
    )?;
    let client = Arc::new(kms.client_as(principal("app"), REGION));
    let gateway = Gateway::new(key.arn.as_str(), client, GatewayConfig::default())?;
    Ok((kms, gateway))
}

fn context() -> EncryptionContext {
    EncryptionContext::new()
        .with("department", "finance")
        .with("record", "2024-q3")
}

#[tokio::test]
async fn test_every_bit_flip_is_integrity_error() -> Result<()> {
    let (kms, gateway) = setup()?;
    let bytes = gateway.encrypt(b"quarterly numbers", Some(&context())).await?;
    let before = kms.request_count();

    for i in 0..bytes.len() {
        for bit in 0..8 {
            let mut tampered = bytes.clone();
            tampered[i] ^= 1 << bit;
            match gateway.decrypt(&tampered, Some(&context())).await {
                Ok(plaintext) => panic!("byte {i} bit {bit} decrypted to {plaintext:?}"),
                Err(err) => assert_eq!(err.kind(), ErrorKind::Integrity, "byte {i} bit {bit}"),
            }
        }
    }

    assert_eq!(kms.request_count(), before);
    assert_eq!(gateway.decrypt(&bytes, Some(&context())).await?, b"quarterly numbers");
    Ok(())
}

#[tokio::test]
async fn test_truncated_and_extended_messages_rejected() -> Result<()> {
    let (_kms, gateway) = setup()?;
    let bytes = gateway.encrypt(b"payload", None).await?;

    let mut extended = bytes.clone();
    extended.push(0);
    let err = gateway.decrypt(&extended, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    for len in [0, 1, 16, bytes.len() - 1] {
        let err = gateway.decrypt(&bytes[..len], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity, "length {len}");
    }
    Ok(())
}

#[tokio::test]
async fn test_message_is_self_describing() -> Result<()> {
    let (_kms, gateway) = setup()?;
    let bytes = gateway.encrypt(b"payload", Some(&context())).await?;

    let message = Message::from_bytes(&bytes)?;
    assert_eq!(message.suite(), keygate::AlgorithmSuite::COMMITTING);
    assert_eq!(message.context(), &context());
    assert_eq!(message.encrypted_data_key().provider_id, keygate::PROVIDER_ID);
    assert_eq!(
        message.encrypted_data_key().key_id,
        gateway.keyring().key_handle().as_str()
    );
    Ok(())
}
