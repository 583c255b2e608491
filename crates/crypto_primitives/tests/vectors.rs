//! Known-answer tests driven through the full engine.

use std::sync::Arc;

use crypto_primitives::CryptoPrimitives;
use webcrypto::{
    Algorithm,
    KeyData,
    KeyUsage,
    SubtleCrypto,
};

fn subtle() -> SubtleCrypto {
    SubtleCrypto::new(Arc::new(CryptoPrimitives::new()))
}

#[tokio::test]
async fn test_sha256_abc() -> anyhow::Result<()> {
    let digest = subtle().digest(&"SHA-256".into(), b"abc").await?;
    assert_eq!(
        hex::encode(digest),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    Ok(())
}

#[tokio::test]
async fn test_aes_cbc_zero_vector() -> anyhow::Result<()> {
    let subtle = subtle();
    let key = subtle
        .import_key(
            KeyData::Raw(vec![0u8; 16]),
            &"AES-CBC".into(),
            true,
            &[KeyUsage::Encrypt, KeyUsage::Decrypt],
        )
        .await?;
    let params: webcrypto::AlgorithmIdentifier = Algorithm {
        name: "AES-CBC".to_string(),
        iv: Some(vec![0u8; 16]),
        ..Default::default()
    }
    .into();
    let ciphertext = subtle.encrypt(&params, &key, &[0u8; 16]).await?;
    // AES-128(0^16, 0^16) for the data block, then a full padding block.
    assert_eq!(
        hex::encode(&ciphertext[..16]),
        "66e94bd4ef8a2c3b884cfa59ca342b2e"
    );
    assert_eq!(ciphertext.len(), 32);

    let plaintext = subtle.decrypt(&params, &key, &ciphertext).await?;
    assert_eq!(plaintext, vec![0u8; 16]);
    Ok(())
}

#[tokio::test]
async fn test_hmac_sha256_zero_key_empty_message() -> anyhow::Result<()> {
    let subtle = subtle();
    let key = subtle
        .import_key(
            KeyData::Raw(vec![0u8; 32]),
            &Algorithm {
                name: "HMAC".to_string(),
                hash: Some(Box::new("SHA-256".into())),
                ..Default::default()
            }
            .into(),
            true,
            &[KeyUsage::Sign, KeyUsage::Verify],
        )
        .await?;
    let mac = subtle.sign(&"HMAC".into(), &key, b"").await?;
    assert_eq!(
        hex::encode(&mac),
        "b613679a0814d9ec772f95d778c35fc5ff1697c493715653c6c712144292c5ad"
    );
    assert!(subtle.verify(&"HMAC".into(), &key, &mac, b"").await?);
    Ok(())
}

#[tokio::test]
async fn test_rsassa_sign_verify_round_trip() -> anyhow::Result<()> {
    let subtle = subtle();
    let pair = subtle
        .generate_key(
            &Algorithm {
                name: "RSASSA-PKCS1-v1_5".to_string(),
                modulus_length: Some(2048),
                public_exponent: Some(vec![0x01, 0x00, 0x01]),
                hash: Some(Box::new("SHA-256".into())),
                ..Default::default()
            }
            .into(),
            true,
            &[KeyUsage::Sign, KeyUsage::Verify],
        )
        .await?
        .into_pair()
        .unwrap();

    let signature = subtle
        .sign(&"RSASSA-PKCS1-v1_5".into(), &pair.private_key, b"hello")
        .await?;
    assert!(
        subtle
            .verify(
                &"RSASSA-PKCS1-v1_5".into(),
                &pair.public_key,
                &signature,
                b"hello",
            )
            .await?
    );

    let mut tampered = signature;
    tampered[0] ^= 0x01;
    assert!(
        !subtle
            .verify(
                &"RSASSA-PKCS1-v1_5".into(),
                &pair.public_key,
                &tampered,
                b"hello",
            )
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn test_pbkdf2_rfc_vector() -> anyhow::Result<()> {
    let subtle = subtle();
    let key = subtle
        .import_key(
            KeyData::Raw(b"password".to_vec()),
            &"PBKDF2".into(),
            false,
            &[KeyUsage::DeriveBits],
        )
        .await?;
    let bits = subtle
        .derive_bits(
            &Algorithm {
                name: "PBKDF2".to_string(),
                hash: Some(Box::new("SHA-256".into())),
                salt: Some(b"salt".to_vec()),
                iterations: Some(1),
                ..Default::default()
            }
            .into(),
            &key,
            Some(256),
        )
        .await?;
    assert_eq!(
        hex::encode(bits),
        "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
    );
    Ok(())
}

#[tokio::test]
async fn test_aes_import_rejects_17_byte_keys() {
    let err = subtle()
        .import_key(
            KeyData::Raw(vec![0u8; 17]),
            &"AES-GCM".into(),
            true,
            &[KeyUsage::Encrypt],
        )
        .await
        .unwrap_err();
    assert_eq!(err.dom_name(), "DataError");
}
