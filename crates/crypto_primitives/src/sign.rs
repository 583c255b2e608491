use hmac::{
    Hmac,
    Mac,
};
use rand::rngs::StdRng;
use rsa::signature::{
    RandomizedSigner,
    SignatureEncoding,
    Signer,
    Verifier,
};
use sha1::Sha1;
use sha2::{
    Digest,
    Sha256,
    Sha384,
    Sha512,
};
use webcrypto::{
    KeyMaterial,
    NamedCurve,
    ProviderError,
    ProviderResult,
    ShaHash,
    SignParams,
    StoredKey,
};

use crate::shared::{
    private_material,
    rsa_private_key,
    rsa_public_key,
    secret_material,
};

pub(crate) fn digest_bytes(hash: ShaHash, data: &[u8]) -> Vec<u8> {
    match hash {
        ShaHash::Sha1 => Sha1::digest(data).to_vec(),
        ShaHash::Sha256 => Sha256::digest(data).to_vec(),
        ShaHash::Sha384 => Sha384::digest(data).to_vec(),
        ShaHash::Sha512 => Sha512::digest(data).to_vec(),
    }
}

pub(crate) fn sign(
    mut rng: StdRng,
    key: &StoredKey,
    params: &SignParams,
    data: &[u8],
) -> ProviderResult<Vec<u8>> {
    match params {
        SignParams::RsassaPkcs1v15 { hash } => {
            let private_key = rsa_private_key(&key.material)?;
            macro_rules! sign_with {
                ($digest:ty) => {
                    rsa::pkcs1v15::SigningKey::<$digest>::new(private_key)
                        .sign(data)
                        .to_vec()
                };
            }
            Ok(match hash {
                ShaHash::Sha1 => sign_with!(Sha1),
                ShaHash::Sha256 => sign_with!(Sha256),
                ShaHash::Sha384 => sign_with!(Sha384),
                ShaHash::Sha512 => sign_with!(Sha512),
            })
        },
        SignParams::RsaPss { hash, salt_length } => {
            let private_key = rsa_private_key(&key.material)?;
            let salt_len = *salt_length as usize;
            macro_rules! sign_with {
                ($digest:ty) => {
                    rsa::pss::SigningKey::<$digest>::new_with_salt_len(private_key, salt_len)
                        .sign_with_rng(&mut rng, data)
                        .to_vec()
                };
            }
            Ok(match hash {
                ShaHash::Sha1 => sign_with!(Sha1),
                ShaHash::Sha256 => sign_with!(Sha256),
                ShaHash::Sha384 => sign_with!(Sha384),
                ShaHash::Sha512 => sign_with!(Sha512),
            })
        },
        SignParams::Ecdsa { hash, curve } => {
            // Only the recommended pairs are implemented. Signatures are the
            // raw fixed-width r || s concatenation WebCrypto expects.
            let der = private_material(&key.material)?;
            match (curve, hash) {
                (NamedCurve::P256, ShaHash::Sha256) => {
                    use p256::pkcs8::DecodePrivateKey;
                    let secret = p256::SecretKey::from_pkcs8_der(der).map_err(|_| {
                        ProviderError::operation("expected valid private EC key")
                    })?;
                    let signing_key = p256::ecdsa::SigningKey::from(secret);
                    let signature: p256::ecdsa::Signature = signing_key.sign(data);
                    Ok(signature.to_bytes().to_vec())
                },
                (NamedCurve::P384, ShaHash::Sha384) => {
                    use p256::pkcs8::DecodePrivateKey;
                    let secret = p384::SecretKey::from_pkcs8_der(der).map_err(|_| {
                        ProviderError::operation("expected valid private EC key")
                    })?;
                    let signing_key = p384::ecdsa::SigningKey::from(secret);
                    let signature: p384::ecdsa::Signature = signing_key.sign(data);
                    Ok(signature.to_bytes().to_vec())
                },
                _ => Err(ProviderError::not_supported(
                    "unsupported ECDSA hash for this curve",
                )),
            }
        },
        SignParams::Hmac { hash } => {
            let secret = secret_material(&key.material)?;
            hmac_sign(*hash, secret, data)
        },
    }
}

pub(crate) fn verify(
    key: &StoredKey,
    params: &SignParams,
    signature: &[u8],
    data: &[u8],
) -> ProviderResult<bool> {
    match params {
        SignParams::RsassaPkcs1v15 { hash } => {
            let public_key = rsa_public_key(&key.material)?;
            let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
                return Ok(false);
            };
            macro_rules! verify_with {
                ($digest:ty) => {
                    rsa::pkcs1v15::VerifyingKey::<$digest>::new(public_key)
                        .verify(data, &signature)
                        .is_ok()
                };
            }
            Ok(match hash {
                ShaHash::Sha1 => verify_with!(Sha1),
                ShaHash::Sha256 => verify_with!(Sha256),
                ShaHash::Sha384 => verify_with!(Sha384),
                ShaHash::Sha512 => verify_with!(Sha512),
            })
        },
        SignParams::RsaPss { hash, .. } => {
            let public_key = rsa_public_key(&key.material)?;
            let Ok(signature) = rsa::pss::Signature::try_from(signature) else {
                return Ok(false);
            };
            macro_rules! verify_with {
                ($digest:ty) => {{
                    let verifying_key: rsa::pss::VerifyingKey<$digest> = public_key.into();
                    verifying_key.verify(data, &signature).is_ok()
                }};
            }
            Ok(match hash {
                ShaHash::Sha1 => verify_with!(Sha1),
                ShaHash::Sha256 => verify_with!(Sha256),
                ShaHash::Sha384 => verify_with!(Sha384),
                ShaHash::Sha512 => verify_with!(Sha512),
            })
        },
        SignParams::Ecdsa { hash, curve } => match (curve, hash) {
            (NamedCurve::P256, ShaHash::Sha256) => {
                let verifying_key = p256_verifying_key(&key.material)?;
                let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(verifying_key.verify(data, &signature).is_ok())
            },
            (NamedCurve::P384, ShaHash::Sha384) => {
                let verifying_key = p384_verifying_key(&key.material)?;
                let Ok(signature) = p384::ecdsa::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(verifying_key.verify(data, &signature).is_ok())
            },
            _ => Err(ProviderError::not_supported(
                "unsupported ECDSA hash for this curve",
            )),
        },
        SignParams::Hmac { hash } => {
            let secret = secret_material(&key.material)?;
            hmac_verify(*hash, secret, signature, data)
        },
    }
}

fn p256_verifying_key(material: &KeyMaterial) -> ProviderResult<p256::ecdsa::VerifyingKey> {
    match material {
        KeyMaterial::Public(point) => p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map_err(|_| ProviderError::operation("expected valid public EC key")),
        KeyMaterial::Private(der) => {
            use p256::pkcs8::DecodePrivateKey;
            let secret = p256::SecretKey::from_pkcs8_der(der)
                .map_err(|_| ProviderError::operation("expected valid private EC key"))?;
            Ok(p256::ecdsa::VerifyingKey::from(
                &p256::ecdsa::SigningKey::from(secret),
            ))
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an EC key")),
    }
}

fn p384_verifying_key(material: &KeyMaterial) -> ProviderResult<p384::ecdsa::VerifyingKey> {
    match material {
        KeyMaterial::Public(point) => p384::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map_err(|_| ProviderError::operation("expected valid public EC key")),
        KeyMaterial::Private(der) => {
            use p256::pkcs8::DecodePrivateKey;
            let secret = p384::SecretKey::from_pkcs8_der(der)
                .map_err(|_| ProviderError::operation("expected valid private EC key"))?;
            Ok(p384::ecdsa::VerifyingKey::from(
                &p384::ecdsa::SigningKey::from(secret),
            ))
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an EC key")),
    }
}

fn hmac_sign(hash: ShaHash, key: &[u8], data: &[u8]) -> ProviderResult<Vec<u8>> {
    macro_rules! mac_with {
        ($digest:ty) => {{
            let mut mac = Hmac::<$digest>::new_from_slice(key)
                .map_err(|_| ProviderError::operation("invalid HMAC key"))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }};
    }
    Ok(match hash {
        ShaHash::Sha1 => mac_with!(Sha1),
        ShaHash::Sha256 => mac_with!(Sha256),
        ShaHash::Sha384 => mac_with!(Sha384),
        ShaHash::Sha512 => mac_with!(Sha512),
    })
}

fn hmac_verify(hash: ShaHash, key: &[u8], signature: &[u8], data: &[u8]) -> ProviderResult<bool> {
    macro_rules! mac_with {
        ($digest:ty) => {{
            let mut mac = Hmac::<$digest>::new_from_slice(key)
                .map_err(|_| ProviderError::operation("invalid HMAC key"))?;
            mac.update(data);
            mac.verify_slice(signature).is_ok()
        }};
    }
    Ok(match hash {
        ShaHash::Sha1 => mac_with!(Sha1),
        ShaHash::Sha256 => mac_with!(Sha256),
        ShaHash::Sha384 => mac_with!(Sha384),
        ShaHash::Sha512 => mac_with!(Sha512),
    })
}
