use elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey;
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    RsaPrivateKey,
};
use webcrypto::{
    KeyMaterial,
    ProviderError,
    ProviderResult,
};

pub const RSA_ENCRYPTION_OID: const_oid::ObjectIdentifier =
    const_oid::ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// id-ecDH, emitted by some implementations in ECDH SPKI envelopes.
pub const ID_EC_DH_OID: const_oid::ObjectIdentifier =
    const_oid::ObjectIdentifier::new_unwrap("1.3.132.1.12");

pub(crate) fn secret_material(material: &KeyMaterial) -> ProviderResult<&[u8]> {
    material
        .as_secret()
        .map_err(|_| ProviderError::type_error("expected secret key material"))
}

pub(crate) fn private_material(material: &KeyMaterial) -> ProviderResult<&[u8]> {
    material
        .as_private()
        .map_err(|_| ProviderError::type_error("expected private key material"))
}

/// RSA public key from either stored form: PKCS#1 `RSAPublicKey` for public
/// entries, derived from the PKCS#1 `RSAPrivateKey` for private ones.
pub(crate) fn rsa_public_key(material: &KeyMaterial) -> ProviderResult<rsa::RsaPublicKey> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    match material {
        KeyMaterial::Public(der) => rsa::RsaPublicKey::from_pkcs1_der(der)
            .map_err(|_| ProviderError::type_error("expected valid public key")),
        KeyMaterial::Private(der) => {
            let private_key = RsaPrivateKey::from_pkcs1_der(der)
                .map_err(|_| ProviderError::type_error("expected valid private key"))?;
            Ok(private_key.to_public_key())
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an RSA key")),
    }
}

pub(crate) fn rsa_private_key(material: &KeyMaterial) -> ProviderResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_der(private_material(material)?)
        .map_err(|_| ProviderError::type_error("expected valid private key"))
}

/// Uncompressed P-256 point from either stored form.
pub(crate) fn ec_public_point_p256(
    material: &KeyMaterial,
) -> ProviderResult<p256::EncodedPoint> {
    match material {
        KeyMaterial::Public(point) => p256::EncodedPoint::from_bytes(point)
            .map_err(|_| ProviderError::type_error("expected valid public EC key")),
        KeyMaterial::Private(der) => {
            let secret = p256::SecretKey::from_pkcs8_der(der)
                .map_err(|_| ProviderError::type_error("expected valid private EC key"))?;
            Ok(secret.public_key().to_encoded_point(false))
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an EC key")),
    }
}

pub(crate) fn ec_public_point_p384(
    material: &KeyMaterial,
) -> ProviderResult<p384::EncodedPoint> {
    match material {
        KeyMaterial::Public(point) => p384::EncodedPoint::from_bytes(point)
            .map_err(|_| ProviderError::type_error("expected valid public EC key")),
        KeyMaterial::Private(der) => {
            let secret = p384::SecretKey::from_pkcs8_der(der)
                .map_err(|_| ProviderError::type_error("expected valid private EC key"))?;
            Ok(secret.public_key().to_encoded_point(false))
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an EC key")),
    }
}
