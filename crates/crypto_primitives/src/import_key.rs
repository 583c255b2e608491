use elliptic_curve::sec1::{
    FromEncodedPoint,
    ToEncodedPoint,
};
use p256::pkcs8::EncodePrivateKey;
use rsa::{
    pkcs1::UintRef,
    pkcs8::der::Decode,
};
use spki::{
    der::Encode,
    SubjectPublicKeyInfoRef,
};
use webcrypto::{
    ImportedKey,
    KeyImportRequest,
    KeyMaterial,
    NamedCurve,
    ProviderError,
    ProviderResult,
};

use crate::shared::{
    ID_EC_DH_OID,
    RSA_ENCRYPTION_OID,
};

pub(crate) fn import_key(request: KeyImportRequest<'_>) -> ProviderResult<ImportedKey> {
    match request {
        KeyImportRequest::RsaPkcs8 { der } => import_rsa_pkcs8(der),
        KeyImportRequest::RsaSpki { der } => import_rsa_spki(der),
        KeyImportRequest::RsaJwkPublic { n, e } => import_rsa_jwk_public(&n, &e),
        KeyImportRequest::RsaJwkPrivate {
            n,
            e,
            d,
            p,
            q,
            dp,
            dq,
            qi,
        } => import_rsa_jwk_private(&n, &e, &d, &p, &q, &dp, &dq, &qi),
        KeyImportRequest::EcRaw { curve, point } => import_ec_raw(curve, point),
        KeyImportRequest::EcPkcs8 { curve, der } => import_ec_pkcs8(curve, der),
        KeyImportRequest::EcSpki { curve, der } => import_ec_spki(curve, der),
        KeyImportRequest::EcJwkPublic { curve, x, y } => import_ec_jwk_public(curve, &x, &y),
        KeyImportRequest::EcJwkPrivate { curve, x, y, d } => {
            import_ec_jwk_private(curve, &x, &y, &d)
        },
    }
}

fn data_error(msg: &'static str) -> ProviderError {
    ProviderError::data(msg)
}

fn import_rsa_pkcs8(der: &[u8]) -> ProviderResult<ImportedKey> {
    let pk_info = rsa::pkcs8::PrivateKeyInfo::from_der(der)
        .map_err(|_| data_error("expected valid PKCS#8 data"))?;

    // Only rsaEncryption is accepted for interoperability.
    if pk_info.algorithm.oid != RSA_ENCRYPTION_OID {
        return Err(data_error("unsupported algorithm"));
    }

    let private_key = rsa::pkcs1::RsaPrivateKey::from_der(pk_info.private_key)
        .map_err(|_| data_error("invalid rsa private key"))?;

    let bytes_consumed = private_key
        .encoded_len()
        .map_err(|_| data_error("invalid rsa private key"))?;
    if bytes_consumed != spki::der::Length::new(pk_info.private_key.len() as u16) {
        return Err(data_error("private key is invalid (too long)"));
    }

    Ok(ImportedKey {
        material: KeyMaterial::Private(pk_info.private_key.to_vec()),
        modulus_length: Some((private_key.modulus.as_bytes().len() * 8) as u32),
        public_exponent: Some(private_key.public_exponent.as_bytes().to_vec()),
    })
}

fn import_rsa_spki(der: &[u8]) -> ProviderResult<ImportedKey> {
    // Parsed as a BitString so the ASN.1 type is inferred correctly.
    let pk_info: SubjectPublicKeyInfoRef = spki::SubjectPublicKeyInfo::from_der(der)
        .map_err(|_| data_error("expected valid SPKI data"))?;

    if pk_info.algorithm.oid != RSA_ENCRYPTION_OID {
        return Err(data_error("unsupported algorithm"));
    }

    let raw_key = pk_info.subject_public_key.raw_bytes();
    let public_key = rsa::pkcs1::RsaPublicKey::from_der(raw_key)
        .map_err(|_| data_error("invalid rsa public key"))?;

    let bytes_consumed = public_key
        .encoded_len()
        .map_err(|_| data_error("invalid rsa public key"))?;
    if bytes_consumed != spki::der::Length::new(raw_key.len() as u16) {
        return Err(data_error("public key is invalid (too long)"));
    }

    Ok(ImportedKey {
        material: KeyMaterial::Public(raw_key.to_vec()),
        modulus_length: Some((public_key.modulus.as_bytes().len() * 8) as u32),
        public_exponent: Some(public_key.public_exponent.as_bytes().to_vec()),
    })
}

fn import_rsa_jwk_public(n: &[u8], e: &[u8]) -> ProviderResult<ImportedKey> {
    let modulus = UintRef::new(n).map_err(|_| data_error("invalid modulus"))?;
    let public_exponent = UintRef::new(e).map_err(|_| data_error("invalid public exponent"))?;

    let public_key = rsa::pkcs1::RsaPublicKey {
        modulus,
        public_exponent,
    };

    let mut data = Vec::new();
    public_key
        .encode_to_vec(&mut data)
        .map_err(|_| data_error("invalid rsa public key"))?;
    let modulus_length = (public_key.modulus.as_bytes().len() * 8) as u32;
    let public_exponent = public_key.public_exponent.as_bytes().to_vec();

    Ok(ImportedKey {
        material: KeyMaterial::Public(data),
        modulus_length: Some(modulus_length),
        public_exponent: Some(public_exponent),
    })
}

#[allow(clippy::too_many_arguments)]
fn import_rsa_jwk_private(
    n: &[u8],
    e: &[u8],
    d: &[u8],
    p: &[u8],
    q: &[u8],
    dp: &[u8],
    dq: &[u8],
    qi: &[u8],
) -> ProviderResult<ImportedKey> {
    let modulus = UintRef::new(n).map_err(|_| data_error("invalid modulus"))?;
    let public_exponent = UintRef::new(e).map_err(|_| data_error("invalid public exponent"))?;
    let private_exponent = UintRef::new(d).map_err(|_| data_error("invalid private exponent"))?;
    let prime1 = UintRef::new(p).map_err(|_| data_error("invalid first prime factor"))?;
    let prime2 = UintRef::new(q).map_err(|_| data_error("invalid second prime factor"))?;
    let exponent1 = UintRef::new(dp).map_err(|_| data_error("invalid first CRT exponent"))?;
    let exponent2 = UintRef::new(dq).map_err(|_| data_error("invalid second CRT exponent"))?;
    let coefficient = UintRef::new(qi).map_err(|_| data_error("invalid CRT coefficient"))?;

    let private_key = rsa::pkcs1::RsaPrivateKey {
        modulus,
        public_exponent,
        private_exponent,
        prime1,
        prime2,
        exponent1,
        exponent2,
        coefficient,
        other_prime_infos: None,
    };

    let mut data = Vec::new();
    private_key
        .encode_to_vec(&mut data)
        .map_err(|_| data_error("invalid rsa private key"))?;
    let modulus_length = (private_key.modulus.as_bytes().len() * 8) as u32;
    let public_exponent = private_key.public_exponent.as_bytes().to_vec();

    Ok(ImportedKey {
        material: KeyMaterial::Private(data),
        modulus_length: Some(modulus_length),
        public_exponent: Some(public_exponent),
    })
}

fn import_ec_raw(curve: NamedCurve, point: &[u8]) -> ProviderResult<ImportedKey> {
    // The point is parsed and validated; the original encoding is kept.
    match curve {
        NamedCurve::P256 => {
            let parsed = p256::EncodedPoint::from_bytes(point)
                .map_err(|_| data_error("invalid P-256 elliptic curve point"))?;
            if parsed.is_identity() {
                return Err(data_error("invalid P-256 elliptic curve point"));
            }
        },
        NamedCurve::P384 => {
            let parsed = p384::EncodedPoint::from_bytes(point)
                .map_err(|_| data_error("invalid P-384 elliptic curve point"))?;
            if parsed.is_identity() {
                return Err(data_error("invalid P-384 elliptic curve point"));
            }
        },
    }
    Ok(ImportedKey::new(KeyMaterial::Public(point.to_vec())))
}

fn import_ec_pkcs8(curve: NamedCurve, der: &[u8]) -> ProviderResult<ImportedKey> {
    // Deserializing through the curve type validates the envelope, the curve
    // parameters, and the scalar in one step.
    use p256::pkcs8::DecodePrivateKey;
    match curve {
        NamedCurve::P256 => {
            p256::SecretKey::from_pkcs8_der(der)
                .map_err(|_| data_error("expected valid PKCS#8 data"))?;
        },
        NamedCurve::P384 => {
            p384::SecretKey::from_pkcs8_der(der)
                .map_err(|_| data_error("expected valid PKCS#8 data"))?;
        },
    }
    Ok(ImportedKey::new(KeyMaterial::Private(der.to_vec())))
}

struct EcSpkiParameters {
    named_curve_oid: spki::der::asn1::ObjectIdentifier,
}

impl<'a> TryFrom<spki::der::asn1::AnyRef<'a>> for EcSpkiParameters {
    type Error = spki::der::Error;

    fn try_from(any: spki::der::asn1::AnyRef<'a>) -> spki::der::Result<EcSpkiParameters> {
        let named_curve_oid = any.try_into()?;
        Ok(Self { named_curve_oid })
    }
}

fn import_ec_spki(curve: NamedCurve, der: &[u8]) -> ProviderResult<ImportedKey> {
    let pk_info: SubjectPublicKeyInfoRef = spki::SubjectPublicKeyInfo::from_der(der)
        .map_err(|_| data_error("expected valid SPKI data"))?;

    // id-ecPublicKey, or the id-ecDH identifier some stacks emit.
    let alg = pk_info.algorithm.oid;
    if alg != elliptic_curve::ALGORITHM_OID && alg != ID_EC_DH_OID {
        return Err(data_error("unsupported algorithm"));
    }

    let params = EcSpkiParameters::try_from(
        pk_info
            .algorithm
            .parameters
            .ok_or_else(|| data_error("malformed parameters"))?,
    )
    .map_err(|_| data_error("malformed parameters"))?;

    let pk_named_curve = match params.named_curve_oid {
        oid if oid == curve_oid(NamedCurve::P256) => NamedCurve::P256,
        oid if oid == curve_oid(NamedCurve::P384) => NamedCurve::P384,
        _ => return Err(data_error("Unsupported named curve")),
    };
    if pk_named_curve != curve {
        return Err(data_error("curve mismatch"));
    }

    let encoded_key = pk_info.subject_public_key.raw_bytes();
    let bytes_consumed = match curve {
        NamedCurve::P256 => {
            let point = p256::EncodedPoint::from_bytes(encoded_key)
                .map_err(|_| data_error("invalid P-256 elliptic curve SPKI data"))?;
            if point.is_identity() {
                return Err(data_error("invalid P-256 elliptic curve point"));
            }
            point.as_bytes().len()
        },
        NamedCurve::P384 => {
            let point = p384::EncodedPoint::from_bytes(encoded_key)
                .map_err(|_| data_error("invalid P-384 elliptic curve SPKI data"))?;
            if point.is_identity() {
                return Err(data_error("invalid P-384 elliptic curve point"));
            }
            point.as_bytes().len()
        },
    };
    if bytes_consumed != encoded_key.len() {
        return Err(data_error("public key is invalid (too long)"));
    }

    Ok(ImportedKey::new(KeyMaterial::Public(encoded_key.to_vec())))
}

fn curve_oid(curve: NamedCurve) -> spki::der::asn1::ObjectIdentifier {
    use const_oid::AssociatedOid;
    match curve {
        NamedCurve::P256 => p256::NistP256::OID,
        NamedCurve::P384 => p384::NistP384::OID,
    }
}

/// Zero-pad a JWK field element on the left to the curve's field width.
fn field_bytes<C: elliptic_curve::Curve>(
    bytes: &[u8],
) -> ProviderResult<elliptic_curve::FieldBytes<C>> {
    let mut out = elliptic_curve::FieldBytes::<C>::default();
    if bytes.len() > out.len() {
        return Err(data_error("invalid field element length"));
    }
    let offset = out.len() - bytes.len();
    out[offset..].copy_from_slice(bytes);
    Ok(out)
}

fn ec_jwk_point(curve: NamedCurve, x: &[u8], y: &[u8]) -> ProviderResult<Vec<u8>> {
    match curve {
        NamedCurve::P256 => {
            let x = field_bytes::<p256::NistP256>(x)?;
            let y = field_bytes::<p256::NistP256>(y)?;
            let point = p256::EncodedPoint::from_affine_coordinates(&x, &y, false);
            Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(&point))
                .ok_or_else(|| data_error("point is not on the curve"))?;
            Ok(point.as_bytes().to_vec())
        },
        NamedCurve::P384 => {
            let x = field_bytes::<p384::NistP384>(x)?;
            let y = field_bytes::<p384::NistP384>(y)?;
            let point = p384::EncodedPoint::from_affine_coordinates(&x, &y, false);
            Option::<p384::PublicKey>::from(p384::PublicKey::from_encoded_point(&point))
                .ok_or_else(|| data_error("point is not on the curve"))?;
            Ok(point.as_bytes().to_vec())
        },
    }
}

fn import_ec_jwk_public(curve: NamedCurve, x: &[u8], y: &[u8]) -> ProviderResult<ImportedKey> {
    let point = ec_jwk_point(curve, x, y)?;
    Ok(ImportedKey::new(KeyMaterial::Public(point)))
}

fn import_ec_jwk_private(
    curve: NamedCurve,
    x: &[u8],
    y: &[u8],
    d: &[u8],
) -> ProviderResult<ImportedKey> {
    let point = ec_jwk_point(curve, x, y)?;
    let pkcs8_der = match curve {
        NamedCurve::P256 => {
            let d = field_bytes::<p256::NistP256>(d)?;
            let secret = p256::SecretKey::from_bytes(&d)
                .map_err(|_| data_error("invalid JWK private key"))?;
            if secret.public_key().to_encoded_point(false).as_bytes() != point.as_slice() {
                return Err(data_error("key is not a valid key pair"));
            }
            secret
                .to_pkcs8_der()
                .map_err(|_| data_error("invalid JWK private key"))?
        },
        NamedCurve::P384 => {
            let d = field_bytes::<p384::NistP384>(d)?;
            let secret = p384::SecretKey::from_bytes(&d)
                .map_err(|_| data_error("invalid JWK private key"))?;
            if secret.public_key().to_encoded_point(false).as_bytes() != point.as_slice() {
                return Err(data_error("key is not a valid key pair"));
            }
            secret
                .to_pkcs8_der()
                .map_err(|_| data_error("invalid JWK private key"))?
        },
    };
    Ok(ImportedKey::new(KeyMaterial::Private(
        pkcs8_der.as_bytes().to_vec(),
    )))
}

#[cfg(test)]
mod tests {
    use webcrypto::KeyMaterial;

    use super::*;

    #[test]
    fn test_rsa_spki_rejects_foreign_oids() {
        // An Ed25519 SPKI: algorithm 1.3.101.112.
        let der = hex::decode(
            "302a300506032b6570032100d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a",
        )
        .unwrap();
        let err = import_key(KeyImportRequest::RsaSpki { der: &der }).unwrap_err();
        assert_eq!(err.to_string(), "unsupported algorithm");
    }

    #[test]
    fn test_ec_raw_rejects_garbage_and_identity() {
        let err =
            import_key(KeyImportRequest::EcRaw { curve: NamedCurve::P256, point: &[0x05; 10] })
                .unwrap_err();
        assert_eq!(err.to_string(), "invalid P-256 elliptic curve point");

        // A single zero byte encodes the identity point.
        let err =
            import_key(KeyImportRequest::EcRaw { curve: NamedCurve::P256, point: &[0x00] })
                .unwrap_err();
        assert_eq!(err.to_string(), "invalid P-256 elliptic curve point");
    }

    #[test]
    fn test_rsa_jwk_public_builds_pkcs1() -> anyhow::Result<()> {
        // Toy numbers; the codec only checks DER structure here.
        let imported = import_key(KeyImportRequest::RsaJwkPublic {
            n: vec![0xc2, 0x14, 0x7f, 0x51],
            e: vec![0x01, 0x00, 0x01],
        })?;
        assert_eq!(imported.modulus_length, Some(32));
        assert_eq!(imported.public_exponent.as_deref(), Some(&[1u8, 0, 1][..]));
        assert!(matches!(imported.material, KeyMaterial::Public(_)));
        Ok(())
    }
}
