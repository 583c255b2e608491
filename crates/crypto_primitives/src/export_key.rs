use const_oid::AssociatedOid;
use elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey;
use rsa::pkcs1::der::Decode;
use spki::{
    der::{
        asn1,
        asn1::BitString,
        Encode,
    },
    AlgorithmIdentifier,
    AlgorithmIdentifierOwned,
};
use webcrypto::{
    KeyExportRequest,
    KeyExportResult,
    KeyMaterial,
    NamedCurve,
    ProviderError,
    ProviderResult,
};

use crate::shared::{
    ec_public_point_p256,
    ec_public_point_p384,
    private_material,
    rsa_private_key,
    RSA_ENCRYPTION_OID,
};

pub(crate) fn export_key(request: KeyExportRequest<'_>) -> ProviderResult<KeyExportResult> {
    match request {
        KeyExportRequest::RsaPkcs8 { material } => export_rsa_pkcs8(material),
        KeyExportRequest::RsaSpki { material } => export_rsa_spki(material),
        KeyExportRequest::RsaJwk { material } => export_rsa_jwk(material),
        KeyExportRequest::EcRaw { curve, material } => export_ec_raw(curve, material),
        KeyExportRequest::EcPkcs8 { material } => Ok(KeyExportResult::Bytes(
            // Stored EC private keys are already PKCS#8 DER.
            private_material(material)?.to_vec(),
        )),
        KeyExportRequest::EcSpki { curve, material } => export_ec_spki(curve, material),
        KeyExportRequest::EcJwk { curve, material } => export_ec_jwk(curve, material),
    }
}

fn operation_error(msg: &'static str) -> ProviderError {
    ProviderError::operation(msg)
}

fn export_rsa_pkcs8(material: &KeyMaterial) -> ProviderResult<KeyExportResult> {
    let private_key = private_material(material)?;

    // PKCS#8 v1 envelope around the stored PKCS#1 key. The parameters field
    // MUST be ASN.1 NULL per RFC 3279 Section 2.3.1.
    let pk_info = rsa::pkcs8::PrivateKeyInfo {
        public_key: None,
        algorithm: rsa::pkcs8::AlgorithmIdentifierRef {
            oid: RSA_ENCRYPTION_OID,
            parameters: Some(rsa::pkcs8::der::asn1::AnyRef::from(
                rsa::pkcs8::der::asn1::Null,
            )),
        },
        private_key,
    };

    let mut pkcs8_der = Vec::new();
    pk_info
        .encode_to_vec(&mut pkcs8_der)
        .map_err(|_| operation_error("failed to encode private key"))?;
    Ok(KeyExportResult::Bytes(pkcs8_der))
}

fn export_rsa_spki(material: &KeyMaterial) -> ProviderResult<KeyExportResult> {
    use rsa::pkcs1::EncodeRsaPublicKey;
    let subject_public_key = match material {
        KeyMaterial::Public(der) => der.clone(),
        KeyMaterial::Private(_) => rsa_private_key(material)?
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|_| operation_error("failed to encode public key"))?
            .as_bytes()
            .to_vec(),
        KeyMaterial::Secret(_) => {
            return Err(ProviderError::type_error("expected an RSA key"))
        },
    };

    let key_info = spki::SubjectPublicKeyInfo {
        algorithm: AlgorithmIdentifier {
            oid: RSA_ENCRYPTION_OID,
            parameters: Some(asn1::AnyRef::from(asn1::Null)),
        },
        subject_public_key: BitString::from_bytes(&subject_public_key)
            .map_err(|_| operation_error("failed to encode public key"))?,
    };
    let spki_der = key_info
        .to_der()
        .map_err(|_| operation_error("failed to encode public key"))?;
    Ok(KeyExportResult::Bytes(spki_der))
}

fn uint_bytes(value: rsa::pkcs1::UintRef<'_>) -> Vec<u8> {
    value.as_bytes().to_vec()
}

fn export_rsa_jwk(material: &KeyMaterial) -> ProviderResult<KeyExportResult> {
    match material {
        KeyMaterial::Public(der) => {
            let public_key = rsa::pkcs1::RsaPublicKey::from_der(der)
                .map_err(|_| operation_error("failed to decode public key"))?;
            Ok(KeyExportResult::RsaPublicComponents {
                n: uint_bytes(public_key.modulus),
                e: uint_bytes(public_key.public_exponent),
            })
        },
        KeyMaterial::Private(der) => {
            let private_key = rsa::pkcs1::RsaPrivateKey::from_der(der)
                .map_err(|_| operation_error("failed to decode private key"))?;
            Ok(KeyExportResult::RsaPrivateComponents {
                n: uint_bytes(private_key.modulus),
                e: uint_bytes(private_key.public_exponent),
                d: uint_bytes(private_key.private_exponent),
                p: uint_bytes(private_key.prime1),
                q: uint_bytes(private_key.prime2),
                dp: uint_bytes(private_key.exponent1),
                dq: uint_bytes(private_key.exponent2),
                qi: uint_bytes(private_key.coefficient),
            })
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an RSA key")),
    }
}

fn export_ec_raw(curve: NamedCurve, material: &KeyMaterial) -> ProviderResult<KeyExportResult> {
    let point = match curve {
        NamedCurve::P256 => ec_public_point_p256(material)?.as_bytes().to_vec(),
        NamedCurve::P384 => ec_public_point_p384(material)?.as_bytes().to_vec(),
    };
    Ok(KeyExportResult::Bytes(point))
}

fn export_ec_spki(curve: NamedCurve, material: &KeyMaterial) -> ProviderResult<KeyExportResult> {
    let subject_public_key = match curve {
        NamedCurve::P256 => ec_public_point_p256(material)?.as_bytes().to_vec(),
        NamedCurve::P384 => ec_public_point_p384(material)?.as_bytes().to_vec(),
    };

    let alg_id = match curve {
        NamedCurve::P256 => AlgorithmIdentifierOwned {
            oid: elliptic_curve::ALGORITHM_OID,
            parameters: Some((&p256::NistP256::OID).into()),
        },
        NamedCurve::P384 => AlgorithmIdentifierOwned {
            oid: elliptic_curve::ALGORITHM_OID,
            parameters: Some((&p384::NistP384::OID).into()),
        },
    };

    let key_info = spki::SubjectPublicKeyInfo {
        algorithm: alg_id,
        subject_public_key: BitString::from_bytes(&subject_public_key)
            .map_err(|_| operation_error("failed to encode public key"))?,
    };
    let spki_der = key_info
        .to_der()
        .map_err(|_| operation_error("failed to encode public key"))?;
    Ok(KeyExportResult::Bytes(spki_der))
}

fn export_ec_jwk(curve: NamedCurve, material: &KeyMaterial) -> ProviderResult<KeyExportResult> {
    match material {
        KeyMaterial::Public(_) => {
            macro_rules! coords {
                ($point:expr) => {{
                    let point = $point;
                    match point.coordinates() {
                        elliptic_curve::sec1::Coordinates::Uncompressed { x, y } => {
                            KeyExportResult::EcPublicComponents {
                                x: x.to_vec(),
                                y: y.to_vec(),
                            }
                        },
                        _ => {
                            return Err(operation_error("failed to decode public key"));
                        },
                    }
                }};
            }
            Ok(match curve {
                NamedCurve::P256 => coords!(ec_public_point_p256(material)?),
                NamedCurve::P384 => coords!(ec_public_point_p384(material)?),
            })
        },
        KeyMaterial::Private(der) => {
            macro_rules! components {
                ($curve:ty) => {{
                    let secret = <$curve>::from_pkcs8_der(der)
                        .map_err(|_| operation_error("failed to decode private key"))?;
                    let point = secret.public_key().to_encoded_point(false);
                    match point.coordinates() {
                        elliptic_curve::sec1::Coordinates::Uncompressed { x, y } => {
                            KeyExportResult::EcPrivateComponents {
                                x: x.to_vec(),
                                y: y.to_vec(),
                                d: secret.to_bytes().to_vec(),
                            }
                        },
                        _ => {
                            return Err(operation_error("expected valid public EC key"));
                        },
                    }
                }};
            }
            Ok(match curve {
                NamedCurve::P256 => components!(p256::SecretKey),
                NamedCurve::P384 => components!(p384::SecretKey),
            })
        },
        KeyMaterial::Secret(_) => Err(ProviderError::type_error("expected an EC key")),
    }
}

#[cfg(test)]
mod tests {
    use webcrypto::KeyMaterial;

    use super::*;
    use crate::import_key::import_key;
    use webcrypto::KeyImportRequest;

    #[test]
    fn test_rsa_jwk_import_export_round_trip() -> anyhow::Result<()> {
        let n = vec![0xc2, 0x14, 0x7f, 0x51];
        let e = vec![0x01, 0x00, 0x01];
        let imported = import_key(KeyImportRequest::RsaJwkPublic {
            n: n.clone(),
            e: e.clone(),
        })?;
        let KeyExportResult::RsaPublicComponents { n: n2, e: e2 } =
            export_key(KeyExportRequest::RsaJwk {
                material: &imported.material,
            })?
        else {
            panic!("expected public RSA components");
        };
        assert_eq!(n2, n);
        assert_eq!(e2, e);
        Ok(())
    }

    #[test]
    fn test_ec_spki_export_embeds_curve_oid() -> anyhow::Result<()> {
        // Any valid point works; use the P-256 generator.
        let generator = hex::decode(
            "046b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c2964fe342e2fe1a7f9b8ee7eb4a7c0f9e162bce33576b315ececbb6406837bf51f5",
        )?;
        let material = KeyMaterial::Public(generator);
        let KeyExportResult::Bytes(der) = export_key(KeyExportRequest::EcSpki {
            curve: NamedCurve::P256,
            material: &material,
        })?
        else {
            panic!("expected DER bytes");
        };
        // Re-import must succeed and preserve the point.
        let imported = import_key(KeyImportRequest::EcSpki {
            curve: NamedCurve::P256,
            der: &der,
        })?;
        assert!(matches!(imported.material, KeyMaterial::Public(ref p) if p.len() == 65));
        Ok(())
    }
}
