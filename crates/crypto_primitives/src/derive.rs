use elliptic_curve::sec1::FromEncodedPoint;
use hkdf::Hkdf;
use p256::pkcs8::DecodePrivateKey;
use sha1::Sha1;
use sha2::{
    Sha256,
    Sha384,
    Sha512,
};
use webcrypto::{
    DeriveParams,
    NamedCurve,
    ProviderError,
    ProviderResult,
    ShaHash,
    StoredKey,
};

use crate::shared::{
    private_material,
    secret_material,
};

pub(crate) fn derive_bits(key: &StoredKey, params: &DeriveParams) -> ProviderResult<Vec<u8>> {
    match params {
        DeriveParams::Pbkdf2 {
            hash,
            salt,
            iterations,
            length_bits,
        } => {
            let secret = secret_material(&key.material)?;
            let mut out = vec![0u8; *length_bits as usize / 8];
            macro_rules! derive_with {
                ($digest:ty) => {
                    pbkdf2::pbkdf2_hmac::<$digest>(secret, salt, *iterations, &mut out)
                };
            }
            match hash {
                ShaHash::Sha1 => derive_with!(Sha1),
                ShaHash::Sha256 => derive_with!(Sha256),
                ShaHash::Sha384 => derive_with!(Sha384),
                ShaHash::Sha512 => derive_with!(Sha512),
            }
            Ok(out)
        },
        DeriveParams::Hkdf {
            hash,
            salt,
            info,
            length_bits,
        } => {
            let secret = secret_material(&key.material)?;
            let mut out = vec![0u8; *length_bits as usize / 8];
            macro_rules! derive_with {
                ($digest:ty) => {
                    Hkdf::<$digest>::new(Some(salt), secret)
                        .expand(info, &mut out)
                        .map_err(|_| {
                            ProviderError::operation("The length provided for HKDF is too large")
                        })?
                };
            }
            match hash {
                ShaHash::Sha1 => derive_with!(Sha1),
                ShaHash::Sha256 => derive_with!(Sha256),
                ShaHash::Sha384 => derive_with!(Sha384),
                ShaHash::Sha512 => derive_with!(Sha512),
            }
            Ok(out)
        },
        DeriveParams::Ecdh {
            curve,
            public_point,
        } => {
            let der = private_material(&key.material)?;
            match curve {
                NamedCurve::P256 => {
                    let secret = p256::SecretKey::from_pkcs8_der(der).map_err(|_| {
                        ProviderError::operation("expected valid private EC key")
                    })?;
                    let point = p256::EncodedPoint::from_bytes(public_point)
                        .map_err(|_| ProviderError::data("invalid public EC key"))?;
                    let public_key =
                        Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(
                            &point,
                        ))
                        .ok_or_else(|| ProviderError::data("invalid public EC key"))?;
                    let shared = p256::elliptic_curve::ecdh::diffie_hellman(
                        secret.to_nonzero_scalar(),
                        public_key.as_affine(),
                    );
                    // The x-coordinate of the shared point.
                    Ok(shared.raw_secret_bytes().to_vec())
                },
                NamedCurve::P384 => {
                    let secret = p384::SecretKey::from_pkcs8_der(der).map_err(|_| {
                        ProviderError::operation("expected valid private EC key")
                    })?;
                    let point = p384::EncodedPoint::from_bytes(public_point)
                        .map_err(|_| ProviderError::data("invalid public EC key"))?;
                    let public_key =
                        Option::<p384::PublicKey>::from(p384::PublicKey::from_encoded_point(
                            &point,
                        ))
                        .ok_or_else(|| ProviderError::data("invalid public EC key"))?;
                    let shared = p384::elliptic_curve::ecdh::diffie_hellman(
                        secret.to_nonzero_scalar(),
                        public_key.as_affine(),
                    );
                    Ok(shared.raw_secret_bytes().to_vec())
                },
            }
        },
    }
}
