use elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand::rngs::StdRng;
use rsa::{
    pkcs1::{
        EncodeRsaPrivateKey,
        EncodeRsaPublicKey,
    },
    BigUint,
    RsaPrivateKey,
};
use webcrypto::{
    GeneratedKey,
    NamedCurve,
    ProviderError,
    ProviderResult,
};

pub(crate) fn rsa_keypair(
    mut rng: StdRng,
    modulus_length: u32,
    public_exponent: &[u8],
) -> ProviderResult<GeneratedKey> {
    let exponent = BigUint::from_bytes_be(public_exponent);
    if exponent != BigUint::from(3u32) && exponent != BigUint::from(65537u32) {
        return Err(ProviderError::operation("Bad public exponent"));
    }
    let private_key = RsaPrivateKey::new_with_exp(&mut rng, modulus_length as usize, &exponent)
        .map_err(|_| ProviderError::operation("failed to generate RSA key"))?;
    let private_pkcs1 = private_key
        .to_pkcs1_der()
        .map_err(|_| ProviderError::operation("failed to serialize RSA private key"))?
        .as_bytes()
        .to_vec();
    let public_pkcs1 = private_key
        .to_public_key()
        .to_pkcs1_der()
        .map_err(|_| ProviderError::operation("failed to serialize RSA public key"))?
        .as_bytes()
        .to_vec();
    Ok(GeneratedKey::RsaPair {
        private_pkcs1,
        public_pkcs1,
    })
}

pub(crate) fn ec_keypair(mut rng: StdRng, curve: NamedCurve) -> ProviderResult<GeneratedKey> {
    let (private_pkcs8, public_point) = match curve {
        NamedCurve::P256 => {
            let secret = p256::SecretKey::random(&mut rng);
            let der = secret
                .to_pkcs8_der()
                .map_err(|_| ProviderError::operation("failed to serialize EC private key"))?;
            let point = secret.public_key().to_encoded_point(false);
            (der.as_bytes().to_vec(), point.as_bytes().to_vec())
        },
        NamedCurve::P384 => {
            let secret = p384::SecretKey::random(&mut rng);
            let der = secret
                .to_pkcs8_der()
                .map_err(|_| ProviderError::operation("failed to serialize EC private key"))?;
            let point = secret.public_key().to_encoded_point(false);
            (der.as_bytes().to_vec(), point.as_bytes().to_vec())
        },
    };
    Ok(GeneratedKey::EcPair {
        private_pkcs8,
        public_point,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_rejects_nonstandard_public_exponent() {
        let rng = StdRng::seed_from_u64(0);
        let err = rsa_keypair(rng, 2048, &[0x05]).unwrap_err();
        assert_eq!(err.to_string(), "Bad public exponent");
    }

    #[test]
    fn test_ec_keypair_emits_uncompressed_point() -> anyhow::Result<()> {
        let rng = StdRng::seed_from_u64(7);
        let GeneratedKey::EcPair { public_point, .. } = ec_keypair(rng, NamedCurve::P256)?
        else {
            panic!("expected an EC pair");
        };
        assert_eq!(public_point.len(), 65);
        assert_eq!(public_point[0], 0x04);
        Ok(())
    }
}
