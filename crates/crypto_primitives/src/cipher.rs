use aes::{
    cipher::{
        block_padding::Pkcs7,
        BlockDecryptMut,
        BlockEncryptMut,
        KeyIvInit,
        StreamCipher,
    },
    Aes128,
    Aes192,
    Aes256,
};
use aes_gcm::{
    aead::{
        generic_array::{
            typenum::{
                U12,
                U13,
                U14,
                U15,
                U16,
            },
            GenericArray,
        },
        Aead,
        Payload,
    },
    AesGcm,
    KeyInit,
};
use rand::rngs::StdRng;
use sha1::Sha1;
use sha2::{
    Digest,
    Sha256,
    Sha384,
    Sha512,
};
use webcrypto::{
    CipherParams,
    ProviderError,
    ProviderResult,
    ShaHash,
    StoredKey,
};

use crate::shared::{
    rsa_private_key,
    rsa_public_key,
    secret_material,
};

pub(crate) fn encrypt(
    mut rng: StdRng,
    key: &StoredKey,
    params: &CipherParams,
    data: Vec<u8>,
) -> ProviderResult<Vec<u8>> {
    match params {
        CipherParams::RsaOaep { hash, label } => {
            let public_key = rsa_public_key(&key.material)?;
            let padding = oaep_padding(*hash, label)?;
            public_key
                .encrypt(&mut rng, padding, &data)
                .map_err(|_| ProviderError::operation("encryption failed"))
        },
        CipherParams::AesCbc { iv } => {
            let secret = secret_material(&key.material)?;
            macro_rules! seal {
                ($aes:ty) => {
                    cbc::Encryptor::<$aes>::new_from_slices(secret, iv)
                        .map_err(|_| ProviderError::data("invalid AES key"))?
                        .encrypt_padded_vec_mut::<Pkcs7>(&data)
                };
            }
            Ok(match secret.len() {
                16 => seal!(Aes128),
                24 => seal!(Aes192),
                32 => seal!(Aes256),
                _ => return Err(ProviderError::data("invalid AES key length")),
            })
        },
        CipherParams::AesCtr {
            counter,
            counter_length,
        } => {
            let secret = secret_material(&key.material)?;
            aes_ctr_apply(secret, counter, *counter_length, data)
        },
        CipherParams::AesGcm {
            iv,
            additional_data,
            tag_length,
        } => {
            let secret = secret_material(&key.material)?;
            let aad = additional_data.as_deref().unwrap_or_default();
            aes_gcm_seal(secret, iv, aad, *tag_length, &data)
        },
    }
}

pub(crate) fn decrypt(
    key: &StoredKey,
    params: &CipherParams,
    data: Vec<u8>,
) -> ProviderResult<Vec<u8>> {
    match params {
        CipherParams::RsaOaep { hash, label } => {
            let private_key = rsa_private_key(&key.material)?;
            let padding = oaep_padding(*hash, label)?;
            private_key
                .decrypt(padding, &data)
                .map_err(|_| ProviderError::operation("decryption failed"))
        },
        CipherParams::AesCbc { iv } => {
            let secret = secret_material(&key.material)?;
            macro_rules! open {
                ($aes:ty) => {
                    cbc::Decryptor::<$aes>::new_from_slices(secret, iv)
                        .map_err(|_| ProviderError::data("invalid AES key"))?
                        .decrypt_padded_vec_mut::<Pkcs7>(&data)
                        .map_err(|_| ProviderError::operation("decryption failed"))?
                };
            }
            Ok(match secret.len() {
                16 => open!(Aes128),
                24 => open!(Aes192),
                32 => open!(Aes256),
                _ => return Err(ProviderError::data("invalid AES key length")),
            })
        },
        CipherParams::AesCtr {
            counter,
            counter_length,
        } => {
            let secret = secret_material(&key.material)?;
            // CTR mode is symmetric.
            aes_ctr_apply(secret, counter, *counter_length, data)
        },
        CipherParams::AesGcm {
            iv,
            additional_data,
            tag_length,
        } => {
            let secret = secret_material(&key.material)?;
            let aad = additional_data.as_deref().unwrap_or_default();
            aes_gcm_open(secret, iv, aad, *tag_length, &data)
        },
    }
}

fn oaep_padding(hash: ShaHash, label: &[u8]) -> ProviderResult<rsa::Oaep> {
    // The rsa crate models the OAEP label as a string.
    let label = if label.is_empty() {
        None
    } else {
        Some(
            String::from_utf8(label.to_vec())
                .map_err(|_| ProviderError::operation("unsupported RSA-OAEP label"))?,
        )
    };
    Ok(match hash {
        ShaHash::Sha1 => rsa::Oaep {
            digest: Box::new(Sha1::new()),
            mgf_digest: Box::new(Sha1::new()),
            label,
        },
        ShaHash::Sha256 => rsa::Oaep {
            digest: Box::new(Sha256::new()),
            mgf_digest: Box::new(Sha256::new()),
            label,
        },
        ShaHash::Sha384 => rsa::Oaep {
            digest: Box::new(Sha384::new()),
            mgf_digest: Box::new(Sha384::new()),
            label,
        },
        ShaHash::Sha512 => rsa::Oaep {
            digest: Box::new(Sha512::new()),
            mgf_digest: Box::new(Sha512::new()),
            label,
        },
    })
}

fn aes_ctr_apply(
    key: &[u8],
    counter: &[u8],
    counter_length: u32,
    mut data: Vec<u8>,
) -> ProviderResult<Vec<u8>> {
    macro_rules! apply {
        ($ctr:ident, $aes:ty) => {{
            let mut cipher = ctr::$ctr::<$aes>::new_from_slices(key, counter)
                .map_err(|_| ProviderError::data("invalid AES key"))?;
            cipher.apply_keystream(&mut data);
            data
        }};
    }
    macro_rules! apply_for_key {
        ($ctr:ident) => {
            match key.len() {
                16 => apply!($ctr, Aes128),
                24 => apply!($ctr, Aes192),
                32 => apply!($ctr, Aes256),
                _ => return Err(ProviderError::data("invalid AES key length")),
            }
        };
    }
    Ok(match counter_length {
        32 => apply_for_key!(Ctr32BE),
        64 => apply_for_key!(Ctr64BE),
        128 => apply_for_key!(Ctr128BE),
        _ => {
            return Err(ProviderError::not_supported(
                "counter length not supported",
            ))
        },
    })
}

fn aes_gcm_seal(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    tag_length: u32,
    data: &[u8],
) -> ProviderResult<Vec<u8>> {
    if iv.len() != 12 {
        return Err(ProviderError::not_supported(
            "initialization vector length not supported",
        ));
    }
    macro_rules! seal {
        ($aes:ty, $tag:ty) => {
            AesGcm::<$aes, U12, $tag>::new_from_slice(key)
                .map_err(|_| ProviderError::data("invalid AES key"))?
                .encrypt(GenericArray::from_slice(iv), Payload { msg: data, aad })
                .map_err(|_| ProviderError::operation("encryption failed"))?
        };
    }
    macro_rules! seal_for_tag {
        ($aes:ty) => {
            match tag_length {
                96 => seal!($aes, U12),
                104 => seal!($aes, U13),
                112 => seal!($aes, U14),
                120 => seal!($aes, U15),
                128 => seal!($aes, U16),
                _ => return Err(ProviderError::not_supported("tag length not supported")),
            }
        };
    }
    Ok(match key.len() {
        16 => seal_for_tag!(Aes128),
        24 => seal_for_tag!(Aes192),
        32 => seal_for_tag!(Aes256),
        _ => return Err(ProviderError::data("invalid AES key length")),
    })
}

fn aes_gcm_open(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    tag_length: u32,
    data: &[u8],
) -> ProviderResult<Vec<u8>> {
    if iv.len() != 12 {
        return Err(ProviderError::not_supported(
            "initialization vector length not supported",
        ));
    }
    macro_rules! open {
        ($aes:ty, $tag:ty) => {
            AesGcm::<$aes, U12, $tag>::new_from_slice(key)
                .map_err(|_| ProviderError::data("invalid AES key"))?
                .decrypt(GenericArray::from_slice(iv), Payload { msg: data, aad })
                .map_err(|_| ProviderError::operation("decryption failed"))?
        };
    }
    macro_rules! open_for_tag {
        ($aes:ty) => {
            match tag_length {
                96 => open!($aes, U12),
                104 => open!($aes, U13),
                112 => open!($aes, U14),
                120 => open!($aes, U15),
                128 => open!($aes, U16),
                _ => return Err(ProviderError::not_supported("tag length not supported")),
            }
        };
    }
    Ok(match key.len() {
        16 => open_for_tag!(Aes128),
        24 => open_for_tag!(Aes192),
        32 => open_for_tag!(Aes256),
        _ => return Err(ProviderError::data("invalid AES key length")),
    })
}

#[cfg(test)]
mod tests {
    use webcrypto::KeyMaterial;

    use super::*;

    fn secret(bytes: Vec<u8>) -> StoredKey {
        StoredKey::new(KeyMaterial::Secret(bytes))
    }

    #[test]
    fn test_aes_cbc_zero_vector_first_block() -> anyhow::Result<()> {
        use rand::SeedableRng;
        let key = secret(vec![0u8; 16]);
        let params = CipherParams::AesCbc { iv: vec![0u8; 16] };
        let ciphertext = encrypt(
            StdRng::seed_from_u64(0),
            &key,
            &params,
            vec![0u8; 16],
        )?;
        // One block of plaintext plus a full PKCS#7 padding block.
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(
            hex::encode(&ciphertext[..16]),
            "66e94bd4ef8a2c3b884cfa59ca342b2e"
        );
        let plaintext = decrypt(&key, &params, ciphertext)?;
        assert_eq!(plaintext, vec![0u8; 16]);
        Ok(())
    }

    #[test]
    fn test_aes_gcm_round_trip_with_aad() -> anyhow::Result<()> {
        use rand::SeedableRng;
        let key = secret(vec![7u8; 32]);
        let params = CipherParams::AesGcm {
            iv: vec![1u8; 12],
            additional_data: Some(b"header".to_vec()),
            tag_length: 128,
        };
        let ciphertext = encrypt(
            StdRng::seed_from_u64(0),
            &key,
            &params,
            b"secret message".to_vec(),
        )?;
        assert_eq!(ciphertext.len(), b"secret message".len() + 16);
        let plaintext = decrypt(&key, &params, ciphertext.clone())?;
        assert_eq!(plaintext, b"secret message");

        // Flipping a ciphertext bit must fail the tag check.
        let mut tampered = ciphertext;
        tampered[0] ^= 1;
        assert!(decrypt(&key, &params, tampered).is_err());
        Ok(())
    }

    #[test]
    fn test_aes_ctr_is_an_involution() -> anyhow::Result<()> {
        use rand::SeedableRng;
        let key = secret(vec![9u8; 16]);
        let params = CipherParams::AesCtr {
            counter: vec![0u8; 16],
            counter_length: 32,
        };
        let ciphertext = encrypt(
            StdRng::seed_from_u64(0),
            &key,
            &params,
            b"stream me".to_vec(),
        )?;
        let plaintext = decrypt(&key, &params, ciphertext)?;
        assert_eq!(plaintext, b"stream me");
        Ok(())
    }
}
