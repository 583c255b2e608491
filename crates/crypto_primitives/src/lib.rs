//! A software [`PrimitiveProvider`] for the webcrypto engine, built on the
//! RustCrypto stack. Randomness comes from the operating system by default;
//! a seeded mode exists so tests can reproduce generated keys and PSS
//! signatures bit-for-bit.

mod cipher;
mod derive;
mod export_key;
mod generate;
mod import_key;
mod shared;
mod sign;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{
    rngs::{
        OsRng,
        StdRng,
    },
    RngCore,
    SeedableRng,
};
use tracing::debug;
use webcrypto::{
    CipherParams,
    DeriveParams,
    GenerateKeySpec,
    GeneratedKey,
    ImportedKey,
    KeyExportRequest,
    KeyExportResult,
    KeyImportRequest,
    PrimitiveProvider,
    ProviderError,
    ProviderResult,
    ShaHash,
    SignParams,
    StoredKey,
};

enum RngSource {
    Os,
    Seeded(Mutex<StdRng>),
}

pub struct CryptoPrimitives {
    rng: RngSource,
}

impl CryptoPrimitives {
    pub fn new() -> Self {
        Self {
            rng: RngSource::Os,
        }
    }

    /// Deterministic randomness for reproducible tests. Not for production
    /// use.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: RngSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    fn fill_random(&self, buf: &mut [u8]) {
        match &self.rng {
            RngSource::Os => OsRng.fill_bytes(buf),
            RngSource::Seeded(rng) => rng.lock().fill_bytes(buf),
        }
    }

    /// Fork a fresh CryptoRng off the configured source. The fork owns its
    /// state, so it can move into a blocking task.
    fn fork_rng(&self) -> StdRng {
        let mut seed = [0u8; 32];
        self.fill_random(&mut seed);
        StdRng::from_seed(seed)
    }
}

impl Default for CryptoPrimitives {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrimitiveProvider for CryptoPrimitives {
    async fn digest(&self, hash: ShaHash, data: Vec<u8>) -> ProviderResult<Vec<u8>> {
        Ok(sign::digest_bytes(hash, &data))
    }

    async fn generate_key(&self, spec: GenerateKeySpec) -> ProviderResult<GeneratedKey> {
        match spec {
            GenerateKeySpec::Secret { length_bytes } => {
                let mut bytes = vec![0u8; length_bytes];
                self.fill_random(&mut bytes);
                Ok(GeneratedKey::Secret(bytes))
            },
            GenerateKeySpec::Rsa {
                modulus_length,
                public_exponent,
            } => {
                debug!(modulus_length, "generating RSA keypair");
                let rng = self.fork_rng();
                // Prime generation is expensive enough to keep off the async
                // threads.
                tokio::task::spawn_blocking(move || {
                    generate::rsa_keypair(rng, modulus_length, &public_exponent)
                })
                .await
                .map_err(|_| ProviderError::operation("key generation task failed"))?
            },
            GenerateKeySpec::Ec { curve } => {
                debug!(curve = curve.as_str(), "generating EC keypair");
                generate::ec_keypair(self.fork_rng(), curve)
            },
        }
    }

    async fn sign(
        &self,
        key: Arc<StoredKey>,
        params: SignParams,
        data: Vec<u8>,
    ) -> ProviderResult<Vec<u8>> {
        sign::sign(self.fork_rng(), &key, &params, &data)
    }

    async fn verify(
        &self,
        key: Arc<StoredKey>,
        params: SignParams,
        signature: Vec<u8>,
        data: Vec<u8>,
    ) -> ProviderResult<bool> {
        sign::verify(&key, &params, &signature, &data)
    }

    async fn encrypt(
        &self,
        key: Arc<StoredKey>,
        params: CipherParams,
        data: Vec<u8>,
    ) -> ProviderResult<Vec<u8>> {
        cipher::encrypt(self.fork_rng(), &key, &params, data)
    }

    async fn decrypt(
        &self,
        key: Arc<StoredKey>,
        params: CipherParams,
        data: Vec<u8>,
    ) -> ProviderResult<Vec<u8>> {
        cipher::decrypt(&key, &params, data)
    }

    async fn derive_bits(
        &self,
        key: Arc<StoredKey>,
        params: DeriveParams,
    ) -> ProviderResult<Vec<u8>> {
        derive::derive_bits(&key, &params)
    }

    fn import_key_structured(&self, request: KeyImportRequest<'_>) -> ProviderResult<ImportedKey> {
        import_key::import_key(request)
    }

    fn export_key_structured(
        &self,
        request: KeyExportRequest<'_>,
    ) -> ProviderResult<KeyExportResult> {
        export_key::export_key(request)
    }

    fn random_bytes(&self, buf: &mut [u8]) -> ProviderResult<()> {
        self.fill_random(buf);
        Ok(())
    }

    fn random_uuid(&self) -> ProviderResult<String> {
        let mut bytes = [0u8; 16];
        self.fill_random(&mut bytes);
        let uuid = uuid::Builder::from_bytes(bytes)
            .with_version(uuid::Version::Random)
            .into_uuid();
        Ok(uuid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = CryptoPrimitives::with_seed(42);
        let b = CryptoPrimitives::with_seed(42);
        let mut buf_a = [0u8; 32];
        let mut buf_b = [0u8; 32];
        a.fill_random(&mut buf_a);
        b.fill_random(&mut buf_b);
        assert_eq!(buf_a, buf_b);
        a.fill_random(&mut buf_a);
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn test_random_uuid_is_version_4() {
        let provider = CryptoPrimitives::new();
        let uuid = provider.random_uuid().unwrap();
        assert_eq!(uuid.len(), 36);
        assert_eq!(&uuid[14..15], "4");
    }
}
