use std::{
    borrow::Cow,
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    algorithm::{
        NamedCurve,
        ShaHash,
    },
    error::{
        CryptoError,
        ErrorKind,
    },
    key_store::{
        KeyMaterial,
        StoredKey,
    },
};

/// Failure kinds a provider may report. The engine folds these into its own
/// DOM-error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NotSupported,
    Operation,
    Data,
    Type,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: Cow<'static, str>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ProviderErrorKind::NotSupported, message)
    }

    pub fn operation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ProviderErrorKind::Operation, message)
    }

    pub fn data(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ProviderErrorKind::Data, message)
    }

    pub fn type_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ProviderErrorKind::Type, message)
    }

    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }
}

impl From<ProviderError> for CryptoError {
    fn from(err: ProviderError) -> Self {
        let kind = match err.kind {
            ProviderErrorKind::NotSupported => ErrorKind::NotSupported,
            ProviderErrorKind::Operation => ErrorKind::Operation,
            ProviderErrorKind::Data => ErrorKind::Data,
            ProviderErrorKind::Type => ErrorKind::Type,
        };
        CryptoError::new(kind, err.message)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// What kind of key material to mint.
#[derive(Debug, Clone)]
pub enum GenerateKeySpec {
    Rsa {
        modulus_length: u32,
        public_exponent: Vec<u8>,
    },
    Ec {
        curve: NamedCurve,
    },
    Secret {
        length_bytes: usize,
    },
}

#[derive(Debug)]
pub enum GeneratedKey {
    RsaPair {
        /// PKCS#1 `RSAPrivateKey` DER.
        private_pkcs1: Vec<u8>,
        /// PKCS#1 `RSAPublicKey` DER.
        public_pkcs1: Vec<u8>,
    },
    EcPair {
        /// PKCS#8 DER.
        private_pkcs8: Vec<u8>,
        /// Uncompressed SEC1 point.
        public_point: Vec<u8>,
    },
    Secret(Vec<u8>),
}

#[derive(Debug, Clone)]
pub enum SignParams {
    RsassaPkcs1v15 {
        hash: ShaHash,
    },
    RsaPss {
        hash: ShaHash,
        salt_length: u32,
    },
    Ecdsa {
        hash: ShaHash,
        curve: NamedCurve,
    },
    Hmac {
        hash: ShaHash,
    },
}

#[derive(Debug, Clone)]
pub enum CipherParams {
    RsaOaep {
        hash: ShaHash,
        label: Vec<u8>,
    },
    AesCbc {
        iv: Vec<u8>,
    },
    AesCtr {
        counter: Vec<u8>,
        counter_length: u32,
    },
    AesGcm {
        iv: Vec<u8>,
        additional_data: Option<Vec<u8>>,
        tag_length: u32,
    },
}

#[derive(Debug, Clone)]
pub enum DeriveParams {
    Pbkdf2 {
        hash: ShaHash,
        salt: Vec<u8>,
        iterations: u32,
        length_bits: u32,
    },
    Hkdf {
        hash: ShaHash,
        salt: Vec<u8>,
        info: Vec<u8>,
        length_bits: u32,
    },
    /// Returns the full shared secret; the engine truncates to the caller's
    /// requested bit length.
    Ecdh {
        curve: NamedCurve,
        public_point: Vec<u8>,
    },
}

/// Structured key bytes handed to the provider for parsing and validation.
/// JWK binary members arrive already base64url-decoded; JWK metadata
/// validation stays in the engine's codec.
#[derive(Debug)]
pub enum KeyImportRequest<'a> {
    RsaPkcs8 {
        der: &'a [u8],
    },
    RsaSpki {
        der: &'a [u8],
    },
    RsaJwkPublic {
        n: Vec<u8>,
        e: Vec<u8>,
    },
    RsaJwkPrivate {
        n: Vec<u8>,
        e: Vec<u8>,
        d: Vec<u8>,
        p: Vec<u8>,
        q: Vec<u8>,
        dp: Vec<u8>,
        dq: Vec<u8>,
        qi: Vec<u8>,
    },
    EcRaw {
        curve: NamedCurve,
        point: &'a [u8],
    },
    EcPkcs8 {
        curve: NamedCurve,
        der: &'a [u8],
    },
    EcSpki {
        curve: NamedCurve,
        der: &'a [u8],
    },
    EcJwkPublic {
        curve: NamedCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    EcJwkPrivate {
        curve: NamedCurve,
        x: Vec<u8>,
        y: Vec<u8>,
        d: Vec<u8>,
    },
}

#[derive(Debug)]
pub struct ImportedKey {
    pub material: KeyMaterial,
    /// RSA only.
    pub modulus_length: Option<u32>,
    /// RSA only.
    pub public_exponent: Option<Vec<u8>>,
}

impl ImportedKey {
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            material,
            modulus_length: None,
            public_exponent: None,
        }
    }
}

#[derive(Debug)]
pub enum KeyExportRequest<'a> {
    RsaPkcs8 {
        material: &'a KeyMaterial,
    },
    RsaSpki {
        material: &'a KeyMaterial,
    },
    RsaJwk {
        material: &'a KeyMaterial,
    },
    EcRaw {
        curve: NamedCurve,
        material: &'a KeyMaterial,
    },
    EcPkcs8 {
        material: &'a KeyMaterial,
    },
    EcSpki {
        curve: NamedCurve,
        material: &'a KeyMaterial,
    },
    EcJwk {
        curve: NamedCurve,
        material: &'a KeyMaterial,
    },
}

#[derive(Debug)]
pub enum KeyExportResult {
    Bytes(Vec<u8>),
    RsaPublicComponents {
        n: Vec<u8>,
        e: Vec<u8>,
    },
    RsaPrivateComponents {
        n: Vec<u8>,
        e: Vec<u8>,
        d: Vec<u8>,
        p: Vec<u8>,
        q: Vec<u8>,
        dp: Vec<u8>,
        dq: Vec<u8>,
        qi: Vec<u8>,
    },
    EcPublicComponents {
        x: Vec<u8>,
        y: Vec<u8>,
    },
    EcPrivateComponents {
        x: Vec<u8>,
        y: Vec<u8>,
        d: Vec<u8>,
    },
}

/// The primitive boundary. The engine owns normalization, preconditions,
/// defensive copies, and format metadata; everything that touches actual
/// cryptography or ASN.1 structure goes through here.
///
/// The async methods are the only suspension points in any subtle operation.
#[async_trait]
pub trait PrimitiveProvider: Send + Sync {
    async fn digest(&self, hash: ShaHash, data: Vec<u8>) -> ProviderResult<Vec<u8>>;

    async fn generate_key(&self, spec: GenerateKeySpec) -> ProviderResult<GeneratedKey>;

    async fn sign(
        &self,
        key: Arc<StoredKey>,
        params: SignParams,
        data: Vec<u8>,
    ) -> ProviderResult<Vec<u8>>;

    async fn verify(
        &self,
        key: Arc<StoredKey>,
        params: SignParams,
        signature: Vec<u8>,
        data: Vec<u8>,
    ) -> ProviderResult<bool>;

    async fn encrypt(
        &self,
        key: Arc<StoredKey>,
        params: CipherParams,
        data: Vec<u8>,
    ) -> ProviderResult<Vec<u8>>;

    async fn decrypt(
        &self,
        key: Arc<StoredKey>,
        params: CipherParams,
        data: Vec<u8>,
    ) -> ProviderResult<Vec<u8>>;

    async fn derive_bits(
        &self,
        key: Arc<StoredKey>,
        params: DeriveParams,
    ) -> ProviderResult<Vec<u8>>;

    fn import_key_structured(&self, request: KeyImportRequest<'_>) -> ProviderResult<ImportedKey>;

    fn export_key_structured(
        &self,
        request: KeyExportRequest<'_>,
    ) -> ProviderResult<KeyExportResult>;

    fn random_bytes(&self, buf: &mut [u8]) -> ProviderResult<()>;

    fn random_uuid(&self) -> ProviderResult<String>;
}
