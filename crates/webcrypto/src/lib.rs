//! An implementation of the W3C Web Cryptography API's `SubtleCrypto`
//! surface. The engine owns algorithm normalization, key lifecycle and
//! usage enforcement, and the raw/PKCS#8/SPKI/JWK codecs; the cryptographic
//! primitives themselves live behind the [`PrimitiveProvider`] trait.

pub mod algorithm;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod key;
pub mod key_store;
pub mod provider;
pub mod subtle;

pub use self::{
    algorithm::{
        normalize,
        normalize_in_category_or,
        Algorithm,
        AlgorithmIdentifier,
        NamedCurve,
        NormalizedAlgorithm,
        Operation,
        ShaHash,
    },
    codec::{
        b64url_decode,
        b64url_encode,
        ExportedKey,
        JsonWebKey,
        KeyData,
        KeyFormat,
    },
    crypto::Crypto,
    error::{
        CryptoError,
        ErrorKind,
        Result,
    },
    key::{
        CryptoKey,
        CryptoKeyPair,
        KeyAlgorithm,
        KeyType,
        KeyUsage,
    },
    key_store::{
        Handle,
        KeyMaterial,
        KeyStore,
        StoredKey,
    },
    provider::{
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
        ProviderErrorKind,
        ProviderResult,
        SignParams,
    },
    subtle::{
        GenerateKeyResult,
        SubtleCrypto,
    },
};
