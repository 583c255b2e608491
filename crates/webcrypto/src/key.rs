use std::{
    fmt,
    sync::Arc,
};

use crate::{
    algorithm::{
        NamedCurve,
        ShaHash,
    },
    error::{
        syntax_error,
        Result,
    },
    key_store::{
        Handle,
        KeyStore,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Secret,
    Private,
    Public,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Secret => "secret",
            KeyType::Private => "private",
            KeyType::Public => "public",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    Encrypt,
    Decrypt,
    Sign,
    Verify,
    DeriveKey,
    DeriveBits,
    WrapKey,
    UnwrapKey,
}

impl KeyUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::Encrypt => "encrypt",
            KeyUsage::Decrypt => "decrypt",
            KeyUsage::Sign => "sign",
            KeyUsage::Verify => "verify",
            KeyUsage::DeriveKey => "deriveKey",
            KeyUsage::DeriveBits => "deriveBits",
            KeyUsage::WrapKey => "wrapKey",
            KeyUsage::UnwrapKey => "unwrapKey",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "encrypt" => Some(KeyUsage::Encrypt),
            "decrypt" => Some(KeyUsage::Decrypt),
            "sign" => Some(KeyUsage::Sign),
            "verify" => Some(KeyUsage::Verify),
            "deriveKey" => Some(KeyUsage::DeriveKey),
            "deriveBits" => Some(KeyUsage::DeriveBits),
            "wrapKey" => Some(KeyUsage::WrapKey),
            "unwrapKey" => Some(KeyUsage::UnwrapKey),
            _ => None,
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured descriptor a key reports back to its caller. Names are
/// always the registry's canonical spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    RsaHashed {
        name: &'static str,
        modulus_length: u32,
        public_exponent: Vec<u8>,
        hash: ShaHash,
    },
    Ec {
        name: &'static str,
        named_curve: NamedCurve,
    },
    Aes {
        name: &'static str,
        length: u32,
    },
    Hmac {
        hash: ShaHash,
        length: u32,
    },
    Kdf {
        name: &'static str,
    },
}

impl KeyAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::RsaHashed { name, .. }
            | KeyAlgorithm::Ec { name, .. }
            | KeyAlgorithm::Aes { name, .. }
            | KeyAlgorithm::Kdf { name } => name,
            KeyAlgorithm::Hmac { .. } => "HMAC",
        }
    }
}

struct KeyInner {
    key_type: KeyType,
    extractable: bool,
    algorithm: KeyAlgorithm,
    usages: Vec<KeyUsage>,
    handle: Handle,
    store: KeyStore,
}

impl Drop for KeyInner {
    fn drop(&mut self) {
        // Last wrapper out turns off the lights on the store entry.
        self.store.remove(self.handle);
    }
}

/// Caller-visible key record. Cloning shares the underlying handle; the key
/// material itself is never duplicated. The store entry lives exactly as
/// long as the last clone.
#[derive(Clone)]
pub struct CryptoKey {
    inner: Arc<KeyInner>,
}

impl CryptoKey {
    /// Sole constructor path. The dispatcher is responsible for having
    /// applied the per-algorithm usage intersection before calling this;
    /// the public-key extractability mandate is enforced here.
    pub(crate) fn new(
        store: KeyStore,
        key_type: KeyType,
        extractable: bool,
        algorithm: KeyAlgorithm,
        usages: Vec<KeyUsage>,
        handle: Handle,
    ) -> Self {
        let extractable = match key_type {
            KeyType::Public => true,
            KeyType::Private | KeyType::Secret => extractable,
        };
        Self {
            inner: Arc::new(KeyInner {
                key_type,
                extractable,
                algorithm,
                usages,
                handle,
                store,
            }),
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.inner.key_type
    }

    pub fn extractable(&self) -> bool {
        self.inner.extractable
    }

    pub fn algorithm(&self) -> &KeyAlgorithm {
        &self.inner.algorithm
    }

    pub fn usages(&self) -> &[KeyUsage] {
        &self.inner.usages
    }

    pub fn has_usage(&self, usage: KeyUsage) -> bool {
        self.inner.usages.contains(&usage)
    }

    pub(crate) fn handle(&self) -> Handle {
        self.inner.handle
    }
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoKey")
            .field("type", &self.inner.key_type.as_str())
            .field("extractable", &self.inner.extractable)
            .field("algorithm", &self.inner.algorithm)
            .field("usages", &self.inner.usages)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct CryptoKeyPair {
    pub public_key: CryptoKey,
    pub private_key: CryptoKey,
}

/// Order-preserving intersection against `requested`, duplicates collapsed.
pub(crate) fn intersect_usages(requested: &[KeyUsage], allowed: &[KeyUsage]) -> Vec<KeyUsage> {
    let mut out = Vec::with_capacity(requested.len());
    for usage in requested {
        if allowed.contains(usage) && !out.contains(usage) {
            out.push(*usage);
        }
    }
    out
}

/// Reject any requested usage outside the set the algorithm permits.
pub(crate) fn check_usages_allowed(requested: &[KeyUsage], allowed: &[KeyUsage]) -> Result<()> {
    for usage in requested {
        if !allowed.contains(usage) {
            return Err(syntax_error(format!(
                "Unsupported key usage for this algorithm: {usage}"
            )));
        }
    }
    Ok(())
}
