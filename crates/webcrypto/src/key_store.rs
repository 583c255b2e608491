use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
};

use parking_lot::RwLock;
use zeroize::Zeroize;

use crate::error::{
    type_error,
    CryptoError,
    ErrorKind,
    Result,
};

/// Opaque, process-unique token for a stored key. Only ever held inside a
/// `CryptoKey`; callers never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

/// Raw key material, tagged with the role it plays for its algorithm family.
///
/// - `Secret`: raw octets (AES, HMAC, HKDF, PBKDF2).
/// - `Private`: PKCS#1 `RSAPrivateKey` DER for RSA, PKCS#8 DER for EC.
/// - `Public`: PKCS#1 `RSAPublicKey` DER for RSA, uncompressed SEC1 point
///   for EC.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Secret(Vec<u8>),
    Private(Vec<u8>),
    Public(Vec<u8>),
}

// Key bytes stay out of logs.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, data) = match self {
            KeyMaterial::Secret(data) => ("Secret", data),
            KeyMaterial::Private(data) => ("Private", data),
            KeyMaterial::Public(data) => ("Public", data),
        };
        write!(f, "KeyMaterial::{tag}({} bytes)", data.len())
    }
}

impl KeyMaterial {
    pub fn as_secret(&self) -> Result<&[u8]> {
        match self {
            KeyMaterial::Secret(data) => Ok(data),
            _ => Err(type_error("expected secret key")),
        }
    }

    pub fn as_private(&self) -> Result<&[u8]> {
        match self {
            KeyMaterial::Private(data) => Ok(data),
            _ => Err(type_error("expected private key")),
        }
    }

    pub fn as_public(&self) -> Result<&[u8]> {
        match self {
            KeyMaterial::Public(data) => Ok(data),
            _ => Err(type_error("expected public key")),
        }
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        match self {
            KeyMaterial::Secret(data) | KeyMaterial::Private(data) => data.zeroize(),
            // Public material is not confidential but zeroing it is free.
            KeyMaterial::Public(data) => data.zeroize(),
        }
    }
}

#[derive(Debug)]
pub struct StoredKey {
    pub material: KeyMaterial,
}

impl StoredKey {
    pub fn new(material: KeyMaterial) -> Self {
        Self { material }
    }
}

/// Process-wide mapping from handle to key material. Entries are write-once:
/// inserted at generate/import/unwrap time and removed when the last
/// `CryptoKey` referencing the handle drops. Reads are concurrent; insert and
/// remove serialize on the write lock.
#[derive(Clone, Default)]
pub struct KeyStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    next_handle: AtomicU64,
    entries: RwLock<HashMap<u64, Arc<StoredKey>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, stored: StoredKey) -> Handle {
        let handle = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .write()
            .insert(handle, Arc::new(stored));
        Handle(handle)
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<StoredKey>> {
        self.inner
            .entries
            .read()
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| CryptoError::new(ErrorKind::InvalidState, "key handle is gone"))
    }

    pub(crate) fn remove(&self, handle: Handle) {
        self.inner.entries.write().remove(&handle.0);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() -> anyhow::Result<()> {
        let store = KeyStore::new();
        let handle = store.put(StoredKey::new(KeyMaterial::Secret(vec![1, 2, 3])));
        assert_eq!(store.get(handle)?.material.as_secret()?, &[1, 2, 3]);

        store.remove(handle);
        let err = store.get(handle).unwrap_err();
        assert_eq!(err.dom_name(), "InvalidStateError");
        Ok(())
    }

    #[test]
    fn test_handles_are_unique() {
        let store = KeyStore::new();
        let a = store.put(StoredKey::new(KeyMaterial::Secret(vec![0; 16])));
        let b = store.put(StoredKey::new(KeyMaterial::Secret(vec![0; 16])));
        assert_ne!(a, b);
    }

    #[test]
    fn test_material_role_accessors() {
        let secret = KeyMaterial::Secret(vec![9]);
        assert!(secret.as_private().is_err());
        assert!(secret.as_public().is_err());
        assert!(secret.as_secret().is_ok());
    }
}
