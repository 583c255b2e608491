pub mod jwk;

use crate::error::{
    data_error,
    Result,
};

pub use self::jwk::JsonWebKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Raw,
    Pkcs8,
    Spki,
    Jwk,
}

impl KeyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::Raw => "raw",
            KeyFormat::Pkcs8 => "pkcs8",
            KeyFormat::Spki => "spki",
            KeyFormat::Jwk => "jwk",
        }
    }
}

/// Key bytes (or JWK) handed to importKey/unwrapKey, discriminated by wire
/// format.
#[derive(Debug, Clone)]
pub enum KeyData {
    Raw(Vec<u8>),
    Pkcs8(Vec<u8>),
    Spki(Vec<u8>),
    Jwk(JsonWebKey),
}

impl KeyData {
    pub fn format(&self) -> KeyFormat {
        match self {
            KeyData::Raw(_) => KeyFormat::Raw,
            KeyData::Pkcs8(_) => KeyFormat::Pkcs8,
            KeyData::Spki(_) => KeyFormat::Spki,
            KeyData::Jwk(_) => KeyFormat::Jwk,
        }
    }

    /// Reconstruct key data from decrypted wrap bytes. JWK is carried on the
    /// wire as UTF-8 JSON.
    pub(crate) fn from_wrapped_bytes(format: KeyFormat, bytes: Vec<u8>) -> Result<Self> {
        Ok(match format {
            KeyFormat::Raw => KeyData::Raw(bytes),
            KeyFormat::Pkcs8 => KeyData::Pkcs8(bytes),
            KeyFormat::Spki => KeyData::Spki(bytes),
            KeyFormat::Jwk => {
                let jwk = serde_json::from_slice(&bytes)
                    .map_err(|_| data_error("unwrapped data is not a valid JWK"))?;
                KeyData::Jwk(jwk)
            },
        })
    }
}

/// Result of exportKey, discriminated by wire format.
#[derive(Debug, Clone)]
pub enum ExportedKey {
    Raw(Vec<u8>),
    Pkcs8(Vec<u8>),
    Spki(Vec<u8>),
    Jwk(JsonWebKey),
}

impl ExportedKey {
    /// Flatten to bytes for wrapping. JWK serializes to UTF-8 JSON.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        Ok(match self {
            ExportedKey::Raw(bytes)
            | ExportedKey::Pkcs8(bytes)
            | ExportedKey::Spki(bytes) => bytes,
            ExportedKey::Jwk(jwk) => serde_json::to_vec(&jwk)
                .map_err(|_| data_error("failed to serialize JWK"))?,
        })
    }
}

// RFC 7515 §2 base64url: `-`/`_` alphabet, no `=` padding. Decoding forgives
// nonzero trailing bits, matching the original engine.
const URL_SAFE_FORGIVING: base64::Config =
    base64::URL_SAFE_NO_PAD.decode_allow_trailing_bits(true);

pub fn b64url_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

pub fn b64url_decode(data: &str) -> Result<Vec<u8>> {
    base64::decode_config(data, URL_SAFE_FORGIVING).map_err(|_| data_error("invalid base64url"))
}
