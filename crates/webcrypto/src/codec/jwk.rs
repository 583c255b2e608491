use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    algorithm::{
        NamedCurve,
        ShaHash,
    },
    codec::b64url_decode,
    error::{
        data_error,
        Result,
    },
    key::KeyUsage,
};

/// JSON Web Key per RFC 7517, with the RFC 7518 members the engine handles.
/// Binary members are unpadded base64url strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonWebKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oth: Option<serde_json::Value>,
}

impl JsonWebKey {
    /// Skeleton with the metadata members every exported JWK carries.
    pub(crate) fn base(kty: &str, extractable: bool, usages: &[KeyUsage]) -> Self {
        Self {
            kty: Some(kty.to_string()),
            ext: Some(extractable),
            key_ops: Some(usages.iter().map(|u| u.as_str().to_string()).collect()),
            ..Default::default()
        }
    }
}

/// The single validation pass over JWK metadata on import.
pub(crate) fn validate_common(
    jwk: &JsonWebKey,
    extractable: bool,
    usages: &[KeyUsage],
    expected_use: Option<&str>,
) -> Result<()> {
    if let Some(key_ops) = &jwk.key_ops {
        let mut seen: Vec<KeyUsage> = Vec::with_capacity(key_ops.len());
        for op in key_ops {
            let parsed = KeyUsage::parse(op)
                .ok_or_else(|| data_error(format!("unrecognized key_ops entry: {op}")))?;
            if seen.contains(&parsed) {
                return Err(data_error("key_ops contains duplicate entries"));
            }
            seen.push(parsed);
            if !usages.contains(&parsed) {
                return Err(data_error(
                    "key_ops is not a subset of the requested usages",
                ));
            }
        }
    }
    if let (Some(use_member), Some(expected)) = (&jwk.r#use, expected_use) {
        if use_member != expected {
            return Err(data_error(format!("invalid jwk use member: {use_member}")));
        }
    }
    if jwk.ext == Some(false) && extractable {
        return Err(data_error("jwk is marked non-extractable"));
    }
    Ok(())
}

pub(crate) fn require_kty(jwk: &JsonWebKey, expected: &str) -> Result<()> {
    match &jwk.kty {
        Some(kty) if kty == expected => Ok(()),
        Some(kty) => Err(data_error(format!("unexpected jwk kty: {kty}"))),
        None => Err(data_error("missing jwk member kty")),
    }
}

pub(crate) fn require_b64(member: &Option<String>, name: &str) -> Result<Vec<u8>> {
    let value = member
        .as_ref()
        .ok_or_else(|| data_error(format!("missing jwk member {name}")))?;
    b64url_decode(value).map_err(|_| data_error(format!("invalid jwk member {name}")))
}

/// If the JWK declares an `alg`, it must agree with the algorithm being
/// imported.
pub(crate) fn check_alg(jwk: &JsonWebKey, expected: &str) -> Result<()> {
    match &jwk.alg {
        Some(alg) if alg != expected => {
            Err(data_error(format!("unexpected jwk alg: {alg}")))
        },
        _ => Ok(()),
    }
}

pub(crate) fn hmac_alg(hash: ShaHash) -> &'static str {
    match hash {
        ShaHash::Sha1 => "HS1",
        ShaHash::Sha256 => "HS256",
        ShaHash::Sha384 => "HS384",
        ShaHash::Sha512 => "HS512",
    }
}

pub(crate) fn aes_alg(name: &str, length: u32) -> &'static str {
    match (name, length) {
        ("AES-CTR", 128) => "A128CTR",
        ("AES-CTR", 192) => "A192CTR",
        ("AES-CTR", 256) => "A256CTR",
        ("AES-CBC", 128) => "A128CBC",
        ("AES-CBC", 192) => "A192CBC",
        ("AES-CBC", 256) => "A256CBC",
        ("AES-GCM", 128) => "A128GCM",
        ("AES-GCM", 192) => "A192GCM",
        ("AES-GCM", 256) => "A256GCM",
        ("AES-KW", 128) => "A128KW",
        ("AES-KW", 192) => "A192KW",
        ("AES-KW", 256) => "A256KW",
        _ => unreachable!("AES lengths are validated before alg lookup"),
    }
}

pub(crate) fn rsa_alg(name: &str, hash: ShaHash) -> &'static str {
    match (name, hash) {
        ("RSASSA-PKCS1-v1_5", ShaHash::Sha1) => "RS1",
        ("RSASSA-PKCS1-v1_5", ShaHash::Sha256) => "RS256",
        ("RSASSA-PKCS1-v1_5", ShaHash::Sha384) => "RS384",
        ("RSASSA-PKCS1-v1_5", ShaHash::Sha512) => "RS512",
        ("RSA-PSS", ShaHash::Sha1) => "PS1",
        ("RSA-PSS", ShaHash::Sha256) => "PS256",
        ("RSA-PSS", ShaHash::Sha384) => "PS384",
        ("RSA-PSS", ShaHash::Sha512) => "PS512",
        ("RSA-OAEP", ShaHash::Sha1) => "RSA-OAEP",
        ("RSA-OAEP", ShaHash::Sha256) => "RSA-OAEP-256",
        ("RSA-OAEP", ShaHash::Sha384) => "RSA-OAEP-384",
        ("RSA-OAEP", ShaHash::Sha512) => "RSA-OAEP-512",
        _ => unreachable!("non-RSA algorithm in rsa_alg"),
    }
}

pub(crate) fn ecdsa_alg(curve: NamedCurve) -> &'static str {
    match curve {
        NamedCurve::P256 => "ES256",
        NamedCurve::P384 => "ES384",
    }
}
