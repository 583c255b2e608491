use crate::{
    error::{
        not_supported_error,
        operation_error,
        type_error,
        Result,
    },
    key::CryptoKey,
};

/// The digest algorithms every other family hangs off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaHash {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ShaHash {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShaHash::Sha1 => "SHA-1",
            ShaHash::Sha256 => "SHA-256",
            ShaHash::Sha384 => "SHA-384",
            ShaHash::Sha512 => "SHA-512",
        }
    }

    fn from_canonical(name: &str) -> Self {
        match name {
            "SHA-1" => ShaHash::Sha1,
            "SHA-256" => ShaHash::Sha256,
            "SHA-384" => ShaHash::Sha384,
            "SHA-512" => ShaHash::Sha512,
            _ => unreachable!("non-canonical digest name {name}"),
        }
    }

    /// Digest output size in bits; also the default HMAC key length for the
    /// hash.
    pub fn output_bits(&self) -> u32 {
        match self {
            ShaHash::Sha1 => 160,
            ShaHash::Sha256 => 256,
            ShaHash::Sha384 => 384,
            ShaHash::Sha512 => 512,
        }
    }

    pub fn output_bytes(&self) -> usize {
        self.output_bits() as usize / 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedCurve {
    P256,
    P384,
}

impl NamedCurve {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedCurve::P256 => "P-256",
            NamedCurve::P384 => "P-384",
        }
    }

    /// Curve names are matched case-sensitively, unlike algorithm names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(NamedCurve::P256),
            "P-384" => Some(NamedCurve::P384),
            _ => None,
        }
    }

    pub fn field_bits(&self) -> u32 {
        match self {
            NamedCurve::P256 => 256,
            NamedCurve::P384 => 384,
        }
    }
}

/// Caller-supplied algorithm descriptor: either a bare name or a dictionary.
/// Dictionary members cover the union of every parameter schema; `normalize`
/// picks out (and defensively copies) the members its schema needs and
/// ignores the rest, the same way WebIDL dictionary coercion does.
#[derive(Debug, Clone)]
pub enum AlgorithmIdentifier {
    Name(String),
    Params(Algorithm),
}

impl From<&str> for AlgorithmIdentifier {
    fn from(name: &str) -> Self {
        AlgorithmIdentifier::Name(name.to_string())
    }
}

impl From<String> for AlgorithmIdentifier {
    fn from(name: String) -> Self {
        AlgorithmIdentifier::Name(name)
    }
}

impl From<Algorithm> for AlgorithmIdentifier {
    fn from(params: Algorithm) -> Self {
        AlgorithmIdentifier::Params(params)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Algorithm {
    pub name: String,
    pub hash: Option<Box<AlgorithmIdentifier>>,
    pub modulus_length: Option<u64>,
    pub public_exponent: Option<Vec<u8>>,
    pub named_curve: Option<String>,
    pub length: Option<u64>,
    pub salt_length: Option<u64>,
    pub iterations: Option<u64>,
    pub tag_length: Option<u64>,
    pub iv: Option<Vec<u8>>,
    pub counter: Option<Vec<u8>>,
    pub salt: Option<Vec<u8>>,
    pub info: Option<Vec<u8>>,
    pub label: Option<Vec<u8>>,
    pub additional_data: Option<Vec<u8>>,
    pub public: Option<CryptoKey>,
}

impl Algorithm {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// The operation axis of the registry. `GetKeyLength` is the internal
/// category deriveKey uses for its second normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Digest,
    GenerateKey,
    ImportKey,
    ExportKey,
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    DeriveBits,
    GetKeyLength,
    WrapKey,
    UnwrapKey,
}

/// Parameter schema selected by an (operation, name) cell. `None` means the
/// algorithm takes no members beyond its name for that operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Digest,
    None,
    RsaHashedKeyGen,
    RsaHashedImport,
    RsaPss,
    RsaOaep,
    EcKeyGen,
    EcImport,
    Ecdsa,
    EcdhDerive,
    AesKeyGen,
    AesCbc,
    AesCtr,
    AesGcm,
    HmacKeyGen,
    HmacImport,
    Hkdf,
    Pbkdf2,
    AesDerivedKeyLength,
    HmacKeyLength,
    KdfKeyLength,
}

type Row = &'static [(&'static str, Tag)];

fn registry_row(op: Operation) -> Row {
    match op {
        Operation::Digest => &[
            ("SHA-1", Tag::Digest),
            ("SHA-256", Tag::Digest),
            ("SHA-384", Tag::Digest),
            ("SHA-512", Tag::Digest),
        ],
        Operation::GenerateKey => &[
            ("RSASSA-PKCS1-v1_5", Tag::RsaHashedKeyGen),
            ("RSA-PSS", Tag::RsaHashedKeyGen),
            ("RSA-OAEP", Tag::RsaHashedKeyGen),
            ("ECDSA", Tag::EcKeyGen),
            ("ECDH", Tag::EcKeyGen),
            ("AES-CTR", Tag::AesKeyGen),
            ("AES-CBC", Tag::AesKeyGen),
            ("AES-GCM", Tag::AesKeyGen),
            ("AES-KW", Tag::AesKeyGen),
            ("HMAC", Tag::HmacKeyGen),
        ],
        Operation::ImportKey => &[
            ("RSASSA-PKCS1-v1_5", Tag::RsaHashedImport),
            ("RSA-PSS", Tag::RsaHashedImport),
            ("RSA-OAEP", Tag::RsaHashedImport),
            ("ECDSA", Tag::EcImport),
            ("ECDH", Tag::EcImport),
            ("AES-CTR", Tag::None),
            ("AES-CBC", Tag::None),
            ("AES-GCM", Tag::None),
            ("AES-KW", Tag::None),
            ("HMAC", Tag::HmacImport),
            ("HKDF", Tag::None),
            ("PBKDF2", Tag::None),
        ],
        Operation::ExportKey => &[
            ("RSASSA-PKCS1-v1_5", Tag::None),
            ("RSA-PSS", Tag::None),
            ("RSA-OAEP", Tag::None),
            ("ECDSA", Tag::None),
            ("ECDH", Tag::None),
            ("AES-CTR", Tag::None),
            ("AES-CBC", Tag::None),
            ("AES-GCM", Tag::None),
            ("AES-KW", Tag::None),
            ("HMAC", Tag::None),
            ("HKDF", Tag::None),
            ("PBKDF2", Tag::None),
        ],
        Operation::Sign | Operation::Verify => &[
            ("RSASSA-PKCS1-v1_5", Tag::None),
            ("RSA-PSS", Tag::RsaPss),
            ("ECDSA", Tag::Ecdsa),
            ("HMAC", Tag::None),
        ],
        Operation::Encrypt | Operation::Decrypt => &[
            ("RSA-OAEP", Tag::RsaOaep),
            ("AES-CBC", Tag::AesCbc),
            ("AES-CTR", Tag::AesCtr),
            ("AES-GCM", Tag::AesGcm),
        ],
        Operation::DeriveBits => &[
            ("ECDH", Tag::EcdhDerive),
            ("HKDF", Tag::Hkdf),
            ("PBKDF2", Tag::Pbkdf2),
        ],
        Operation::GetKeyLength => &[
            ("AES-CTR", Tag::AesDerivedKeyLength),
            ("AES-CBC", Tag::AesDerivedKeyLength),
            ("AES-GCM", Tag::AesDerivedKeyLength),
            ("AES-KW", Tag::AesDerivedKeyLength),
            ("HMAC", Tag::HmacKeyLength),
            ("HKDF", Tag::KdfKeyLength),
            ("PBKDF2", Tag::KdfKeyLength),
        ],
        Operation::WrapKey | Operation::UnwrapKey => &[("AES-KW", Tag::None)],
    }
}

/// A validated algorithm descriptor with the canonical name and owned copies
/// of every buffer-typed member.
#[derive(Debug, Clone)]
pub enum NormalizedAlgorithm {
    Sha(ShaHash),
    Bare {
        name: &'static str,
    },
    RsaHashedKeyGen {
        name: &'static str,
        modulus_length: u32,
        public_exponent: Vec<u8>,
        hash: ShaHash,
    },
    RsaHashedImport {
        name: &'static str,
        hash: ShaHash,
    },
    RsaPss {
        salt_length: u32,
    },
    RsaOaep {
        label: Vec<u8>,
    },
    EcKeyGen {
        name: &'static str,
        named_curve: String,
    },
    EcImport {
        name: &'static str,
        named_curve: String,
    },
    Ecdsa {
        hash: ShaHash,
    },
    EcdhDerive {
        public: CryptoKey,
    },
    AesKeyGen {
        name: &'static str,
        length: u32,
    },
    AesCbc {
        iv: Vec<u8>,
    },
    AesCtr {
        counter: Vec<u8>,
        length: u32,
    },
    AesGcm {
        iv: Vec<u8>,
        additional_data: Option<Vec<u8>>,
        tag_length: u32,
    },
    HmacKeyGen {
        hash: ShaHash,
        length: Option<u32>,
    },
    HmacImport {
        hash: ShaHash,
        length: Option<u32>,
    },
    Hkdf {
        hash: ShaHash,
        salt: Vec<u8>,
        info: Vec<u8>,
    },
    Pbkdf2 {
        hash: ShaHash,
        salt: Vec<u8>,
        iterations: u32,
    },
    AesDerivedKeyLength {
        name: &'static str,
        length: u32,
    },
    HmacKeyLength {
        hash: ShaHash,
        length: Option<u32>,
    },
    KdfKeyLength {
        name: &'static str,
    },
}

impl NormalizedAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizedAlgorithm::Sha(hash) => hash.as_str(),
            NormalizedAlgorithm::Bare { name }
            | NormalizedAlgorithm::RsaHashedKeyGen { name, .. }
            | NormalizedAlgorithm::RsaHashedImport { name, .. }
            | NormalizedAlgorithm::EcKeyGen { name, .. }
            | NormalizedAlgorithm::EcImport { name, .. }
            | NormalizedAlgorithm::AesKeyGen { name, .. }
            | NormalizedAlgorithm::AesDerivedKeyLength { name, .. }
            | NormalizedAlgorithm::KdfKeyLength { name } => name,
            NormalizedAlgorithm::RsaPss { .. } => "RSA-PSS",
            NormalizedAlgorithm::RsaOaep { .. } => "RSA-OAEP",
            NormalizedAlgorithm::Ecdsa { .. } => "ECDSA",
            NormalizedAlgorithm::EcdhDerive { .. } => "ECDH",
            NormalizedAlgorithm::AesCbc { .. } => "AES-CBC",
            NormalizedAlgorithm::AesCtr { .. } => "AES-CTR",
            NormalizedAlgorithm::AesGcm { .. } => "AES-GCM",
            NormalizedAlgorithm::HmacKeyGen { .. }
            | NormalizedAlgorithm::HmacImport { .. }
            | NormalizedAlgorithm::HmacKeyLength { .. } => "HMAC",
            NormalizedAlgorithm::Hkdf { .. } => "HKDF",
            NormalizedAlgorithm::Pbkdf2 { .. } => "PBKDF2",
        }
    }
}

/// Convert a caller-supplied descriptor into a validated internal one. Pure:
/// the only side effect is copying buffer members out of the input. Must run
/// before any precondition that reads `algorithm.name`.
pub fn normalize(input: &AlgorithmIdentifier, op: Operation) -> Result<NormalizedAlgorithm> {
    let (name, params) = match input {
        AlgorithmIdentifier::Name(name) => (name.as_str(), None),
        AlgorithmIdentifier::Params(alg) => (alg.name.as_str(), Some(alg)),
    };
    let (canonical, tag) = registry_row(op)
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .copied()
        .ok_or_else(|| not_supported_error(format!("Unrecognized algorithm name: {name}")))?;
    coerce(canonical, tag, params)
}

/// Try normalizing under `primary`; on any failure retry under `fallback`.
/// This is the wrapKey/unwrapKey dual-table lookup expressed declaratively.
pub fn normalize_in_category_or(
    primary: Operation,
    fallback: Operation,
    input: &AlgorithmIdentifier,
) -> Result<NormalizedAlgorithm> {
    normalize(input, primary).or_else(|_| normalize(input, fallback))
}

fn coerce(
    canonical: &'static str,
    tag: Tag,
    params: Option<&Algorithm>,
) -> Result<NormalizedAlgorithm> {
    let alg = match tag {
        Tag::Digest => NormalizedAlgorithm::Sha(ShaHash::from_canonical(canonical)),
        Tag::None => NormalizedAlgorithm::Bare { name: canonical },
        Tag::RsaHashedKeyGen => NormalizedAlgorithm::RsaHashedKeyGen {
            name: canonical,
            modulus_length: require_u32(params, |p| p.modulus_length, "modulusLength")?,
            public_exponent: params
                .and_then(|p| p.public_exponent.clone())
                .ok_or_else(|| missing("publicExponent"))?,
            hash: require_hash(params)?,
        },
        Tag::RsaHashedImport => NormalizedAlgorithm::RsaHashedImport {
            name: canonical,
            hash: require_hash(params)?,
        },
        Tag::RsaPss => NormalizedAlgorithm::RsaPss {
            salt_length: require_u32(params, |p| p.salt_length, "saltLength")?,
        },
        Tag::RsaOaep => NormalizedAlgorithm::RsaOaep {
            label: params.and_then(|p| p.label.clone()).unwrap_or_default(),
        },
        Tag::EcKeyGen => NormalizedAlgorithm::EcKeyGen {
            name: canonical,
            named_curve: require_named_curve(params)?,
        },
        Tag::EcImport => NormalizedAlgorithm::EcImport {
            name: canonical,
            named_curve: require_named_curve(params)?,
        },
        Tag::Ecdsa => NormalizedAlgorithm::Ecdsa {
            hash: require_hash(params)?,
        },
        Tag::EcdhDerive => NormalizedAlgorithm::EcdhDerive {
            public: params
                .and_then(|p| p.public.clone())
                .ok_or_else(|| missing("public"))?,
        },
        Tag::AesKeyGen => NormalizedAlgorithm::AesKeyGen {
            name: canonical,
            length: require_u32(params, |p| p.length, "length")?,
        },
        Tag::AesCbc => NormalizedAlgorithm::AesCbc {
            iv: require_buffer(params, |p| p.iv.as_deref(), "iv")?,
        },
        Tag::AesCtr => NormalizedAlgorithm::AesCtr {
            counter: require_buffer(params, |p| p.counter.as_deref(), "counter")?,
            length: coerce_int(
                params
                    .and_then(|p| p.length)
                    .ok_or_else(|| missing("length"))?,
                u8::MAX as u64,
                "length",
            )?,
        },
        Tag::AesGcm => NormalizedAlgorithm::AesGcm {
            iv: require_buffer(params, |p| p.iv.as_deref(), "iv")?,
            additional_data: params.and_then(|p| p.additional_data.clone()),
            tag_length: match params.and_then(|p| p.tag_length) {
                Some(value) => coerce_int(value, u8::MAX as u64, "tagLength")?,
                None => 128,
            },
        },
        Tag::HmacKeyGen => NormalizedAlgorithm::HmacKeyGen {
            hash: require_hash(params)?,
            length: optional_u32(params, |p| p.length, "length")?,
        },
        Tag::HmacImport => NormalizedAlgorithm::HmacImport {
            hash: require_hash(params)?,
            length: optional_u32(params, |p| p.length, "length")?,
        },
        Tag::Hkdf => NormalizedAlgorithm::Hkdf {
            hash: require_hash(params)?,
            salt: require_buffer(params, |p| p.salt.as_deref(), "salt")?,
            info: require_buffer(params, |p| p.info.as_deref(), "info")?,
        },
        Tag::Pbkdf2 => NormalizedAlgorithm::Pbkdf2 {
            hash: require_hash(params)?,
            salt: require_buffer(params, |p| p.salt.as_deref(), "salt")?,
            iterations: require_u32(params, |p| p.iterations, "iterations")?,
        },
        Tag::AesDerivedKeyLength => NormalizedAlgorithm::AesDerivedKeyLength {
            name: canonical,
            length: require_u32(params, |p| p.length, "length")?,
        },
        Tag::HmacKeyLength => NormalizedAlgorithm::HmacKeyLength {
            hash: require_hash(params)?,
            length: optional_u32(params, |p| p.length, "length")?,
        },
        Tag::KdfKeyLength => NormalizedAlgorithm::KdfKeyLength { name: canonical },
    };
    Ok(alg)
}

/// The "get key length" step of deriveKey: how many bits the derived key
/// needs. `None` means the derived algorithm has no inherent length (HKDF
/// and PBKDF2 keys).
pub fn get_key_length(alg: &NormalizedAlgorithm) -> Result<Option<u32>> {
    match alg {
        NormalizedAlgorithm::AesDerivedKeyLength { length, .. } => {
            if !matches!(*length, 128 | 192 | 256) {
                return Err(operation_error("AES key length must be 128, 192, or 256"));
            }
            Ok(Some(*length))
        },
        NormalizedAlgorithm::HmacKeyLength { hash, length } => match length {
            Some(0) => Err(operation_error("HMAC key length cannot be zero")),
            Some(length) => Ok(Some(*length)),
            None => Ok(Some(hash.output_bits())),
        },
        NormalizedAlgorithm::KdfKeyLength { .. } => Ok(None),
        _ => Err(operation_error("algorithm has no key length")),
    }
}

fn missing(member: &str) -> crate::error::CryptoError {
    type_error(format!("Missing required member {member}"))
}

fn coerce_int(value: u64, max: u64, member: &str) -> Result<u32> {
    if value > max {
        return Err(type_error(format!("{member} is out of range")));
    }
    Ok(value as u32)
}

fn require_u32(
    params: Option<&Algorithm>,
    get: impl Fn(&Algorithm) -> Option<u64>,
    member: &str,
) -> Result<u32> {
    let value = params.and_then(&get).ok_or_else(|| missing(member))?;
    coerce_int(value, u32::MAX as u64, member)
}

fn optional_u32(
    params: Option<&Algorithm>,
    get: impl Fn(&Algorithm) -> Option<u64>,
    member: &str,
) -> Result<Option<u32>> {
    match params.and_then(&get) {
        Some(value) => Ok(Some(coerce_int(value, u32::MAX as u64, member)?)),
        None => Ok(None),
    }
}

fn require_buffer(
    params: Option<&Algorithm>,
    get: impl Fn(&Algorithm) -> Option<&[u8]>,
    member: &str,
) -> Result<Vec<u8>> {
    params
        .and_then(|p| get(p).map(|b| b.to_vec()))
        .ok_or_else(|| missing(member))
}

fn require_hash(params: Option<&Algorithm>) -> Result<ShaHash> {
    let hash = params
        .and_then(|p| p.hash.as_ref())
        .ok_or_else(|| missing("hash"))?;
    match normalize(hash, Operation::Digest)? {
        NormalizedAlgorithm::Sha(hash) => Ok(hash),
        _ => unreachable!("digest row only yields digest schemas"),
    }
}

fn require_named_curve(params: Option<&Algorithm>) -> Result<String> {
    params
        .and_then(|p| p.named_curve.clone())
        .ok_or_else(|| missing("namedCurve"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup_yields_canonical_name() -> anyhow::Result<()> {
        let alg = normalize(&"sha-256".into(), Operation::Digest)?;
        assert_eq!(alg.name(), "SHA-256");

        let alg = normalize(
            &Algorithm {
                name: "aes-gcm".to_string(),
                length: Some(128),
                ..Default::default()
            }
            .into(),
            Operation::GenerateKey,
        )?;
        assert_eq!(alg.name(), "AES-GCM");
        Ok(())
    }

    #[test]
    fn test_unknown_name_is_not_supported() {
        let err = normalize(&"MD5".into(), Operation::Digest).unwrap_err();
        assert_eq!(err.dom_name(), "NotSupportedError");

        // Known name in the wrong category is also unsupported.
        let err = normalize(&"HMAC".into(), Operation::Encrypt).unwrap_err();
        assert_eq!(err.dom_name(), "NotSupportedError");
    }

    #[test]
    fn test_missing_members_are_type_errors() {
        let err = normalize(&"AES-GCM".into(), Operation::Encrypt).unwrap_err();
        assert_eq!(err.dom_name(), "TypeError");

        let err = normalize(
            &Algorithm::named("RSA-PSS").into(),
            Operation::GenerateKey,
        )
        .unwrap_err();
        assert_eq!(err.dom_name(), "TypeError");

        let err = normalize(&Algorithm::named("PBKDF2").into(), Operation::DeriveBits)
            .unwrap_err();
        assert_eq!(err.dom_name(), "TypeError");
    }

    #[test]
    fn test_nested_hash_normalizes_recursively() -> anyhow::Result<()> {
        let alg = normalize(
            &Algorithm {
                name: "HMAC".to_string(),
                hash: Some(Box::new("sha-512".into())),
                ..Default::default()
            }
            .into(),
            Operation::GenerateKey,
        )?;
        let NormalizedAlgorithm::HmacKeyGen { hash, length } = alg else {
            panic!("expected HMAC keygen schema");
        };
        assert_eq!(hash, ShaHash::Sha512);
        assert_eq!(length, None);
        Ok(())
    }

    #[test]
    fn test_gcm_tag_length_defaults_to_128() -> anyhow::Result<()> {
        let alg = normalize(
            &Algorithm {
                name: "AES-GCM".to_string(),
                iv: Some(vec![0; 12]),
                ..Default::default()
            }
            .into(),
            Operation::Encrypt,
        )?;
        let NormalizedAlgorithm::AesGcm { tag_length, .. } = alg else {
            panic!("expected AES-GCM schema");
        };
        assert_eq!(tag_length, 128);
        Ok(())
    }

    #[test]
    fn test_buffer_members_are_copied() -> anyhow::Result<()> {
        let mut iv = vec![7u8; 16];
        let alg = normalize(
            &Algorithm {
                name: "AES-CBC".to_string(),
                iv: Some(iv.clone()),
                ..Default::default()
            }
            .into(),
            Operation::Encrypt,
        )?;
        iv.fill(0);
        let NormalizedAlgorithm::AesCbc { iv: copied } = alg else {
            panic!("expected AES-CBC schema");
        };
        assert_eq!(copied, vec![7u8; 16]);
        Ok(())
    }

    #[test]
    fn test_wrap_key_falls_back_to_encrypt_row() -> anyhow::Result<()> {
        // AES-KW lives in the wrapKey row proper.
        let alg = normalize_in_category_or(
            Operation::WrapKey,
            Operation::Encrypt,
            &"AES-KW".into(),
        )?;
        assert_eq!(alg.name(), "AES-KW");

        // AES-GCM only normalizes under the encrypt fallback.
        let alg = normalize_in_category_or(
            Operation::WrapKey,
            Operation::Encrypt,
            &Algorithm {
                name: "AES-GCM".to_string(),
                iv: Some(vec![0; 12]),
                ..Default::default()
            }
            .into(),
        )?;
        assert_eq!(alg.name(), "AES-GCM");
        Ok(())
    }

    #[test]
    fn test_get_key_length_tables() -> anyhow::Result<()> {
        let aes = normalize(
            &Algorithm {
                name: "AES-CBC".to_string(),
                length: Some(192),
                ..Default::default()
            }
            .into(),
            Operation::GetKeyLength,
        )?;
        assert_eq!(get_key_length(&aes)?, Some(192));

        let bad = normalize(
            &Algorithm {
                name: "AES-CBC".to_string(),
                length: Some(129),
                ..Default::default()
            }
            .into(),
            Operation::GetKeyLength,
        )?;
        assert_eq!(get_key_length(&bad).unwrap_err().dom_name(), "OperationError");

        let hmac = normalize(
            &Algorithm {
                name: "HMAC".to_string(),
                hash: Some(Box::new("SHA-384".into())),
                ..Default::default()
            }
            .into(),
            Operation::GetKeyLength,
        )?;
        assert_eq!(get_key_length(&hmac)?, Some(384));

        let hkdf = normalize(&"HKDF".into(), Operation::GetKeyLength)?;
        assert_eq!(get_key_length(&hkdf)?, None);
        Ok(())
    }
}
