use std::borrow::Cow;

use thiserror::Error;

pub type Result<T, E = CryptoError> = std::result::Result<T, E>;

/// Internal failure kinds. Each maps to exactly one DOM error name, which is
/// the part of an error callers are allowed to observe and branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotSupported,
    InvalidAccess,
    Syntax,
    Data,
    Operation,
    Type,
    InvalidState,
}

impl ErrorKind {
    pub fn dom_name(&self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "NotSupportedError",
            ErrorKind::InvalidAccess => "InvalidAccessError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Data => "DataError",
            ErrorKind::Operation => "OperationError",
            ErrorKind::Type => "TypeError",
            ErrorKind::InvalidState => "InvalidStateError",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}: {}", .kind.dom_name(), .message)]
pub struct CryptoError {
    kind: ErrorKind,
    message: Cow<'static, str>,
}

impl CryptoError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn dom_name(&self) -> &'static str {
        self.kind.dom_name()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn not_supported_error(msg: impl Into<Cow<'static, str>>) -> CryptoError {
    CryptoError::new(ErrorKind::NotSupported, msg)
}

pub fn invalid_access_error(msg: impl Into<Cow<'static, str>>) -> CryptoError {
    CryptoError::new(ErrorKind::InvalidAccess, msg)
}

pub fn syntax_error(msg: impl Into<Cow<'static, str>>) -> CryptoError {
    CryptoError::new(ErrorKind::Syntax, msg)
}

pub fn data_error(msg: impl Into<Cow<'static, str>>) -> CryptoError {
    CryptoError::new(ErrorKind::Data, msg)
}

pub fn operation_error(msg: impl Into<Cow<'static, str>>) -> CryptoError {
    CryptoError::new(ErrorKind::Operation, msg)
}

pub fn type_error(msg: impl Into<Cow<'static, str>>) -> CryptoError {
    CryptoError::new(ErrorKind::Type, msg)
}

pub fn not_supported() -> CryptoError {
    not_supported_error("The operation is not supported")
}

pub fn unsupported_format() -> CryptoError {
    not_supported_error("unsupported format")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_names() {
        assert_eq!(data_error("bad jwk").dom_name(), "DataError");
        assert_eq!(not_supported().dom_name(), "NotSupportedError");
        assert_eq!(
            invalid_access_error("missing usage").to_string(),
            "InvalidAccessError: missing usage"
        );
    }
}
