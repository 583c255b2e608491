use std::sync::Arc;

use crate::{
    error::{
        type_error,
        Result,
    },
    provider::PrimitiveProvider,
};

/// The non-subtle surface: plain CSPRNG sinks.
pub struct Crypto {
    provider: Arc<dyn PrimitiveProvider>,
}

impl Crypto {
    pub fn new(provider: Arc<dyn PrimitiveProvider>) -> Self {
        Self { provider }
    }

    pub fn get_random_values(&self, buf: &mut [u8]) -> Result<()> {
        let max_byte_length = 65536;
        if buf.len() > max_byte_length {
            return Err(type_error(format!(
                "Byte length ({}) exceeds the number of bytes of entropy available via this API \
                 ({})",
                buf.len(),
                max_byte_length
            )));
        }
        self.provider.random_bytes(buf)?;
        Ok(())
    }

    pub fn random_uuid(&self) -> Result<String> {
        Ok(self.provider.random_uuid()?)
    }
}
